//! Gateway Authentication
//!
//! The gateway authenticates a connection with a pre-issued bearer token.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Send `{"trnm":"LOGIN","token":"..."}`
//! 3. Receive `{"trnm":"LOGIN","return_code":0,"return_msg":"..."}`
//!
//! A non-zero `return_code` rejects the login; the session must close.
//! Token issuance itself (the REST `oauth2/token` call) happens elsewhere.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::messages::{LoginAck, LoginRequest};

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token was provided.
    #[error("access token cannot be empty")]
    EmptyToken,

    /// The gateway rejected the login.
    #[error("login rejected ({code}): {message}")]
    Rejected {
        /// Return code from the gateway.
        code: i64,
        /// Return message from the gateway.
        message: String,
    },
}

/// Bearer access token for the gateway.
///
/// Cheap to clone; the `Debug` and `Display` implementations never print the
/// token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Arc<str>);

impl AccessToken {
    /// Wrap a token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EmptyToken`] if the token is blank.
    pub fn new(token: impl AsRef<str>) -> Result<Self, AuthError> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(Self(Arc::from(token)))
    }

    /// The raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Build the login frame for this token.
    #[must_use]
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest::new(self.expose())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(len={})", self.0.len())
    }
}

/// Check a login acknowledgement.
///
/// # Errors
///
/// Returns [`AuthError::Rejected`] for a non-zero return code.
pub fn check_login(ack: &LoginAck) -> Result<(), AuthError> {
    if ack.status.is_success() {
        Ok(())
    } else {
        Err(AuthError::Rejected {
            code: ack.status.return_code,
            message: ack.status.return_msg.clone(),
        })
    }
}
