//! Client Error Type
//!
//! Every public operation returns [`ConditionSearchError`] on failure. An
//! empty result is not an error.

use std::time::Duration;

use super::auth::AuthError;
use super::codec::CodecError;
use super::connection::ConnectionError;
use super::messages::{MessageKind, ReturnStatus};

/// Failure of a condition-search operation.
#[derive(Debug, thiserror::Error)]
pub enum ConditionSearchError {
    /// The transport could not be opened, written or read.
    #[error("connection failure: {0}")]
    Connection(#[from] ConnectionError),

    /// The gateway rejected the login.
    #[error("authentication rejected ({code}): {message}")]
    Authentication {
        /// Login return code.
        code: i64,
        /// Login return message.
        message: String,
    },

    /// The gateway answered with a non-zero return code.
    #[error("{kind} rejected ({code}): {message}")]
    Protocol {
        /// Message type of the rejected request.
        kind: MessageKind,
        /// Return code.
        code: i64,
        /// Return message.
        message: String,
    },

    /// No correlated response arrived before the deadline.
    #[error("no {kind} response within {waited:?}")]
    Timeout {
        /// Message type awaited.
        kind: MessageKind,
        /// How long the caller waited.
        waited: Duration,
    },

    /// A response could not be decoded.
    #[error("malformed response: {0}")]
    Codec(#[from] CodecError),

    /// The request itself is unusable (for example an empty condition id).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session closed before the operation finished.
    #[error("session closed")]
    Closed,
}

impl ConditionSearchError {
    /// Whether repeating the operation may succeed.
    ///
    /// Transport failures, timeouts and dropped sessions are transient;
    /// rejected logins, gateway errors and malformed data are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::Closed
        )
    }

    /// Whether the deadline elapsed without a response.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub(crate) fn protocol(kind: MessageKind, status: &ReturnStatus) -> Self {
        Self::Protocol {
            kind,
            code: status.return_code,
            message: status.return_msg.clone(),
        }
    }
}

impl From<AuthError> for ConditionSearchError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Rejected { code, message } => Self::Authentication { code, message },
            AuthError::EmptyToken => Self::Authentication {
                code: -1,
                message: err.to_string(),
            },
        }
    }
}
