//! Session Lifecycle
//!
//! State machine for one authenticated gateway session:
//!
//! ```text
//! Init → Connecting → Authenticating → Ready ⇄ (Sending → Waiting)
//!                                        │
//!       any transport error / login rejection
//!                                        ▼
//!                                     Closing → Closed
//! ```
//!
//! Keepalive handling happens inside `Ready` (and `Waiting`) without a
//! transition. `Closing` is reachable from every non-terminal state.

use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionState {
    /// Created, nothing opened yet.
    #[default]
    Init = 0,
    /// Opening the transport.
    Connecting = 1,
    /// Login frame sent, awaiting acknowledgement.
    Authenticating = 2,
    /// Authenticated and idle.
    Ready = 3,
    /// Writing a request frame.
    Sending = 4,
    /// Request sent, awaiting the correlated response.
    Waiting = 5,
    /// Tearing down the transport.
    Closing = 6,
    /// Transport closed; terminal.
    Closed = 7,
}

impl SessionState {
    /// Whether request frames may be sent in this state.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Ready | Self::Sending | Self::Waiting)
    }

    /// Whether the session has started or finished shutting down.
    #[must_use]
    pub const fn is_terminating(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use SessionState::{
            Authenticating, Closed, Closing, Connecting, Init, Ready, Sending, Waiting,
        };
        matches!(
            (*self, next),
            (Init, Connecting)
                | (Connecting, Authenticating)
                | (Authenticating, Ready)
                | (Ready | Waiting, Sending)
                | (Sending, Waiting)
                | (Waiting | Sending, Ready)
                | (Init | Connecting | Authenticating | Ready | Sending | Waiting, Closing)
                | (Closing, Closed)
        )
    }

    /// Name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Sending => "sending",
            Self::Waiting => "waiting",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Init,
            1 => Self::Connecting,
            2 => Self::Authenticating,
            3 => Self::Ready,
            4 => Self::Sending,
            5 => Self::Waiting,
            6 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal session transition: {} -> {}", from.as_str(), to.as_str())]
pub struct TransitionError {
    /// State the session was in.
    pub from: SessionState,
    /// State that was requested.
    pub to: SessionState,
}

/// Session state shared between the caller and the dispatcher task.
#[derive(Debug, Default)]
pub struct SessionStateCell {
    state: AtomicU8,
}

impl SessionStateCell {
    /// Create a cell in [`SessionState::Init`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Init as u8),
        }
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `next` if the transition is legal.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the current state does not allow it;
    /// the state is left unchanged.
    pub fn transition(&self, next: SessionState) -> Result<SessionState, TransitionError> {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                SessionState::from_u8(raw)
                    .can_transition_to(next)
                    .then_some(next as u8)
            })
            .map(SessionState::from_u8)
            .map_err(|raw| TransitionError {
                from: SessionState::from_u8(raw),
                to: next,
            })
    }

    /// Force the session into `Closing` from any non-terminal state.
    ///
    /// Returns `true` if this call started the shutdown.
    pub fn begin_closing(&self) -> bool {
        self.transition(SessionState::Closing).is_ok()
    }

    /// Mark the session closed. Idempotent.
    pub fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
    }
}
