//! Gateway Session
//!
//! One authenticated connection. Opening a session connects, starts the
//! dispatcher and waits for the login acknowledgement; only then may request
//! frames be sent. Each session owns its own mailboxes, so concurrent
//! sessions never see each other's responses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::auth::{AccessToken, check_login};
use super::codec::InboundFrame;
use super::connection::ConnectionManager;
use super::correlator::ResponseCorrelator;
use super::dispatcher::{DispatchExit, MessageDispatcher};
use super::error::ConditionSearchError;
use super::keepalive::KeepaliveState;
use super::messages::{LoginAck, MessageKind};
use crate::domain::session::{SessionState, SessionStateCell};
use crate::infrastructure::metrics;

/// How long `close()` waits for the dispatcher before aborting it.
const DISPATCHER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection parameters for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gateway WebSocket URL.
    pub url: String,
    /// Bearer token.
    pub token: AccessToken,
    /// Time allowed to open the transport.
    pub connect_timeout: Duration,
    /// Time allowed for the login acknowledgement.
    pub login_timeout: Duration,
}

/// State shared between a session and its dispatcher.
#[derive(Debug)]
pub struct SessionContext {
    /// Transport owner.
    pub connection: ConnectionManager,
    /// Latest response per message type (`LOGIN`, `CNSRLST`, `CNSRCLR`, ...).
    pub responses: ResponseCorrelator<MessageKind>,
    /// Search responses keyed by condition id.
    pub searches: ResponseCorrelator<String>,
    /// Lifecycle state.
    pub state: SessionStateCell,
    /// Keepalive activity.
    pub keepalive: KeepaliveState,
    /// Stops the dispatcher.
    pub cancel: CancellationToken,
}

/// An authenticated gateway session.
pub struct Session {
    id: Uuid,
    ctx: Arc<SessionContext>,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<DispatchExit>>>,
    opened_at: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect, start the dispatcher and wait for the login acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionSearchError::Connection`] if the transport cannot be
    /// opened, [`ConditionSearchError::Authentication`] if the login is
    /// rejected and [`ConditionSearchError::Timeout`] if no acknowledgement
    /// arrives within `login_timeout`. The session is closed in every case.
    pub async fn open(config: &SessionConfig) -> Result<Self, ConditionSearchError> {
        let ctx = Arc::new(SessionContext {
            connection: ConnectionManager::new(
                config.url.clone(),
                config.token.clone(),
                config.connect_timeout,
            ),
            responses: ResponseCorrelator::new(),
            searches: ResponseCorrelator::new(),
            state: SessionStateCell::new(),
            keepalive: KeepaliveState::new(),
            cancel: CancellationToken::new(),
        });
        let session = Self {
            id: Uuid::new_v4(),
            ctx,
            dispatcher: parking_lot::Mutex::new(None),
            opened_at: Instant::now(),
        };

        match session.authenticate(config.login_timeout).await {
            Ok(()) => {
                tracing::debug!(session = %session.id, "Session ready");
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn authenticate(&self, login_timeout: Duration) -> Result<(), ConditionSearchError> {
        self.advance(SessionState::Connecting)?;
        self.ctx.connection.connect().await?;
        self.advance(SessionState::Authenticating)?;

        let source = self
            .ctx
            .connection
            .take_source()
            .ok_or(ConditionSearchError::Closed)?;
        let dispatcher = MessageDispatcher::new(Arc::clone(&self.ctx), source);
        let span = tracing::debug_span!("dispatcher", session = %self.id);
        *self.dispatcher.lock() = Some(tokio::spawn(dispatcher.run().instrument(span)));
        metrics::record_session_opened();

        let ack = tokio::select! {
            biased;
            frame = self.wait_response(MessageKind::Login, login_timeout) => frame,
            () = self.closed() => None,
        };
        let Some(frame) = ack else {
            if self.ctx.state.get().is_terminating() {
                return Err(ConditionSearchError::Closed);
            }
            tracing::info!(session = %self.id, waited = ?login_timeout, "No login acknowledgement");
            metrics::record_response_timeout(&MessageKind::Login);
            return Err(ConditionSearchError::Timeout {
                kind: MessageKind::Login,
                waited: login_timeout,
            });
        };

        let ack: LoginAck = frame.parse()?;
        check_login(&ack)?;
        self.advance(SessionState::Ready)?;
        Ok(())
    }

    fn advance(&self, next: SessionState) -> Result<(), ConditionSearchError> {
        self.ctx.state.transition(next).map(|_| ()).map_err(|e| {
            tracing::debug!(session = %self.id, error = %e, "Session not usable");
            ConditionSearchError::Closed
        })
    }

    /// Session id, for logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.ctx.state.get()
    }

    /// Keepalive activity for this session.
    #[must_use]
    pub fn keepalive(&self) -> &KeepaliveState {
        &self.ctx.keepalive
    }

    /// Mailbox of latest responses by message type.
    #[must_use]
    pub fn responses(&self) -> &ResponseCorrelator<MessageKind> {
        &self.ctx.responses
    }

    /// Mailbox of search responses by condition id.
    #[must_use]
    pub fn searches(&self) -> &ResponseCorrelator<String> {
        &self.ctx.searches
    }

    /// Send a request frame. The session moves to `Waiting` until
    /// [`Session::finish_wait`].
    ///
    /// # Errors
    ///
    /// Returns [`ConditionSearchError::Closed`] if the session is not
    /// authenticated, or the transport error (which also closes the session).
    pub async fn send<T: Serialize + Sync>(
        &self,
        kind: &MessageKind,
        frame: &T,
    ) -> Result<(), ConditionSearchError> {
        if !self.state().is_authenticated() {
            return Err(ConditionSearchError::Closed);
        }
        self.advance(SessionState::Sending)?;

        if let Err(e) = self.ctx.connection.send(frame).await {
            tracing::warn!(session = %self.id, kind = %kind, error = %e, "Request send failed");
            self.ctx.state.begin_closing();
            return Err(e.into());
        }

        metrics::record_request_sent(kind);
        self.advance(SessionState::Waiting)?;
        Ok(())
    }

    /// Return to `Ready` after a wait. No-op if the session is closing.
    pub fn finish_wait(&self) {
        let _ = self.ctx.state.transition(SessionState::Ready);
    }

    /// Await a response filed under `kind`, for at most `max_wait`.
    pub async fn wait_response(&self, kind: MessageKind, max_wait: Duration) -> Option<InboundFrame> {
        self.ctx.responses.wait_for(kind, max_wait).await
    }

    /// Resolves once the dispatcher has stopped or the session is closing.
    pub async fn closed(&self) {
        self.ctx.cancel.cancelled().await;
    }

    /// Close the session. Idempotent.
    ///
    /// Cancels the dispatcher, closes the transport and waits briefly for the
    /// dispatcher to finish.
    pub async fn close(&self) {
        self.ctx.state.begin_closing();
        self.ctx.cancel.cancel();
        self.ctx.connection.disconnect().await;

        let handle = self.dispatcher.lock().take();
        if let Some(mut handle) = handle {
            match tokio::time::timeout(DISPATCHER_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(exit)) => {
                    tracing::debug!(session = %self.id, exit = ?exit, "Dispatcher joined");
                }
                Ok(Err(e)) => {
                    tracing::warn!(session = %self.id, error = %e, "Dispatcher task failed");
                }
                Err(_) => {
                    tracing::warn!(session = %self.id, "Dispatcher did not stop, aborting");
                    handle.abort();
                }
            }
            metrics::record_session_closed(self.opened_at.elapsed());

            let keepalive = self.ctx.keepalive.snapshot();
            if keepalive.unanswered() > 0 {
                tracing::warn!(
                    session = %self.id,
                    received = keepalive.received,
                    echoed = keepalive.echoed,
                    "Keepalives left unanswered"
                );
            }
            tracing::debug!(
                session = %self.id,
                lifetime = ?self.opened_at.elapsed(),
                keepalives = keepalive.received,
                idle = ?keepalive.idle,
                since_keepalive = ?keepalive.since_keepalive,
                "Session closed"
            );
        }

        self.ctx.state.mark_closed();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A session dropped without close() still stops its reader.
        self.ctx.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_against_closed_port_fails_and_closes() {
        let config = SessionConfig {
            url: "ws://127.0.0.1:9/api/dostk/websocket".to_string(),
            token: AccessToken::new("token").unwrap(),
            connect_timeout: Duration::from_millis(500),
            login_timeout: Duration::from_millis(500),
        };

        let err = Session::open(&config).await.unwrap_err();
        assert!(matches!(err, ConditionSearchError::Connection(_)));
        assert!(err.is_retryable());
    }
}
