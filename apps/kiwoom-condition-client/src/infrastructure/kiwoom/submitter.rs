//! Condition Search Client
//!
//! Builds protocol-correct request frames and waits for their correlated
//! responses. Every operation opens its own session, authenticates, does one
//! exchange and closes the session again, whatever the outcome.
//!
//! # Deadlines
//!
//! | Operation        | Default |
//! |------------------|---------|
//! | login ack        | 10 s    |
//! | condition list   | 5 s     |
//! | general search   | 20 s    |
//! | realtime search  | 30 s    |
//! | realtime clear   | 5 s     |

use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use super::auth::AccessToken;
use super::codec::InboundFrame;
use super::connection::DEFAULT_CONNECT_TIMEOUT;
use super::correlator::ResponseCorrelator;
use super::error::ConditionSearchError;
use super::messages::{
    Acknowledgement, ConditionClearRequest, ConditionListRequest, ConditionListResponse,
    ConditionSearchRequest, ConditionSearchResponse, MessageKind,
};
use super::session::{Session, SessionConfig};
use crate::application::ports::ConditionSearchPort;
use crate::domain::condition::{ConditionDefinition, ExchangeScope, SearchMode, SearchPage};
use crate::infrastructure::metrics::{self, SearchOutcome};

/// Default login acknowledgement deadline.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default condition list deadline.
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(5);
/// Default general search deadline.
pub const DEFAULT_GENERAL_TIMEOUT: Duration = Duration::from_secs(20);
/// Default realtime search deadline.
pub const DEFAULT_REALTIME_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cadence for [`ResponseWait::Poll`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a caller waits for its correlated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseWait {
    /// Register a oneshot waiter before sending; the dispatcher resolves it.
    #[default]
    Notify,
    /// Check the mailbox at a fixed cadence.
    Poll {
        /// Time between checks.
        interval: Duration,
    },
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-session connection parameters.
    pub session: SessionConfig,
    /// Condition list and realtime clear deadline.
    pub list_timeout: Duration,
    /// General search deadline.
    pub general_timeout: Duration,
    /// Realtime search deadline.
    pub realtime_timeout: Duration,
    /// Wait strategy.
    pub wait: ResponseWait,
}

impl GatewayConfig {
    /// Configuration with default deadlines.
    #[must_use]
    pub fn new(url: impl Into<String>, token: AccessToken) -> Self {
        Self {
            session: SessionConfig {
                url: url.into(),
                token,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                login_timeout: DEFAULT_LOGIN_TIMEOUT,
            },
            list_timeout: DEFAULT_LIST_TIMEOUT,
            general_timeout: DEFAULT_GENERAL_TIMEOUT,
            realtime_timeout: DEFAULT_REALTIME_TIMEOUT,
            wait: ResponseWait::Notify,
        }
    }

    /// Search deadline for `mode`.
    #[must_use]
    pub const fn search_timeout(&self, mode: SearchMode) -> Duration {
        match mode {
            SearchMode::General => self.general_timeout,
            SearchMode::Realtime => self.realtime_timeout,
        }
    }
}

/// Condition-search client over per-call gateway sessions.
#[derive(Debug, Clone)]
pub struct ConditionSearchClient {
    config: GatewayConfig,
}

impl ConditionSearchClient {
    /// Create a client.
    #[must_use]
    pub const fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// List the conditions stored on the gateway, in gateway order.
    ///
    /// # Errors
    ///
    /// Returns the transport, login, protocol or timeout failure.
    pub async fn list_conditions(&self) -> Result<Vec<ConditionDefinition>, ConditionSearchError> {
        let session = Session::open(&self.config.session).await?;
        let result = self.list_on(&session).await;
        session.close().await;

        match &result {
            Ok(conditions) => tracing::debug!(count = conditions.len(), "Condition list received"),
            Err(e) => log_failure("condition list", e),
        }
        result
    }

    /// Run one search for `condition_id`.
    ///
    /// Scope and cursor only apply to general searches. An empty match list
    /// is a success.
    ///
    /// # Errors
    ///
    /// Returns the transport, login, protocol or timeout failure, or
    /// [`ConditionSearchError::InvalidRequest`] for a blank condition id.
    pub async fn search(
        &self,
        condition_id: &str,
        mode: SearchMode,
        scope: ExchangeScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ConditionSearchError> {
        let condition_id = condition_id.trim();
        if condition_id.is_empty() {
            return Err(ConditionSearchError::InvalidRequest(
                "condition id cannot be empty".to_string(),
            ));
        }

        let session = Session::open(&self.config.session).await;
        let result = match session {
            Ok(session) => {
                let result = self
                    .search_on(&session, condition_id, mode, scope, cursor)
                    .await;
                session.close().await;
                result
            }
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(page) => {
                if page.is_empty() {
                    tracing::debug!(condition_id, mode = mode.as_str(), "Search matched nothing");
                } else {
                    tracing::debug!(
                        condition_id,
                        mode = mode.as_str(),
                        matches = page.len(),
                        more = page.more_available,
                        "Search complete"
                    );
                }
                SearchOutcome::Success
            }
            Err(e) if e.is_timeout() => SearchOutcome::Timeout,
            Err(_) => SearchOutcome::Failed,
        };
        metrics::record_search(mode, outcome);

        if let Err(e) = &result {
            log_failure("condition search", e);
        }
        result
    }

    /// Follow continuation cursors in general mode, one session per page,
    /// and concatenate the matches.
    ///
    /// Stops when the gateway reports no more rows, returns no cursor, or
    /// `max_pages` pages (at least one) have been fetched. The returned page
    /// carries the last page's continuation state.
    ///
    /// # Errors
    ///
    /// Returns the first page failure; matches gathered so far are dropped.
    pub async fn search_all_pages(
        &self,
        condition_id: &str,
        scope: ExchangeScope,
        max_pages: usize,
    ) -> Result<SearchPage, ConditionSearchError> {
        let max_pages = max_pages.max(1);
        let mut combined = self
            .search(condition_id, SearchMode::General, scope, None)
            .await?;
        let mut fetched = 1;

        while fetched < max_pages {
            let Some(cursor) = combined.continuation().map(str::to_owned) else {
                break;
            };

            let page = self
                .search(condition_id, SearchMode::General, scope, Some(&cursor))
                .await?;
            fetched += 1;

            combined.matches.extend(page.matches);
            combined.more_available = page.more_available;
            combined.next_cursor = page.next_cursor;
            combined.fetched_at = page.fetched_at;
        }

        tracing::debug!(
            condition_id,
            pages = fetched,
            matches = combined.len(),
            "Paged search complete"
        );
        Ok(combined)
    }

    /// Stop realtime matching for `condition_id`.
    ///
    /// # Errors
    ///
    /// Returns the transport, login, protocol or timeout failure.
    pub async fn clear_realtime(&self, condition_id: &str) -> Result<(), ConditionSearchError> {
        let condition_id = condition_id.trim();
        if condition_id.is_empty() {
            return Err(ConditionSearchError::InvalidRequest(
                "condition id cannot be empty".to_string(),
            ));
        }

        let session = Session::open(&self.config.session).await?;
        let result = self.clear_on(&session, condition_id).await;
        session.close().await;

        match &result {
            Ok(()) => tracing::debug!(condition_id, "Realtime condition cleared"),
            Err(e) => log_failure("realtime clear", e),
        }
        result
    }

    async fn list_on(
        &self,
        session: &Session,
    ) -> Result<Vec<ConditionDefinition>, ConditionSearchError> {
        let kind = MessageKind::ConditionList;
        let frame = self
            .exchange(
                session,
                session.responses(),
                kind.clone(),
                &kind,
                &ConditionListRequest::default(),
                self.config.list_timeout,
            )
            .await?;

        let response: ConditionListResponse = frame.parse()?;
        if !response.status.is_success() {
            return Err(ConditionSearchError::protocol(kind, &response.status));
        }
        Ok(response.conditions())
    }

    async fn search_on(
        &self,
        session: &Session,
        condition_id: &str,
        mode: SearchMode,
        scope: ExchangeScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ConditionSearchError> {
        let kind = MessageKind::ConditionSearch;
        let request = ConditionSearchRequest::for_mode(condition_id, mode, scope, cursor);
        let frame = self
            .exchange(
                session,
                session.searches(),
                condition_id.to_string(),
                &kind,
                &request,
                self.config.search_timeout(mode),
            )
            .await?;

        let response: ConditionSearchResponse = frame.parse()?;
        if !response.status.is_success() {
            return Err(ConditionSearchError::protocol(kind, &response.status));
        }

        Ok(response.into_page(condition_id, mode))
    }

    async fn clear_on(
        &self,
        session: &Session,
        condition_id: &str,
    ) -> Result<(), ConditionSearchError> {
        let kind = MessageKind::ConditionClear;
        let frame = self
            .exchange(
                session,
                session.responses(),
                kind.clone(),
                &kind,
                &ConditionClearRequest::new(condition_id),
                self.config.list_timeout,
            )
            .await?;

        let ack: Acknowledgement = frame.parse()?;
        if !ack.status.is_success() {
            return Err(ConditionSearchError::protocol(kind, &ack.status));
        }
        Ok(())
    }

    /// Send `request` and wait for the response filed under `key`.
    ///
    /// A stale response left under `key` is discarded first. With
    /// [`ResponseWait::Notify`] the waiter is registered before the frame is
    /// sent, so a fast reply cannot slip past it.
    async fn exchange<K, T>(
        &self,
        session: &Session,
        mailbox: &ResponseCorrelator<K>,
        key: K,
        kind: &MessageKind,
        request: &T,
        deadline: Duration,
    ) -> Result<InboundFrame, ConditionSearchError>
    where
        K: Eq + Hash + Clone + Debug,
        T: Serialize + Sync,
    {
        if mailbox.clear(&key) {
            tracing::debug!(key = ?key, "Discarded stale response");
        }

        let started = Instant::now();
        let response = match self.config.wait {
            ResponseWait::Notify => {
                let pending = mailbox.register(key);
                session.send(kind, request).await?;
                tokio::select! {
                    biased;
                    response = pending.wait(deadline) => response,
                    () = session.closed() => None,
                }
            }
            ResponseWait::Poll { interval } => {
                session.send(kind, request).await?;
                tokio::select! {
                    biased;
                    response = mailbox.poll_until(&key, deadline, interval) => response,
                    () = session.closed() => None,
                }
            }
        };
        session.finish_wait();

        match response {
            Some(frame) => {
                metrics::record_response_latency(kind, started.elapsed());
                Ok(frame)
            }
            None if session.state().is_terminating() => Err(ConditionSearchError::Closed),
            None => {
                // Expected on a best-effort push protocol; not an alarm.
                tracing::info!(
                    session = %session.id(),
                    kind = %kind,
                    waited = ?started.elapsed(),
                    "No response before deadline"
                );
                metrics::record_response_timeout(kind);
                Err(ConditionSearchError::Timeout {
                    kind: kind.clone(),
                    waited: deadline,
                })
            }
        }
    }
}

fn log_failure(operation: &str, err: &ConditionSearchError) {
    if err.is_timeout() {
        tracing::info!(operation, error = %err, "Operation timed out");
    } else {
        tracing::warn!(operation, error = %err, retryable = err.is_retryable(), "Operation failed");
    }
}

#[async_trait]
impl ConditionSearchPort for ConditionSearchClient {
    async fn list_conditions(&self) -> Result<Vec<ConditionDefinition>, ConditionSearchError> {
        Self::list_conditions(self).await
    }

    async fn search(
        &self,
        condition_id: &str,
        mode: SearchMode,
        scope: ExchangeScope,
        cursor: Option<String>,
    ) -> Result<SearchPage, ConditionSearchError> {
        Self::search(self, condition_id, mode, scope, cursor.as_deref()).await
    }

    async fn search_all_pages(
        &self,
        condition_id: &str,
        scope: ExchangeScope,
        max_pages: usize,
    ) -> Result<SearchPage, ConditionSearchError> {
        Self::search_all_pages(self, condition_id, scope, max_pages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig::new("ws://127.0.0.1:9", AccessToken::new("token").unwrap())
    }

    #[test]
    fn default_deadlines() {
        let config = config();
        assert_eq!(config.session.login_timeout, Duration::from_secs(10));
        assert_eq!(config.list_timeout, Duration::from_secs(5));
        assert_eq!(config.search_timeout(SearchMode::General), Duration::from_secs(20));
        assert_eq!(config.search_timeout(SearchMode::Realtime), Duration::from_secs(30));
        assert_eq!(config.wait, ResponseWait::Notify);
    }

    #[tokio::test]
    async fn blank_condition_id_rejected_without_connecting() {
        let client = ConditionSearchClient::new(config());
        let err = client
            .search("  ", SearchMode::General, ExchangeScope::All, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConditionSearchError::InvalidRequest(_)));
        assert!(!err.is_retryable());

        let err = client.clear_realtime("").await.unwrap_err();
        assert!(matches!(err, ConditionSearchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_connection_failure() {
        let mut config = config();
        config.session.connect_timeout = Duration::from_millis(500);
        let client = ConditionSearchClient::new(config);

        let err = client.list_conditions().await.unwrap_err();
        assert!(matches!(err, ConditionSearchError::Connection(_)));
        assert!(err.is_retryable());
    }
}
