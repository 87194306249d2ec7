//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ConditionSearchPort`: condition listing and searches against the
//!   brokerage gateway, implemented by
//!   [`ConditionSearchClient`](crate::infrastructure::kiwoom::ConditionSearchClient)

use async_trait::async_trait;

use crate::domain::condition::{ConditionDefinition, ExchangeScope, SearchMode, SearchPage};
use crate::infrastructure::kiwoom::ConditionSearchError;

/// Condition-search operations against the gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConditionSearchPort: Send + Sync {
    /// List the conditions stored on the gateway, in gateway order.
    async fn list_conditions(&self) -> Result<Vec<ConditionDefinition>, ConditionSearchError>;

    /// Run one search page for a condition.
    async fn search(
        &self,
        condition_id: &str,
        mode: SearchMode,
        scope: ExchangeScope,
        cursor: Option<String>,
    ) -> Result<SearchPage, ConditionSearchError>;

    /// Run a general search following continuation cursors, up to
    /// `max_pages` pages.
    async fn search_all_pages(
        &self,
        condition_id: &str,
        scope: ExchangeScope,
        max_pages: usize,
    ) -> Result<SearchPage, ConditionSearchError>;
}
