//! Condition lookup by display name.

use crate::application::ports::ConditionSearchPort;
use crate::domain::condition::{ConditionDefinition, ExchangeScope, SearchPage};
use crate::infrastructure::kiwoom::ConditionSearchError;

/// Find the first listed condition whose display name equals `name`.
///
/// Returns `Ok(None)` when no condition carries that name.
///
/// # Errors
///
/// Returns the failure of the underlying list query.
pub async fn find_condition_by_name(
    port: &dyn ConditionSearchPort,
    name: &str,
) -> Result<Option<ConditionDefinition>, ConditionSearchError> {
    let conditions = port.list_conditions().await?;
    let found = conditions.iter().find(|c| c.name == name).cloned();

    match &found {
        Some(condition) => {
            tracing::info!(name, condition_id = %condition.id, "Condition found");
        }
        None => {
            let available: Vec<&str> = conditions.iter().map(|c| c.name.as_str()).collect();
            tracing::warn!(name, available = ?available, "Condition not found");
        }
    }
    Ok(found)
}

/// Resolve `name` and run a paged general search for it.
///
/// Returns `Ok(None)` when no condition carries that name.
///
/// # Errors
///
/// Returns the failure of the list query or of any search page.
pub async fn search_by_condition_name(
    port: &dyn ConditionSearchPort,
    name: &str,
    scope: ExchangeScope,
    max_pages: usize,
) -> Result<Option<SearchPage>, ConditionSearchError> {
    let Some(condition) = find_condition_by_name(port, name).await? else {
        return Ok(None);
    };

    let page = port
        .search_all_pages(&condition.id, scope, max_pages)
        .await?;
    if page.is_empty() {
        tracing::info!(name, condition_id = %condition.id, "Search returned no matches");
    }
    Ok(Some(page))
}
