//! Condition Sweep Service
//!
//! Runs every listed condition through a general and a realtime search and
//! tallies success, failure and timeout per mode. Searches run one at a
//! time, so no two requests ever share a correlation key.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::application::ports::ConditionSearchPort;
use crate::domain::condition::{ConditionDefinition, ExchangeScope, SearchMode, SearchPage};
use crate::infrastructure::kiwoom::ConditionSearchError;

/// What to sweep.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Exchange scope for general searches.
    pub scope: ExchangeScope,
    /// Only sweep these ids; empty sweeps every listed condition.
    pub condition_ids: Vec<String>,
    /// General-mode pages per condition.
    pub max_pages: usize,
    /// Search modes to run, in order.
    pub modes: Vec<SearchMode>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            scope: ExchangeScope::All,
            condition_ids: Vec::new(),
            max_pages: 1,
            modes: SearchMode::all().to_vec(),
        }
    }
}

/// Result of one search in a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepStatus {
    /// Response received; `matches` may be zero.
    Success {
        /// Number of matched instruments.
        matches: usize,
    },
    /// The gateway rejected the request, or the transport failed.
    Failed {
        /// Gateway return code, when the gateway answered.
        code: Option<i64>,
        /// Failure description.
        reason: String,
    },
    /// No response before the deadline.
    Timeout,
}

impl SweepStatus {
    fn from_result(result: &Result<SearchPage, ConditionSearchError>) -> Self {
        match result {
            Ok(page) => Self::Success {
                matches: page.len(),
            },
            Err(e) if e.is_timeout() => Self::Timeout,
            Err(e) => Self::Failed {
                code: match e {
                    ConditionSearchError::Protocol { code, .. } => Some(*code),
                    _ => None,
                },
                reason: e.to_string(),
            },
        }
    }
}

/// One condition/mode outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepEntry {
    /// Condition searched.
    pub condition: ConditionDefinition,
    /// Mode it ran in.
    pub mode: SearchMode,
    /// Outcome.
    #[serde(flatten)]
    pub status: SweepStatus,
}

/// Outcome counts for one mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModeTally {
    /// Searches that returned a response.
    pub success: usize,
    /// Searches that failed.
    pub failed: usize,
    /// Searches that timed out.
    pub timeout: usize,
}

impl ModeTally {
    /// Total searches counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.success + self.failed + self.timeout
    }

    fn record(&mut self, status: &SweepStatus) {
        match status {
            SweepStatus::Success { .. } => self.success += 1,
            SweepStatus::Failed { .. } => self.failed += 1,
            SweepStatus::Timeout => self.timeout += 1,
        }
    }
}

/// Sweep results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Conditions swept.
    pub conditions: Vec<ConditionDefinition>,
    /// Requested ids the gateway does not list.
    pub unknown_ids: Vec<String>,
    /// Tallies per mode name.
    pub tallies: BTreeMap<&'static str, ModeTally>,
    /// Every outcome, in sweep order.
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    /// Tally for `mode`.
    #[must_use]
    pub fn tally(&self, mode: SearchMode) -> ModeTally {
        self.tallies.get(mode.as_str()).copied().unwrap_or_default()
    }

    /// Successful entries for `mode`.
    pub fn successes(&self, mode: SearchMode) -> impl Iterator<Item = &SweepEntry> {
        self.entries
            .iter()
            .filter(move |e| e.mode == mode && matches!(e.status, SweepStatus::Success { .. }))
    }

    fn record(&mut self, entry: SweepEntry) {
        self.tallies
            .entry(entry.mode.as_str())
            .or_default()
            .record(&entry.status);
        self.entries.push(entry);
    }
}

/// Runs conditions through the configured search modes.
pub struct ConditionSweep {
    port: Arc<dyn ConditionSearchPort>,
    options: SweepOptions,
}

impl ConditionSweep {
    /// Create a sweep over `port`.
    #[must_use]
    pub fn new(port: Arc<dyn ConditionSearchPort>, options: SweepOptions) -> Self {
        Self { port, options }
    }

    /// List conditions and search each one in every mode.
    ///
    /// Individual search failures are tallied, not returned.
    ///
    /// # Errors
    ///
    /// Returns the list query failure; nothing can be swept without it.
    pub async fn run(&self) -> Result<SweepReport, ConditionSearchError> {
        let listed = self.port.list_conditions().await?;
        let mut report = SweepReport::default();

        let conditions = if self.options.condition_ids.is_empty() {
            listed
        } else {
            for id in &self.options.condition_ids {
                if !listed.iter().any(|c| &c.id == id) {
                    tracing::warn!(condition_id = %id, "Requested condition not listed");
                    report.unknown_ids.push(id.clone());
                }
            }
            listed
                .into_iter()
                .filter(|c| self.options.condition_ids.contains(&c.id))
                .collect()
        };

        tracing::info!(
            conditions = conditions.len(),
            modes = self.options.modes.len(),
            "Starting condition sweep"
        );

        for (index, condition) in conditions.iter().enumerate() {
            for &mode in &self.options.modes {
                let result = self.search(condition, mode).await;
                let status = SweepStatus::from_result(&result);

                tracing::info!(
                    progress = format!("{}/{}", index + 1, conditions.len()),
                    condition_id = %condition.id,
                    condition_name = %condition.name,
                    mode = mode.as_str(),
                    status = ?status,
                    "Condition searched"
                );

                report.record(SweepEntry {
                    condition: condition.clone(),
                    mode,
                    status,
                });
            }
        }

        report.conditions = conditions;
        Ok(report)
    }

    async fn search(
        &self,
        condition: &ConditionDefinition,
        mode: SearchMode,
    ) -> Result<SearchPage, ConditionSearchError> {
        match mode {
            SearchMode::General if self.options.max_pages > 1 => {
                self.port
                    .search_all_pages(&condition.id, self.options.scope, self.options.max_pages)
                    .await
            }
            _ => {
                self.port
                    .search(&condition.id, mode, self.options.scope, None)
                    .await
            }
        }
    }
}
