//! Application Services
//!
//! Services that orchestrate domain logic over the condition-search port.
//!
//! - `ConditionSweep`: runs every condition in both search modes and tallies
//!   the outcomes
//! - `find_condition_by_name`: resolves a display name to its condition

mod lookup;
mod sweep;

pub use lookup::{find_condition_by_name, search_by_condition_name};
pub use sweep::{ConditionSweep, ModeTally, SweepEntry, SweepOptions, SweepReport, SweepStatus};
