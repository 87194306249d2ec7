#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Kiwoom Condition Search Client
//!
//! A WebSocket client for the Kiwoom gateway's condition-search protocol.
//! Each public call opens an authenticated session, sends one correlated
//! request, waits for the matching response under a deadline and closes
//! the session.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Condition types and the session state machine
//!   - `condition`: Conditions, matches, search modes and scopes
//!   - `session`: Session lifecycle transitions
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The condition-search gateway interface
//!   - `services`: Condition sweeps and lookup by name
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kiwoom`: WebSocket session, dispatcher and correlator
//!   - `config`: Environment-driven configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//! caller ──► ConditionSearchClient ──► Session ──► WebSocket ──► gateway
//!                    ▲                                 │
//!                    │                                 ▼
//!           ResponseCorrelator ◄──── MessageDispatcher (PING echo)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Condition types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::condition::{
    ConditionDefinition, ConditionMatch, ExchangeScope, SearchMode, SearchPage,
};
pub use domain::session::SessionState;

// Application services
pub use application::ports::ConditionSearchPort;
pub use application::services::{
    ConditionSweep, ModeTally, SweepEntry, SweepOptions, SweepReport, SweepStatus,
    find_condition_by_name, search_by_condition_name,
};

// Gateway client
pub use infrastructure::kiwoom::{
    AccessToken, ConditionSearchClient, ConditionSearchError, GatewayConfig, ResponseWait,
    SessionConfig,
};

// Infrastructure config
pub use infrastructure::config::{
    ClientConfig, ConfigError, Environment, SweepSettings, TimeoutSettings,
};

// Metrics
pub use infrastructure::metrics::{SearchOutcome, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
