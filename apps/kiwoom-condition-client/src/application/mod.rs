//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with the gateway.

/// Port interfaces for external systems (the condition-search gateway).
pub mod ports;

/// Application services for condition sweeps and lookups.
pub mod services;
