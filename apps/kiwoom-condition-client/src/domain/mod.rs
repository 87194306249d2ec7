//! Domain Layer - Condition search types and session lifecycle.
//!
//! This layer contains the core domain types with no transport
//! dependencies. Everything here is pure Rust with serialization support.

/// Conditions, matches and search parameters.
pub mod condition;

/// Session lifecycle state machine.
pub mod session;
