//! Configuration Module
//!
//! Environment-driven configuration for the condition-search client.

mod settings;

pub use settings::{ClientConfig, ConfigError, Environment, SweepSettings, TimeoutSettings};
