//! Client Configuration Settings
//!
//! Configuration types for the condition-search client, loaded from
//! environment variables.

use std::time::Duration;

use crate::application::services::SweepOptions;
use crate::domain::condition::ExchangeScope;
use crate::infrastructure::kiwoom::correlator::MIN_POLL_INTERVAL;
use crate::infrastructure::kiwoom::submitter::{
    DEFAULT_GENERAL_TIMEOUT, DEFAULT_LIST_TIMEOUT, DEFAULT_LOGIN_TIMEOUT, DEFAULT_POLL_INTERVAL,
    DEFAULT_REALTIME_TIMEOUT,
};
use crate::infrastructure::kiwoom::{
    AccessToken, GatewayConfig, LIVE_WS_URL, MOCK_WS_URL, ResponseWait, SessionConfig,
};

/// Gateway environment (live vs mock trading).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live gateway.
    #[default]
    Live,
    /// Mock-trading gateway.
    Mock,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "MOCK" | "PAPER" => Self::Mock,
            _ => Self::Live,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Mock => "mock",
        }
    }

    /// Gateway WebSocket URL for this environment.
    #[must_use]
    pub const fn ws_url(&self) -> &'static str {
        match self {
            Self::Live => LIVE_WS_URL,
            Self::Mock => MOCK_WS_URL,
        }
    }
}

/// Request deadlines.
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    /// Time allowed to open the transport.
    pub connect: Duration,
    /// Time allowed for the login acknowledgement.
    pub login: Duration,
    /// Condition list and realtime clear deadline.
    pub list: Duration,
    /// General search deadline.
    pub general: Duration,
    /// Realtime search deadline.
    pub realtime: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            login: DEFAULT_LOGIN_TIMEOUT,
            list: DEFAULT_LIST_TIMEOUT,
            general: DEFAULT_GENERAL_TIMEOUT,
            realtime: DEFAULT_REALTIME_TIMEOUT,
        }
    }
}

/// Sweep binary settings.
#[derive(Debug, Clone, Default)]
pub struct SweepSettings {
    /// Exchange scope for general searches.
    pub scope: ExchangeScope,
    /// Restrict the sweep to these condition ids (empty = all listed).
    pub condition_ids: Vec<String>,
    /// General-mode pages to fetch per condition.
    pub max_pages: usize,
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway environment.
    pub environment: Environment,
    /// Explicit WebSocket URL, overriding the environment's.
    pub ws_url_override: Option<String>,
    /// Bearer token.
    pub token: AccessToken,
    /// Request deadlines.
    pub timeouts: TimeoutSettings,
    /// How callers wait for responses.
    pub wait: ResponseWait,
    /// Sweep settings.
    pub sweep: SweepSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `KIWOOM_ACCESS_TOKEN` is missing or blank.
    pub fn from_lookup<F>(vars: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = vars("KIWOOM_ACCESS_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("KIWOOM_ACCESS_TOKEN".to_string()))?;
        let token = AccessToken::new(&token)
            .map_err(|_| ConfigError::EmptyValue("KIWOOM_ACCESS_TOKEN".to_string()))?;

        let environment = vars("KIWOOM_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let ws_url_override = vars("KIWOOM_WS_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let defaults = TimeoutSettings::default();
        let timeouts = TimeoutSettings {
            connect: parse_env_duration_secs(
                &vars,
                "CONDITION_CLIENT_CONNECT_TIMEOUT_SECS",
                defaults.connect,
            ),
            login: parse_env_duration_secs(
                &vars,
                "CONDITION_CLIENT_LOGIN_TIMEOUT_SECS",
                defaults.login,
            ),
            list: parse_env_duration_millis(
                &vars,
                "CONDITION_CLIENT_LIST_TIMEOUT_MS",
                defaults.list,
            ),
            general: parse_env_duration_secs(
                &vars,
                "CONDITION_CLIENT_GENERAL_TIMEOUT_SECS",
                defaults.general,
            ),
            realtime: parse_env_duration_secs(
                &vars,
                "CONDITION_CLIENT_REALTIME_TIMEOUT_SECS",
                defaults.realtime,
            ),
        };

        let poll_interval = parse_env_duration_millis(
            &vars,
            "CONDITION_CLIENT_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL,
        )
        .max(MIN_POLL_INTERVAL);
        let wait = match vars("CONDITION_CLIENT_WAIT")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            Some("poll") => ResponseWait::Poll {
                interval: poll_interval,
            },
            _ => ResponseWait::Notify,
        };

        let sweep = SweepSettings {
            scope: vars("CONDITION_SWEEP_SCOPE")
                .map(|s| ExchangeScope::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            condition_ids: vars("CONDITION_SWEEP_IDS")
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
            max_pages: parse_env_usize(&vars, "CONDITION_SWEEP_MAX_PAGES", 1).max(1),
        };

        Ok(Self {
            environment,
            ws_url_override,
            token,
            timeouts,
            wait,
            sweep,
        })
    }

    /// Gateway WebSocket URL.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        self.ws_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.ws_url())
    }

    /// Client configuration for the gateway adapter.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            session: SessionConfig {
                url: self.ws_url().to_string(),
                token: self.token.clone(),
                connect_timeout: self.timeouts.connect,
                login_timeout: self.timeouts.login,
            },
            list_timeout: self.timeouts.list,
            general_timeout: self.timeouts.general,
            realtime_timeout: self.timeouts.realtime,
            wait: self.wait,
        }
    }

    /// Options for the condition sweep.
    #[must_use]
    pub fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            scope: self.sweep.scope,
            condition_ids: self.sweep.condition_ids.clone(),
            max_pages: self.sweep.max_pages,
            ..SweepOptions::default()
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env_usize<F>(vars: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    vars(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs<F>(vars: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    vars(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F>(vars: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    vars(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
