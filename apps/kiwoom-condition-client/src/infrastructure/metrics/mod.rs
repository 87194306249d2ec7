//! Prometheus Metrics Module
//!
//! Application metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: Counts of gateway frames received and sent by type
//! - **Sessions**: Open sessions and login outcomes
//! - **Searches**: Condition search outcomes by mode
//! - **Latency**: Time from request to matching response, session lifetime
//!
//! The recorder is installed once; the binary renders the snapshot at exit.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::condition::SearchMode;
use crate::infrastructure::kiwoom::MessageKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the existing handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "kiwoom_condition_frames_received_total",
        "Total frames received from the gateway by type"
    );
    describe_counter!(
        "kiwoom_condition_frames_sent_total",
        "Total request frames sent to the gateway by type"
    );
    describe_counter!(
        "kiwoom_condition_keepalive_echoes_total",
        "Total keepalive frames echoed back to the gateway"
    );

    // Session gauges and counters
    describe_gauge!(
        "kiwoom_condition_sessions_open",
        "Number of open gateway sessions"
    );
    describe_counter!(
        "kiwoom_condition_logins_total",
        "Total login acknowledgements by outcome"
    );

    // Error counters
    describe_counter!(
        "kiwoom_condition_websocket_errors_total",
        "Total WebSocket errors by type"
    );
    describe_counter!(
        "kiwoom_condition_response_timeouts_total",
        "Total waits that ended without a response"
    );

    // Search outcomes
    describe_counter!(
        "kiwoom_condition_searches_total",
        "Total condition searches by mode and outcome"
    );

    // Latency histograms
    describe_histogram!(
        "kiwoom_condition_response_seconds",
        "Time from sending a request to receiving its response"
    );
    describe_histogram!(
        "kiwoom_condition_session_seconds",
        "Lifetime of a gateway session from connect to close"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a condition search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Response received with a zero return code.
    Success,
    /// Error response or transport failure.
    Failed,
    /// No response before the deadline.
    Timeout,
}

impl SearchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Record a frame received from the gateway.
pub fn record_frame_received(kind: &MessageKind) {
    counter!(
        "kiwoom_condition_frames_received_total",
        "message_type" => kind.as_str().to_string()
    )
    .increment(1);
}

/// Record a request frame sent to the gateway.
pub fn record_request_sent(kind: &MessageKind) {
    counter!(
        "kiwoom_condition_frames_sent_total",
        "message_type" => kind.as_str().to_string()
    )
    .increment(1);
}

/// Record a keepalive echoed back.
pub fn record_keepalive_echo() {
    counter!("kiwoom_condition_keepalive_echoes_total").increment(1);
}

/// Increment the open session gauge.
pub fn record_session_opened() {
    gauge!("kiwoom_condition_sessions_open").increment(1.0);
}

/// Adjust the open session gauge and record how long the session lived.
pub fn record_session_closed(lifetime: Duration) {
    gauge!("kiwoom_condition_sessions_open").decrement(1.0);
    histogram!("kiwoom_condition_session_seconds").record(lifetime.as_secs_f64());
}

/// Record a login acknowledgement.
pub fn record_login(accepted: bool) {
    counter!(
        "kiwoom_condition_logins_total",
        "outcome" => if accepted { "accepted" } else { "rejected" }
    )
    .increment(1);
}

/// Record a WebSocket error.
pub fn record_websocket_error(error_type: &str) {
    counter!(
        "kiwoom_condition_websocket_errors_total",
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a wait that ended without a response.
pub fn record_response_timeout(kind: &MessageKind) {
    counter!(
        "kiwoom_condition_response_timeouts_total",
        "message_type" => kind.as_str().to_string()
    )
    .increment(1);
}

/// Record the outcome of a condition search.
pub fn record_search(mode: SearchMode, outcome: SearchOutcome) {
    counter!(
        "kiwoom_condition_searches_total",
        "mode" => mode.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record time from request to response.
pub fn record_response_latency(kind: &MessageKind, duration: Duration) {
    histogram!(
        "kiwoom_condition_response_seconds",
        "message_type" => kind.as_str().to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_outcome_as_str() {
        assert_eq!(SearchOutcome::Success.as_str(), "success");
        assert_eq!(SearchOutcome::Failed.as_str(), "failed");
        assert_eq!(SearchOutcome::Timeout.as_str(), "timeout");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_frame_received(&MessageKind::Ping);
        record_request_sent(&MessageKind::ConditionList);
        record_search(SearchMode::General, SearchOutcome::Timeout);
        record_response_latency(&MessageKind::ConditionSearch, Duration::from_millis(5));
    }
}
