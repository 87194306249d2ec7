//! Kiwoom Condition Sweep Binary
//!
//! Lists the account's stored conditions and runs each one through a
//! general and a realtime search, then logs a per-mode summary.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kiwoom-condition-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KIWOOM_ACCESS_TOKEN`: Gateway bearer token
//!
//! ## Optional
//! - `KIWOOM_ENV`: LIVE | MOCK (default: LIVE)
//! - `KIWOOM_WS_URL`: Override the gateway WebSocket URL
//! - `CONDITION_CLIENT_*`: Connect, login and response deadlines; wait strategy
//! - `CONDITION_SWEEP_SCOPE`: K | Q | % (default: %)
//! - `CONDITION_SWEEP_IDS`: Comma-separated condition ids (default: all)
//! - `CONDITION_SWEEP_MAX_PAGES`: General-mode pages per condition (default: 1)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use kiwoom_condition_client::infrastructure::metrics::get_metrics_handle;
use kiwoom_condition_client::infrastructure::telemetry;
use kiwoom_condition_client::{
    ClientConfig, ConditionSearchClient, ConditionSweep, SearchMode, SweepReport, init_metrics,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting condition sweep");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder unavailable");
    }

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let client = Arc::new(ConditionSearchClient::new(config.gateway_config()));
    let sweep = ConditionSweep::new(client, config.sweep_options());

    let report = tokio::select! {
        result = sweep.run() => result.context("condition sweep failed")?,
        () = await_shutdown() => {
            tracing::info!("Sweep interrupted");
            return Ok(());
        }
    };

    log_report(&report);

    if let Some(handle) = get_metrics_handle() {
        tracing::debug!(metrics = %handle.render(), "Metrics snapshot");
    }

    tracing::info!("Condition sweep finished");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        scope = config.sweep.scope.code(),
        conditions = ?config.sweep.condition_ids,
        max_pages = config.sweep.max_pages,
        "Configuration loaded"
    );
    tracing::debug!(
        ws_url = %config.ws_url(),
        wait = ?config.wait,
        timeouts = ?config.timeouts,
        "Gateway settings"
    );
}

/// Log the per-mode tallies and the matches found.
fn log_report(report: &SweepReport) {
    for &mode in SearchMode::all() {
        let tally = report.tally(mode);
        tracing::info!(
            mode = mode.as_str(),
            success = tally.success,
            failed = tally.failed,
            timeout = tally.timeout,
            total = tally.total(),
            "Sweep summary"
        );
        for entry in report.successes(mode) {
            tracing::debug!(
                mode = mode.as_str(),
                condition_id = %entry.condition.id,
                condition_name = %entry.condition.name,
                status = ?entry.status,
                "Condition matched"
            );
        }
    }

    if !report.unknown_ids.is_empty() {
        tracing::warn!(ids = ?report.unknown_ids, "Requested conditions were not listed");
    }

    match serde_json::to_string(report) {
        Ok(json) => tracing::debug!(report = %json, "Sweep report"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize sweep report"),
    }
}

/// Wait for Ctrl+C or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping sweep");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping sweep");
        }
    }
}
