//! # Structured Logging Module
//!
//! Environment-aware structured logging for the scheduling core. Output is
//! human-readable by default and JSON lines when configured.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::{ConfigManager, TelemetryConfig};
use crate::models::Lane;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber and
/// an already-installed global subscriber is left in place.
pub fn init_structured_logging(telemetry: &TelemetryConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let default_level = telemetry
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level(&environment).to_string());

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_level));

        let result = if telemetry.json_logs {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_current_span(true),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_thread_ids(true))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = telemetry.json_logs,
            level = %default_level,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Log level used when neither RUST_LOG nor the config sets one
fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log structured data for a job lifecycle operation
pub fn log_job_operation(
    operation: &str,
    job_id: Uuid,
    lane: Lane,
    worker_id: Option<Uuid>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = %job_id,
        lane = %lane,
        worker_id = ?worker_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}
