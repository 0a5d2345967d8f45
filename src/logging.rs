//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout; ANSI colors only when stdout is a terminal. Set
//! `WORKPULL_LOG_FORMAT=json` for one JSON object per line.
//!
//! Level resolution: `RUST_LOG` if set, otherwise derived from the
//! environment name (`WORKPULL_ENV`, then `APP_ENV`, default `development`).

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::env;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once, and tolerates a global subscriber installed
/// by someone else.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());
        let json = wants_json(std::env::var(env::LOG_FORMAT).ok().as_deref());

        let console_layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                ansi_colors = use_ansi,
                json = json,
                "Structured logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    environment_from(|key| std::env::var(key).ok())
}

fn environment_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(env::ENVIRONMENT)
        .or_else(|| lookup(env::FALLBACK_ENVIRONMENT))
        .unwrap_or_else(|| env::DEFAULT_ENVIRONMENT.to_string())
        .to_lowercase()
}

/// Get log level from `RUST_LOG`, falling back to environment defaults
fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }
    default_log_level(environment).to_string()
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "test" | "development" => "debug",
        "production" => "info",
        _ => "debug",
    }
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.eq_ignore_ascii_case("json"))
}

/// Log structured data for a dispatch run milestone
pub fn log_dispatch_operation(
    operation: &str,
    run_id: Option<uuid::Uuid>,
    number_of_workers: Option<usize>,
    items_processed: Option<u64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        run_id = run_id.map(|id| id.to_string()),
        number_of_workers = number_of_workers,
        items_processed = items_processed,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DISPATCH_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
