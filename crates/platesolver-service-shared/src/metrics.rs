//! Prometheus metrics infrastructure for the plate-solving service.
//!
//! This module provides:
//! - [`MetricsConfig`]: Configuration for the metrics system
//! - [`init_metrics`]: Initialize the Prometheus metrics recorder
//! - [`metrics_handler`]: Axum handler for `/metrics` endpoint
//! - Business metric helpers for solve outcomes
//!
//! # Example
//!
//! ```no_run
//! use platesolver_service_shared::metrics::{MetricsConfig, init_metrics, metrics_handler};
//! use axum::{Router, routing::get};
//!
//! let config = MetricsConfig::default();
//! init_metrics(&config).expect("failed to initialize metrics");
//!
//! let app: Router = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use platesolver_lib::SolveReport;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Configuration for the metrics system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Path for the metrics endpoint (e.g., "/metrics").
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Create configuration from environment variables.
    ///
    /// - `METRICS_ENABLED`: "true" or "false" (default: true)
    /// - `METRICS_PATH`: Path for metrics endpoint (default: "/metrics")
    pub fn from_env() -> Self {
        let enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let path = std::env::var("METRICS_PATH")
            .ok()
            .filter(|p| p.starts_with('/'))
            .unwrap_or_else(|| "/metrics".to_string());

        Self { enabled, path }
    }
}

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at application startup before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if:
/// - Metrics are disabled in configuration
/// - The recorder has already been installed
/// - The Prometheus builder fails to install
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }

    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if [`init_metrics`] has not been called.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Axum handler for the `/metrics` endpoint.
///
/// Returns Prometheus exposition format text.
pub async fn metrics_handler() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# Metrics not initialized\n".to_string())
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, Clone)]
pub enum MetricsError {
    /// Metrics are disabled in configuration.
    Disabled,
    /// The recorder has already been installed.
    AlreadyInitialized,
    /// The Prometheus builder failed to install.
    InstallFailed(String),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Disabled => write!(f, "metrics are disabled"),
            MetricsError::AlreadyInitialized => write!(f, "metrics recorder already initialized"),
            MetricsError::InstallFailed(e) => {
                write!(f, "failed to install metrics recorder: {}", e)
            }
        }
    }
}

impl std::error::Error for MetricsError {}

// =============================================================================
// Business Metrics Helpers
// =============================================================================

/// Outcome label for a finished solve: `match`, `no_match` or `short_circuit`.
pub fn outcome_label(report: &SolveReport) -> &'static str {
    if report.short_circuited {
        "short_circuit"
    } else {
        report.outcome.label()
    }
}

/// Record a completed solve.
///
/// Increments `platesolver_solves_total{outcome}` and records the peak count
/// and, when the engine ran, the engine time.
pub fn record_solve(report: &SolveReport) {
    metrics::counter!(
        "platesolver_solves_total",
        "outcome" => outcome_label(report)
    )
    .increment(1);

    record_solve_peaks(report.peaks);

    if !report.short_circuited {
        record_solve_duration(report.engine_time);
    }
}

/// Record a failed solve.
///
/// Increments the `platesolver_solves_failed_total` counter.
///
/// # Arguments
///
/// * `reason` - The failure kind (e.g., "validation_error", "engine_unavailable", "solve_failure")
pub fn record_solve_failed(reason: &str) {
    metrics::counter!(
        "platesolver_solves_failed_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record the number of peaks in a request.
pub fn record_solve_peaks(peaks: usize) {
    metrics::histogram!("platesolver_solve_peaks").record(peaks as f64);
}

/// Record time spent inside the matching engine.
pub fn record_solve_duration(elapsed: Duration) {
    metrics::histogram!("platesolver_solve_duration_seconds").record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use platesolver_lib::SolveOutcome;

    fn report(short_circuited: bool) -> SolveReport {
        SolveReport {
            outcome: SolveOutcome::NoMatch,
            peaks: if short_circuited { 4 } else { 25 },
            short_circuited,
            engine_time: Duration::from_millis(if short_circuited { 0 } else { 840 }),
        }
    }

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.path, "/metrics");
    }

    #[test]
    fn test_metrics_handler_returns_prometheus_format() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let output = rt.block_on(async { metrics_handler().await });

        assert!(
            output.contains('#') || output.is_empty(),
            "Metrics output should be Prometheus format or indicate not initialized"
        );
    }

    #[test]
    fn test_outcome_label() {
        assert_eq!(outcome_label(&report(true)), "short_circuit");
        assert_eq!(outcome_label(&report(false)), "no_match");
    }

    #[test]
    fn test_business_metric_helpers() {
        record_solve(&report(true));
        record_solve(&report(false));
        record_solve_failed("solve_failure");
        record_solve_failed("validation_error");
        // If we get here without panic, the helpers work
    }

    #[test]
    fn test_metrics_error_display() {
        let disabled = MetricsError::Disabled;
        assert_eq!(disabled.to_string(), "metrics are disabled");

        let already_init = MetricsError::AlreadyInitialized;
        assert_eq!(
            already_init.to_string(),
            "metrics recorder already initialized"
        );

        let failed = MetricsError::InstallFailed("test error".to_string());
        assert!(failed.to_string().contains("test error"));
    }
}
