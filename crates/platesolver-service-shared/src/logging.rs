//! Tracing setup for the plate-solving service.
//!
//! Two knobs matter in practice: the overall level, and the level for the
//! solver crate itself. Engine builds, releases and the `solve-field`
//! command lines are logged by `platesolver_lib`, so turning that target up
//! to `debug` traces a solve without flooding the log with HTTP noise.
//!
//! | Variable       | Meaning                                    | Default       |
//! |----------------|--------------------------------------------|---------------|
//! | `LOG_FORMAT`   | `json` or `text` (`pretty` is an alias)    | `json`        |
//! | `RUST_LOG`     | full filter, overrides both levels below   | unset         |
//! | `LOG_LEVEL`    | level for every target                     | `info`        |
//! | `SOLVER_LOG`   | level for `platesolver_lib`                | same as above |
//! | `SERVICE_NAME` | name in logs and health responses          | `platesolver` |
//!
//! ```no_run
//! use platesolver_service_shared::logging::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::from_env());
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Service name used when `SERVICE_NAME` is not set.
pub const DEFAULT_SERVICE_NAME: &str = "platesolver";

/// Tracing target of the solver crate.
const SOLVER_TARGET: &str = "platesolver_lib";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Text,
}

impl LogFormat {
    /// `text` and `pretty` select [`LogFormat::Text`]; anything else is JSON.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to every target.
    pub level: String,
    /// Level for the solver crate, when it should differ from `level`.
    pub solver_level: Option<String>,
    pub service: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            solver_level: None,
            service: None,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            format: non_empty("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            solver_level: non_empty("SOLVER_LOG"),
            service: non_empty("SERVICE_NAME"),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_solver_level(mut self, level: impl Into<String>) -> Self {
        self.solver_level = Some(level.into());
        self
    }

    /// The configured service name, or [`DEFAULT_SERVICE_NAME`].
    pub fn service_name(&self) -> &str {
        self.service.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    /// Filter directives built from `level` and `solver_level`.
    pub fn filter_directives(&self) -> String {
        match &self.solver_level {
            Some(solver) => format!("{},{}={}", self.level, SOLVER_TARGET, solver),
            None => self.level.clone(),
        }
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, replaces the
/// configured directives. A second call leaves the first subscriber in place.
///
/// A JSON event looks like:
///
/// ```json
/// {"timestamp":"2026-01-05T10:00:00Z","level":"INFO","target":"platesolver_lib::session","fields":{"message":"matching engine ready","handle":1}}
/// ```
pub fn init_logging(config: &LoggingConfig) {
    let directives = config.filter_directives();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(
            service = config.service_name(),
            format = ?config.format,
            filter = %directives,
            "logging initialized"
        );
    }
}
