//! Shared infrastructure for the plate-solving HTTP microservice.
//!
//! This crate provides the HTTP glue around `platesolver-lib`:
//!
//! - [`AppState`]: The shared plate solver and its single engine session
//! - [`health`]: Health check handlers for Kubernetes liveness/readiness probes
//! - [`ProblemDetails`]: RFC 9457 Problem Details for consistent error responses
//! - [`metrics`]: Prometheus metrics infrastructure
//! - [`logging`]: Structured JSON logging setup
//! - [`middleware`]: Request tracking and metrics middleware
//!
//! # Architecture
//!
//! The service follows a thin-handler pattern where all business logic resides
//! in `platesolver-lib`. This crate provides only HTTP glue:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  axum Handler                                               │
//! │  - Parse request JSON                                       │
//! │  - Call platesolver-lib on the blocking pool                │
//! │  - Map errors to Problem Details                            │
//! │  - Format response                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides state backed by a stub matching engine
//! for handler testing. Enable the `test-utils` feature to access it from
//! dependent crates.

#![deny(warnings)]

mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod problem;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use health::{health_live, health_ready, HealthStatus, SessionStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig, DEFAULT_SERVICE_NAME};
pub use metrics::{
    init_metrics, metrics_handler, record_solve, record_solve_failed, MetricsConfig, MetricsError,
};
pub use middleware::{extract_or_generate_request_id, MetricsLayer, RequestId};
pub use problem::{
    from_lib_error, ProblemDetails, PROBLEM_ENGINE_UNAVAILABLE, PROBLEM_INTERNAL_ERROR,
    PROBLEM_INVALID_REQUEST, PROBLEM_SOLVE_FAILED,
};
pub use state::AppState;
