//! Plate-solving HTTP microservice.
//!
//! Accepts star centroids detected in an image and answers with the sky
//! position and WCS transform of the field, or `no_match`.
//!
//! # Endpoints
//!
//! - `POST /platesolve` - Solve a field from its star peaks
//! - `GET /metrics` - Prometheus metrics endpoint
//! - `GET /health` and `GET /health/live` - Kubernetes liveness probe
//! - `GET /health/ready` - Kubernetes readiness probe
//!
//! # Configuration
//!
//! - `SERVICE_PORT` (or `PORT`) - HTTP port (default: 8900)
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `MAX_REQUEST_BYTES` - Largest accepted request body (default: 8 MiB)
//! - `ASTROMETRY_DATA_ROOT` - Data root; indices live in `<root>/astrometry_cache`
//! - `SOLVE_FIELD_PATH`, `SOLVE_CPU_LIMIT_SECS`, `ASTROMETRY_WORK_DIR` - astrometry.net
//! - `RUST_LOG`, `LOG_FORMAT`, `SERVICE_NAME` - logging
//! - `METRICS_ENABLED`, `METRICS_PATH` - metrics

#![deny(warnings)]

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use platesolver_lib::{SolveOutcome, SolveRequest};
use platesolver_service_shared::{
    extract_or_generate_request_id, from_lib_error, health_live, health_ready, metrics_handler,
    record_solve, record_solve_failed, AppState, MetricsConfig, MetricsLayer, ProblemDetails,
    PROBLEM_INVALID_REQUEST,
};

/// Port the service listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8900;

/// Request body limit when `MAX_REQUEST_BYTES` is unset.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Listener and request limits for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_request_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = env::var("HOST")
            .ok()
            .and_then(|h| h.parse().ok())
            .unwrap_or(defaults.host);

        let port = env::var("SERVICE_PORT")
            .or_else(|_| env::var("PORT"))
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let max_request_bytes = env::var("MAX_REQUEST_BYTES")
            .ok()
            .and_then(|b| b.parse().ok())
            .filter(|&b: &usize| b > 0)
            .unwrap_or(defaults.max_request_bytes);

        Self {
            host,
            port,
            max_request_bytes,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// HTTP response - either the solve outcome or an RFC 9457 error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(SolveOutcome),
    Error(ProblemDetails),
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        match self {
            Response::Success(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
            Response::Error(problem) => problem.into_response(),
        }
    }
}

/// Build the service router.
pub fn app(state: AppState, config: &ServiceConfig, metrics: &MetricsConfig) -> Router {
    let mut router = Router::new()
        .route("/platesolve", post(platesolve_handler))
        .route("/health", get(health_live))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready));

    if metrics.enabled {
        router = router.route(&metrics.path, get(metrics_handler));
    }

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_request_bytes))
        .layer(MetricsLayer)
        .with_state(state)
}

/// Handle POST /platesolve requests.
async fn platesolve_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SolveRequest>, JsonRejection>,
) -> Response {
    let request_id = extract_or_generate_request_id(&headers);

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(request_id = %request_id, error = %rejection, "rejected request body");
            record_solve_failed("validation_error");
            return Response::Error(rejection_problem(&rejection, request_id.as_str()));
        }
    };

    info!(
        request_id = %request_id,
        peaks = request.peaks_xy.len(),
        scales = ?request.scales,
        "handling plate-solve request"
    );

    let solver = state.solver_arc();
    let joined = tokio::task::spawn_blocking(move || solver.solve_with_report(&request)).await;

    match joined {
        Ok(Ok(report)) => {
            record_solve(&report);
            info!(
                request_id = %request_id,
                outcome = report.outcome.label(),
                short_circuited = report.short_circuited,
                "plate-solve request finished"
            );
            Response::Success(report.outcome)
        }
        Ok(Err(e)) => {
            record_solve_failed(e.kind());
            if e.kind() == "validation_error" {
                warn!(request_id = %request_id, error = %e, "invalid plate-solve request");
            } else {
                error!(request_id = %request_id, error = %e, "plate-solve failed");
            }
            Response::Error(from_lib_error(&e, request_id.as_str()))
        }
        Err(e) => {
            record_solve_failed("internal_error");
            error!(request_id = %request_id, error = %e, "plate-solve task did not complete");
            Response::Error(ProblemDetails::internal_error(
                "solve task did not complete",
                request_id.as_str(),
            ))
        }
    }
}

/// Problem for a body that could not be read as a solve request.
///
/// An over-limit body keeps its 413 status; everything else is a 400.
fn rejection_problem(rejection: &JsonRejection, request_id: &str) -> ProblemDetails {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProblemDetails::new(
            PROBLEM_INVALID_REQUEST,
            "Payload Too Large",
            StatusCode::PAYLOAD_TOO_LARGE,
        )
        .with_detail(rejection.body_text())
        .with_request_id(request_id)
    } else {
        ProblemDetails::bad_request(rejection.body_text(), request_id)
    }
}
