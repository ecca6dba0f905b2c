//! Health check handlers for Kubernetes probes.
//!
//! Provides `/health/live` and `/health/ready` endpoints that return JSON
//! status responses for Kubernetes liveness and readiness probes.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use platesolver_lib::SessionInfo;

use crate::AppState;

/// Health status response for liveness and readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Status indicator: "ok" or "degraded".
    pub status: String,

    /// Service name for identification.
    pub service: String,

    /// Service version from build-time.
    pub version: String,

    /// Number of matching engines built since startup (for readiness check).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_builds: Option<u64>,

    /// The live engine session, if one has been built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
}

/// Readiness view of the active engine session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub handle_id: u64,
    pub index_directory: String,
    pub scales: Vec<u32>,
    /// RFC 3339 construction time.
    pub built_at: String,
}

impl From<SessionInfo> for SessionStatus {
    fn from(info: SessionInfo) -> Self {
        Self {
            handle_id: info.handle_id,
            index_directory: info.config.index_directory().display().to_string(),
            scales: info.config.scales().iter().copied().collect(),
            built_at: info.built_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl HealthStatus {
    /// Create a healthy liveness status.
    pub fn alive(service: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            engine_builds: None,
            session: None,
        }
    }

    /// Create a ready status with session information.
    pub fn ready(
        service: &str,
        version: &str,
        engine_builds: u64,
        session: Option<SessionStatus>,
    ) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            engine_builds: Some(engine_builds),
            session,
        }
    }
}

/// Liveness probe handler.
///
/// Returns 200 OK if the service is running. This is a simple check that does
/// not depend on external resources.
///
/// # Example
///
/// ```text
/// GET /health/live
/// {"status":"ok","service":"platesolver","version":"0.1.0"}
/// ```
pub async fn health_live(State(state): State<AppState>) -> impl IntoResponse {
    let status = HealthStatus::alive(state.service_name(), env!("CARGO_PKG_VERSION"));
    (StatusCode::OK, Json(status))
}

/// Readiness probe handler.
///
/// Engines are built lazily by the first solve, so the service is ready as
/// soon as it is serving. The response describes the live session, if any.
///
/// # Example
///
/// ```text
/// GET /health/ready
/// {"status":"ok","service":"platesolver","version":"0.1.0","engine_builds":1,
///  "session":{"handle_id":1,"index_directory":"/data/astrometry_cache","scales":[6],"built_at":"2026-01-05T10:00:00.000Z"}}
/// ```
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let sessions = state.solver().sessions();
    let status = HealthStatus::ready(
        state.service_name(),
        env!("CARGO_PKG_VERSION"),
        sessions.engine_builds(),
        sessions.active_session().map(SessionStatus::from),
    );
    (StatusCode::OK, Json(status)).into_response()
}
