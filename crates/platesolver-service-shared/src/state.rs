//! Application state for the HTTP microservice.
//!
//! Handlers reach the plate solver (and through it, the single live engine
//! session) via axum's `State` extractor.

use std::sync::Arc;

use platesolver_lib::{AstrometryNetConfig, AstrometryNetFactory, EngineFactory, PlateSolver};

use crate::logging::DEFAULT_SERVICE_NAME;

/// Shared application state for all axum handlers.
///
/// This struct is cheaply cloneable (using `Arc` internally) and should be
/// shared via axum's `State` extractor.
///
/// # Example
///
/// ```ignore
/// use axum::{Router, routing::post, extract::State};
/// use platesolver_service_shared::AppState;
///
/// async fn handler(State(state): State<AppState>) {
///     let solver = state.solver();
///     // ... hand the request to the solver
/// }
///
/// let state = AppState::from_env();
/// let app = Router::new()
///     .route("/platesolve", post(handler))
///     .with_state(state);
/// ```
#[derive(Clone)]
pub struct AppState {
    solver: Arc<PlateSolver>,
    service_name: Arc<str>,
}

impl AppState {
    /// State backed by the astrometry.net engine configured from the environment.
    pub fn from_env() -> Self {
        let config = AstrometryNetConfig::from_env();
        tracing::info!(
            solve_field = %config.solve_field.display(),
            cpu_limit_secs = config.cpu_limit.as_secs(),
            "using astrometry.net matching engine"
        );
        Self::new(Arc::new(AstrometryNetFactory::new(config)))
    }

    /// State whose solver builds engines with `factory`.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::from_solver(PlateSolver::new(factory))
    }

    /// Wrap an already configured solver.
    pub fn from_solver(solver: PlateSolver) -> Self {
        Self {
            solver: Arc::new(solver),
            service_name: Arc::from(DEFAULT_SERVICE_NAME),
        }
    }

    /// Name reported by the health endpoints.
    pub fn with_service_name(mut self, name: impl AsRef<str>) -> Self {
        self.service_name = Arc::from(name.as_ref());
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Access the plate solver.
    pub fn solver(&self) -> &PlateSolver {
        &self.solver
    }

    /// Get an Arc-wrapped solver for use on the blocking thread pool.
    pub fn solver_arc(&self) -> Arc<PlateSolver> {
        Arc::clone(&self.solver)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service_name", &self.service_name)
            .field("active_session", &self.solver.sessions().active_session())
            .field("engine_builds", &self.solver.sessions().engine_builds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platesolver_lib::test_utils::StubEngineFactory;

    #[test]
    fn test_app_state_clone_shares_solver() {
        let state1 = AppState::new(Arc::new(StubEngineFactory::new()));
        let state2 = state1.clone();

        assert!(Arc::ptr_eq(&state1.solver_arc(), &state2.solver_arc()));
    }

    #[test]
    fn test_app_state_service_name() {
        let state = AppState::new(Arc::new(StubEngineFactory::new()));
        assert_eq!(state.service_name(), DEFAULT_SERVICE_NAME);

        let renamed = state.with_service_name("solver-east");
        assert_eq!(renamed.service_name(), "solver-east");
    }

    #[test]
    fn test_app_state_debug() {
        let state = AppState::new(Arc::new(StubEngineFactory::new()));
        let debug = format!("{:?}", state);

        assert!(debug.contains("AppState"));
        assert!(debug.contains("active_session"));
        assert!(debug.contains("engine_builds"));
    }
}
