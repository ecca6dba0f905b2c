//! Test utilities for microservice handler testing.
//!
//! Builds [`AppState`] on top of the recording stub engine so handlers can be
//! exercised without astrometry.net installed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use platesolver_lib::config::fixed_directory_resolver;
use platesolver_lib::test_utils::{stub_index_directory, StubEngineFactory};
use platesolver_lib::PlateSolver;

use crate::state::AppState;

/// State whose solver uses `factory` and never touches the real data root.
pub fn stub_state(factory: &StubEngineFactory) -> AppState {
    AppState::from_solver(PlateSolver::with_resolver(
        Arc::new(factory.clone()),
        fixed_directory_resolver(stub_index_directory()),
    ))
}

/// Fresh stub factory plus a state wired to it.
pub fn test_state() -> (StubEngineFactory, AppState) {
    let factory = StubEngineFactory::new();
    let state = stub_state(&factory);
    (factory, state)
}

/// Generate a unique request ID for testing.
pub fn test_request_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("test-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_starts_without_session() {
        let (factory, state) = test_state();
        assert!(state.solver().sessions().active_session().is_none());
        assert_eq!(factory.constructions(), 0);
    }

    #[test]
    fn test_request_id_unique() {
        let id1 = test_request_id();
        let id2 = test_request_id();
        assert_ne!(id1, id2);
    }
}
