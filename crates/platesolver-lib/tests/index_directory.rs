use std::path::{Path, PathBuf};
use std::sync::Arc;

use platesolver_lib::config::{env_directory_resolver, DATA_ROOT_ENV};
use platesolver_lib::test_utils::{json_peaks, EngineEvent, StubEngineFactory};
use platesolver_lib::{PlateSolver, SolveRequest};
use tempfile::tempdir;

fn with_data_root<F>(path: &Path, f: F)
where
    F: FnOnce(),
{
    std::env::set_var(DATA_ROOT_ENV, path);
    let guard = ScopeGuard;
    f();
    drop(guard);
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        std::env::remove_var(DATA_ROOT_ENV);
    }
}

#[test]
fn default_index_directory_follows_the_environment_and_is_created() {
    let root = tempdir().expect("temp dir");
    let factory = StubEngineFactory::new();
    let solver = PlateSolver::with_resolver(Arc::new(factory.clone()), env_directory_resolver());

    let expected = root.path().join("astrometry_cache");
    assert!(!expected.exists());

    with_data_root(root.path(), || {
        let request = SolveRequest {
            peaks_xy: json_peaks(12),
            ..SolveRequest::default()
        };
        solver.solve(&request).expect("solve succeeds");
    });

    assert!(expected.is_dir(), "default index directory should be created");
    match factory.events().first() {
        Some(EngineEvent::Constructed { config, .. }) => {
            assert_eq!(config.index_directory(), expected.as_path());
            assert_eq!(config.scales().iter().copied().collect::<Vec<_>>(), [6]);
        }
        other => panic!("expected a construction, got {:?}", other),
    }
}

#[test]
fn explicit_cache_dir_bypasses_the_default() {
    let explicit = tempdir().expect("temp dir");
    let factory = StubEngineFactory::new();
    let solver = PlateSolver::with_resolver(
        Arc::new(factory.clone()),
        Arc::new(|| -> platesolver_lib::Result<PathBuf> {
            panic!("default directory must not be resolved")
        }),
    );

    let request = SolveRequest {
        peaks_xy: json_peaks(12),
        cache_dir: Some(explicit.path().to_path_buf()),
        ..SolveRequest::default()
    };
    solver.solve(&request).expect("solve succeeds");

    match factory.events().first() {
        Some(EngineEvent::Constructed { config, .. }) => {
            assert_eq!(config.index_directory(), explicit.path());
        }
        other => panic!("expected a construction, got {:?}", other),
    }
}
