//! Solver session management.
//!
//! The [`SessionManager`] owns at most one live matching engine. Callers ask
//! for a handle valid for a [`SolveConfiguration`]; the manager hands back the
//! current one when the configuration matches and rebuilds it otherwise.
//!
//! The check-retire-construct-store sequence runs under a single mutex. The
//! solve itself does not: a handle is an `Arc`, so a caller that obtained one
//! keeps it alive for the duration of its solve even if another request
//! retires it from the slot in the meantime. The engine is released when the
//! last reference goes away.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::engine::{EngineFactory, EngineSolution, MatchingEngine};
use crate::error::Result;
use crate::model::{Peak, SolveConfiguration, SolveHints};

/// A constructed engine together with the configuration it was built from.
pub struct EngineHandle {
    id: u64,
    config: SolveConfiguration,
    built_at: DateTime<Utc>,
    engine: Box<dyn MatchingEngine>,
}

impl EngineHandle {
    /// Process-unique identifier of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SolveConfiguration {
        &self.config
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn solve(&self, peaks: &[Peak], hints: &SolveHints) -> Result<Option<EngineSolution>> {
        self.engine.solve(peaks, hints)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        info!(handle = self.id, config = %self.config, "releasing matching engine");
        self.engine.release();
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("built_at", &self.built_at)
            .finish()
    }
}

/// Snapshot of the handle currently held by a [`SessionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub handle_id: u64,
    pub config: SolveConfiguration,
    pub built_at: DateTime<Utc>,
}

/// Owner of the single active engine handle.
pub struct SessionManager {
    factory: Arc<dyn EngineFactory>,
    current: Mutex<Option<Arc<EngineHandle>>>,
    next_id: AtomicU64,
    builds: AtomicU64,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            builds: AtomicU64::new(0),
        }
    }

    /// Return a handle valid for `config`, rebuilding the engine if the held
    /// one was built for a different configuration.
    ///
    /// On construction failure the slot is left empty so the next request can
    /// retry cleanly.
    pub fn acquire(&self, config: &SolveConfiguration) -> Result<Arc<EngineHandle>> {
        let mut slot = self.lock_slot();

        if let Some(handle) = slot.as_ref() {
            if handle.config == *config {
                debug!(handle = handle.id, "reusing matching engine");
                return Ok(Arc::clone(handle));
            }
        }

        if let Some(previous) = slot.take() {
            info!(
                handle = previous.id,
                from = %previous.config,
                to = %config,
                "configuration changed, retiring matching engine"
            );
            drop(previous);
        }

        let started = Instant::now();
        info!(config = %config, "constructing matching engine");
        let engine = self.factory.construct(config).map_err(|e| {
            warn!(config = %config, error = %e, "matching engine construction failed");
            e
        })?;

        let handle = Arc::new(EngineHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            config: config.clone(),
            built_at: Utc::now(),
            engine,
        });
        self.builds.fetch_add(1, Ordering::Relaxed);

        info!(
            handle = handle.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "matching engine ready"
        );

        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Describe the held handle, if any.
    pub fn active_session(&self) -> Option<SessionInfo> {
        self.lock_slot().as_ref().map(|handle| SessionInfo {
            handle_id: handle.id,
            config: handle.config.clone(),
            built_at: handle.built_at,
        })
    }

    /// Number of engines successfully constructed by this manager.
    pub fn engine_builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Forget the held handle. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if let Some(handle) = self.lock_slot().take() {
            info!(handle = handle.id, "shutting down solver session");
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<EngineHandle>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("active_session", &self.active_session())
            .field("engine_builds", &self.engine_builds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EngineEvent, StubEngineFactory};

    fn manager(factory: &StubEngineFactory) -> SessionManager {
        SessionManager::new(Arc::new(factory.clone()))
    }

    #[test]
    fn equal_configurations_reuse_the_handle() {
        let factory = StubEngineFactory::new();
        let sessions = manager(&factory);

        let first = sessions
            .acquire(&SolveConfiguration::new("/idx", [6, 7]))
            .unwrap();
        let second = sessions
            .acquire(&SolveConfiguration::new("/idx", [7, 6, 7]))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.constructions(), 1);
        assert_eq!(factory.releases(), 0);
        assert_eq!(sessions.engine_builds(), 1);
    }

    #[test]
    fn changed_configuration_releases_before_constructing() {
        let factory = StubEngineFactory::new();
        let sessions = manager(&factory);

        let six = SolveConfiguration::new("/idx", [6]);
        let seven = SolveConfiguration::new("/idx", [7]);

        drop(sessions.acquire(&six).unwrap());
        drop(sessions.acquire(&seven).unwrap());

        assert_eq!(
            factory.events(),
            vec![
                EngineEvent::Constructed { id: 1, config: six },
                EngineEvent::Released { id: 1 },
                EngineEvent::Constructed { id: 2, config: seven },
            ]
        );
    }

    #[test]
    fn retired_handle_stays_usable_by_its_holder() {
        let factory = StubEngineFactory::new();
        let sessions = manager(&factory);

        let held = sessions
            .acquire(&SolveConfiguration::new("/idx", [6]))
            .unwrap();
        let _replacement = sessions
            .acquire(&SolveConfiguration::new("/idx", [7]))
            .unwrap();

        assert_eq!(factory.releases(), 0);
        assert!(held.solve(&[], &SolveHints::default()).is_ok());

        drop(held);
        assert_eq!(factory.releases(), 1);
    }

    #[test]
    fn construction_failure_leaves_slot_empty() {
        let factory = StubEngineFactory::new();
        let sessions = manager(&factory);

        drop(sessions.acquire(&SolveConfiguration::new("/idx", [6])).unwrap());
        factory.fail_construction(true);

        let err = sessions
            .acquire(&SolveConfiguration::new("/idx", [7]))
            .unwrap_err();
        assert_eq!(err.kind(), "engine_unavailable");
        assert!(sessions.active_session().is_none());
        assert_eq!(factory.releases(), 1);

        factory.fail_construction(false);
        let handle = sessions
            .acquire(&SolveConfiguration::new("/idx", [7]))
            .unwrap();
        assert_eq!(handle.config().scales().len(), 1);
        assert_eq!(sessions.engine_builds(), 2);
    }

    #[test]
    fn shutdown_releases_and_is_idempotent() {
        let factory = StubEngineFactory::new();
        let sessions = manager(&factory);

        drop(sessions.acquire(&SolveConfiguration::new("/idx", [6])).unwrap());
        assert!(sessions.active_session().is_some());

        sessions.shutdown();
        sessions.shutdown();

        assert!(sessions.active_session().is_none());
        assert_eq!(factory.releases(), 1);
    }

    #[test]
    fn active_session_reports_held_configuration() {
        let factory = StubEngineFactory::new();
        let sessions = manager(&factory);
        let config = SolveConfiguration::new("/idx", [5]);

        let handle = sessions.acquire(&config).unwrap();
        let info = sessions.active_session().unwrap();

        assert_eq!(info.config, config);
        assert_eq!(info.handle_id, handle.id());
        assert_eq!(info.built_at, handle.built_at());
    }

    #[test]
    fn concurrent_acquires_build_once_per_configuration() {
        let factory = StubEngineFactory::new();
        let sessions = Arc::new(manager(&factory));
        let config = SolveConfiguration::new("/idx", [6]);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let sessions = Arc::clone(&sessions);
                let config = config.clone();
                std::thread::spawn(move || sessions.acquire(&config).unwrap().id())
            })
            .collect();

        let ids: Vec<u64> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(factory.constructions(), 1);
    }

    #[test]
    fn concurrent_acquires_with_alternating_configurations() {
        let factory = StubEngineFactory::new();
        let sessions = Arc::new(manager(&factory));
        let six = SolveConfiguration::new("/idx", [6]);
        let seven = SolveConfiguration::new("/idx", [7]);

        let threads: Vec<_> = (0..16)
            .map(|i| {
                let sessions = Arc::clone(&sessions);
                let config = if i % 2 == 0 { six.clone() } else { seven.clone() };
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let handle = sessions.acquire(&config).unwrap();
                        assert_eq!(handle.config(), &config);
                        assert!(handle.solve(&[], &SolveHints::default()).is_ok());
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        sessions.shutdown();
        assert!(sessions.active_session().is_none());
        assert_eq!(factory.constructions(), factory.releases());
        assert_eq!(sessions.engine_builds(), factory.constructions() as u64);
    }
}
