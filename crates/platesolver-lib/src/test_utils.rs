//! Test doubles for the matching-engine seam.
//!
//! [`StubEngineFactory`] builds engines that never touch the filesystem. Every
//! construction, solve, and release is appended to a shared event log so
//! tests can assert on call counts and ordering.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::{EngineFactory, EngineMatch, EngineSolution, MatchingEngine};
use crate::error::{Error, Result};
use crate::model::{Peak, SolveConfiguration, SolveHints};
use crate::wcs::Wcs;

/// Something a stub engine observed.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Constructed { id: u64, config: SolveConfiguration },
    Solved { id: u64, peaks: usize, hints: SolveHints },
    Released { id: u64 },
}

/// What stub engines answer when asked to solve.
#[derive(Debug, Clone)]
pub enum StubBehavior {
    NoMatch,
    EmptySolution,
    Match(EngineMatch),
    Fail(String),
}

#[derive(Debug)]
struct StubShared {
    events: Mutex<Vec<EngineEvent>>,
    behavior: Mutex<StubBehavior>,
    fail_construction: AtomicBool,
    next_id: AtomicU64,
}

impl StubShared {
    fn events(&self) -> MutexGuard<'_, Vec<EngineEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Recording engine factory. Clones share the same log and behavior.
#[derive(Debug, Clone)]
pub struct StubEngineFactory {
    shared: Arc<StubShared>,
}

impl Default for StubEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngineFactory {
    /// A factory whose engines report no match.
    pub fn new() -> Self {
        Self::with_behavior(StubBehavior::NoMatch)
    }

    /// A factory whose engines report `best` as their only match.
    pub fn matching(best: EngineMatch) -> Self {
        Self::with_behavior(StubBehavior::Match(best))
    }

    pub fn with_behavior(behavior: StubBehavior) -> Self {
        Self {
            shared: Arc::new(StubShared {
                events: Mutex::new(Vec::new()),
                behavior: Mutex::new(behavior),
                fail_construction: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn set_behavior(&self, behavior: StubBehavior) {
        *self
            .shared
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Make subsequent constructions fail (or succeed again).
    pub fn fail_construction(&self, fail: bool) {
        self.shared.fail_construction.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.shared.events().clone()
    }

    pub fn constructions(&self) -> usize {
        self.count(|e| matches!(e, EngineEvent::Constructed { .. }))
    }

    pub fn solves(&self) -> usize {
        self.count(|e| matches!(e, EngineEvent::Solved { .. }))
    }

    pub fn releases(&self) -> usize {
        self.count(|e| matches!(e, EngineEvent::Released { .. }))
    }

    /// Hints passed to the most recent solve call.
    pub fn last_hints(&self) -> Option<SolveHints> {
        self.shared.events().iter().rev().find_map(|e| match e {
            EngineEvent::Solved { hints, .. } => Some(*hints),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.shared.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EngineFactory for StubEngineFactory {
    fn construct(&self, config: &SolveConfiguration) -> Result<Box<dyn MatchingEngine>> {
        if self.shared.fail_construction.load(Ordering::SeqCst) {
            return Err(Error::EngineConstruction {
                directory: config.index_directory().to_path_buf(),
                reason: "stub configured to fail".to_string(),
            });
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.events().push(EngineEvent::Constructed {
            id,
            config: config.clone(),
        });

        Ok(Box::new(StubEngine {
            id,
            shared: Arc::clone(&self.shared),
            released: AtomicBool::new(false),
        }))
    }
}

struct StubEngine {
    id: u64,
    shared: Arc<StubShared>,
    released: AtomicBool,
}

impl MatchingEngine for StubEngine {
    fn solve(&self, peaks: &[Peak], hints: &SolveHints) -> Result<Option<EngineSolution>> {
        self.shared.events().push(EngineEvent::Solved {
            id: self.id,
            peaks: peaks.len(),
            hints: *hints,
        });

        let behavior = self
            .shared
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match behavior {
            StubBehavior::NoMatch => Ok(None),
            StubBehavior::EmptySolution => Ok(Some(EngineSolution::default())),
            StubBehavior::Match(best) => Ok(Some(EngineSolution::single(best))),
            StubBehavior::Fail(message) => Err(Error::SolveFailure { message }),
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.shared.events().push(EngineEvent::Released { id: self.id });
        }
    }
}

/// A match with the given summary values and a simple north-up transform.
pub fn sample_match(ra_deg: f64, dec_deg: f64, scale_arcsec_per_pixel: f64) -> EngineMatch {
    let cd = scale_arcsec_per_pixel / 3600.0;
    let wcs = Wcs::new((512.5, 512.5), (ra_deg, dec_deg), [[-cd, 0.0], [0.0, cd]])
        .with_image_size(1024, 1024)
        .with_extra("EQUINOX", 2000.0)
        .with_extra("RADESYS", "ICRS");

    EngineMatch {
        center_ra_deg: ra_deg,
        center_dec_deg: dec_deg,
        scale_arcsec_per_pixel,
        wcs,
    }
}

/// `count` well-formed `[x, y]` pairs as raw JSON values.
pub fn json_peaks(count: usize) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| serde_json::json!([10.0 + i as f64 * 37.5, 20.0 + i as f64 * 11.25]))
        .collect()
}

/// Placeholder index directory for requests that never touch disk.
pub fn stub_index_directory() -> PathBuf {
    PathBuf::from("/stub/astrometry_cache")
}
