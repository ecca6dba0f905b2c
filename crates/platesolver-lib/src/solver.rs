//! End-to-end solve flow: translate, acquire a session, solve, interpret.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{env_directory_resolver, DirectoryResolver};
use crate::engine::EngineFactory;
use crate::error::Result;
use crate::interpret::interpret;
use crate::model::SolveOutcome;
use crate::session::SessionManager;
use crate::translate::{translate, SolvePlan, SolveRequest};

/// How a request was answered, for logging and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    /// Number of validated peaks in the request.
    pub peaks: usize,
    /// True when the engine was skipped because there were too few peaks.
    pub short_circuited: bool,
    /// Wall time spent in the engine, zero when short-circuited.
    pub engine_time: Duration,
}

/// The plate-solving service core.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct PlateSolver {
    sessions: SessionManager,
    resolve_directory: DirectoryResolver,
}

impl PlateSolver {
    /// Solver that resolves the default index directory from the environment.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_resolver(factory, env_directory_resolver())
    }

    pub fn with_resolver(factory: Arc<dyn EngineFactory>, resolve_directory: DirectoryResolver) -> Self {
        Self {
            sessions: SessionManager::new(factory),
            resolve_directory,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Solve a plate and return only the response contract.
    pub fn solve(&self, request: &SolveRequest) -> Result<SolveOutcome> {
        self.solve_with_report(request).map(|report| report.outcome)
    }

    /// Solve a plate, reporting how the answer was reached.
    ///
    /// Errors are returned as-is; a failure is never turned into a no-match.
    pub fn solve_with_report(&self, request: &SolveRequest) -> Result<SolveReport> {
        let job = match translate(request, || (self.resolve_directory)())? {
            SolvePlan::ShortCircuit { peaks } => {
                debug!(peaks, "too few peaks, skipping matching engine");
                return Ok(SolveReport {
                    outcome: SolveOutcome::NoMatch,
                    peaks,
                    short_circuited: true,
                    engine_time: Duration::ZERO,
                });
            }
            SolvePlan::Solve(job) => job,
        };

        let handle = self.sessions.acquire(&job.config)?;

        let started = Instant::now();
        let solution = handle.solve(&job.peaks, &job.hints).map_err(|e| {
            warn!(handle = handle.id(), error = %e, "matching engine solve failed");
            e
        })?;
        let engine_time = started.elapsed();

        let outcome = interpret(solution.as_ref());
        info!(
            handle = handle.id(),
            peaks = job.peaks.len(),
            position_hint = job.hints.position.is_some(),
            scale_hint = job.hints.scale.is_some(),
            outcome = outcome.label(),
            elapsed_ms = engine_time.as_millis() as u64,
            "solve finished"
        );

        Ok(SolveReport {
            outcome,
            peaks: job.peaks.len(),
            short_circuited: false,
            engine_time,
        })
    }

    /// Release the active engine session.
    pub fn shutdown(&self) {
        self.sessions.shutdown();
    }
}

impl std::fmt::Debug for PlateSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlateSolver")
            .field("sessions", &self.sessions)
            .finish()
    }
}
