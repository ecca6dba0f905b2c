//! Plate-solver library entry points.
//!
//! This crate owns the solver session (one live matching engine, rebuilt only
//! when the requested configuration changes), the translation of inbound solve
//! requests into engine jobs, and the interpretation of engine results into
//! the public response shape. The HTTP service should only depend on the
//! functions exported here instead of reimplementing behavior.
//!

#![deny(warnings)]

pub mod astrometry;
pub mod config;
pub mod engine;
pub mod error;
pub mod interpret;
pub mod model;
pub mod session;
pub mod solver;
pub mod translate;
pub mod wcs;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use astrometry::{AstrometryNetConfig, AstrometryNetEngine, AstrometryNetFactory};
pub use config::{default_index_directory, resolve_index_directory, DirectoryResolver};
pub use engine::{EngineFactory, EngineMatch, EngineSolution, MatchingEngine};
pub use error::{Error, Result, ValidationError};
pub use interpret::interpret;
pub use model::{
    HeaderValue, Peak, PositionHint, ScaleHint, SolveConfiguration, SolveHints, SolveOutcome,
    WcsHeader, DEFAULT_SCALE, MIN_PEAKS,
};
pub use session::{EngineHandle, SessionInfo, SessionManager};
pub use solver::{PlateSolver, SolveReport};
pub use translate::{translate, SolveJob, SolvePlan, SolveRequest};
pub use wcs::Wcs;
