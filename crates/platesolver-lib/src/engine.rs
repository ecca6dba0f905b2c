//! The seam between this crate and whatever performs the actual matching.
//!
//! An [`EngineFactory`] builds a [`MatchingEngine`] for one
//! [`SolveConfiguration`]. Building is expensive; solving on a built engine
//! must be safe from many threads at once.

use crate::error::Result;
use crate::model::{Peak, SolveConfiguration, SolveHints};
use crate::wcs::Wcs;

/// One candidate solution reported by a matching engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMatch {
    pub center_ra_deg: f64,
    pub center_dec_deg: f64,
    pub scale_arcsec_per_pixel: f64,
    pub wcs: Wcs,
}

impl EngineMatch {
    /// Derive the summary fields from a fitted transform.
    pub fn from_wcs(wcs: Wcs) -> Self {
        let (center_ra_deg, center_dec_deg) = wcs.center();
        Self {
            center_ra_deg,
            center_dec_deg,
            scale_arcsec_per_pixel: wcs.pixel_scale_arcsec(),
            wcs,
        }
    }
}

/// Raw result of a solve call, ranked best-first.
///
/// An empty list means the engine looked and found nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSolution {
    pub matches: Vec<EngineMatch>,
}

impl EngineSolution {
    pub fn single(best: EngineMatch) -> Self {
        Self {
            matches: vec![best],
        }
    }

    pub fn best_match(&self) -> Option<&EngineMatch> {
        self.matches.first()
    }
}

/// A constructed matching engine.
pub trait MatchingEngine: Send + Sync {
    /// Attempt to match `peaks` against the engine's reference indices.
    ///
    /// `Ok(None)` and an empty [`EngineSolution`] both mean "no match".
    /// `Err` is reserved for faults that prevented the attempt.
    fn solve(&self, peaks: &[Peak], hints: &SolveHints) -> Result<Option<EngineSolution>>;

    /// Free any native or on-disk resources. Called at most once per handle
    /// by [`crate::session::EngineHandle`], but must tolerate repeat calls.
    fn release(&self);
}

/// Builds matching engines for a configuration.
pub trait EngineFactory: Send + Sync {
    fn construct(&self, config: &SolveConfiguration) -> Result<Box<dyn MatchingEngine>>;
}
