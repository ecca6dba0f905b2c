//! Request translation: validate an inbound solve request and normalise it
//! into what the session manager and matching engine expect.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ValidationError};
use crate::model::{
    Peak, PositionHint, ScaleHint, SolveConfiguration, SolveHints, DEFAULT_SCALE, MIN_PEAKS,
};

/// Largest scale expressible in the two-digit index file naming scheme.
const MAX_SCALE: u32 = 99;

/// Inbound plate-solve request.
///
/// `peaks_xy` is kept as raw JSON so that a malformed entry can be reported
/// by position instead of failing the whole body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveRequest {
    /// `[x, y]` star centroids in zero-based pixel coordinates, with the
    /// centre of the first pixel at `[0, 0]`. The returned WCS uses the
    /// one-based FITS convention.
    pub peaks_xy: Vec<Value>,

    /// Index scales to use; `[6]` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scales: Option<Vec<u32>>,

    /// Override for the index directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ra_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dec_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_deg: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_arcsec_per_pixel: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_arcsec_per_pixel: Option<f64>,
}

impl SolveRequest {
    /// Request with the given peaks and every option left at its default.
    pub fn from_peaks<I, P>(peaks: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<[f64; 2]>,
    {
        Self {
            peaks_xy: peaks
                .into_iter()
                .map(|p| {
                    let [x, y] = p.into();
                    serde_json::json!([x, y])
                })
                .collect(),
            ..Self::default()
        }
    }
}

/// Everything the engine needs for one solve attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveJob {
    pub config: SolveConfiguration,
    pub peaks: Vec<Peak>,
    pub hints: SolveHints,
}

/// What the caller should do with a translated request.
#[derive(Debug, Clone, PartialEq)]
pub enum SolvePlan {
    /// Too few peaks to be worth an engine call; answer `no_match` directly.
    ShortCircuit { peaks: usize },
    /// Hand the job to the matching engine.
    Solve(SolveJob),
}

/// Validate and normalise `raw`.
///
/// Peaks and hints are validated in every case. The index directory is only
/// resolved (via `resolve_default` when the request has no override) for
/// requests that will actually reach the engine.
pub fn translate<F>(raw: &SolveRequest, resolve_default: F) -> Result<SolvePlan>
where
    F: FnOnce() -> Result<PathBuf>,
{
    let peaks = parse_peaks(&raw.peaks_xy)?;
    let scales = parse_scales(raw.scales.as_deref())?;
    let hints = SolveHints {
        position: position_hint(raw)?,
        scale: scale_hint(raw)?,
    };

    if peaks.len() < MIN_PEAKS {
        return Ok(SolvePlan::ShortCircuit { peaks: peaks.len() });
    }

    let index_directory = match raw
        .cache_dir
        .as_ref()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        Some(dir) => dir.clone(),
        None => resolve_default()?,
    };

    Ok(SolvePlan::Solve(SolveJob {
        config: SolveConfiguration::new(index_directory, scales),
        peaks,
        hints,
    }))
}

/// Parse every entry as an `[x, y]` pair; the first bad entry fails the call.
pub fn parse_peaks(values: &[Value]) -> std::result::Result<Vec<Peak>, ValidationError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| parse_peak(index, value))
        .collect()
}

fn parse_peak(index: usize, value: &Value) -> std::result::Result<Peak, ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedPeak { index, reason };

    let pair = value
        .as_array()
        .ok_or_else(|| malformed(format!("expected an [x, y] array, found {}", value)))?;

    if pair.len() != 2 {
        return Err(malformed(format!(
            "expected 2 elements, found {}",
            pair.len()
        )));
    }

    let coordinate = |v: &Value, axis: &str| {
        v.as_f64()
            .filter(|c| c.is_finite())
            .ok_or_else(|| malformed(format!("{} coordinate {} is not a finite number", axis, v)))
    };

    Ok(Peak::new(coordinate(&pair[0], "x")?, coordinate(&pair[1], "y")?))
}

fn parse_scales(scales: Option<&[u32]>) -> std::result::Result<BTreeSet<u32>, ValidationError> {
    let scales: BTreeSet<u32> = match scales {
        Some(list) if !list.is_empty() => list.iter().copied().collect(),
        _ => BTreeSet::from([DEFAULT_SCALE]),
    };

    if let Some(&scale) = scales.iter().find(|&&s| s > MAX_SCALE) {
        return Err(ValidationError::InvalidScale { scale });
    }

    Ok(scales)
}

fn position_hint(raw: &SolveRequest) -> std::result::Result<Option<PositionHint>, ValidationError> {
    let (Some(ra_deg), Some(dec_deg), Some(radius_deg)) = (raw.ra_deg, raw.dec_deg, raw.radius_deg)
    else {
        return Ok(None);
    };

    let invalid = |reason: &str| ValidationError::InvalidPositionHint {
        reason: reason.to_string(),
    };

    if !(ra_deg.is_finite() && dec_deg.is_finite() && radius_deg.is_finite()) {
        return Err(invalid("values must be finite numbers"));
    }
    if !(-90.0..=90.0).contains(&dec_deg) {
        return Err(invalid("dec_deg must lie within [-90, 90]"));
    }
    if radius_deg <= 0.0 {
        return Err(invalid("radius_deg must be positive"));
    }

    Ok(Some(PositionHint {
        ra_deg,
        dec_deg,
        radius_deg,
    }))
}

fn scale_hint(raw: &SolveRequest) -> std::result::Result<Option<ScaleHint>, ValidationError> {
    let (Some(lower), Some(upper)) = (raw.lower_arcsec_per_pixel, raw.upper_arcsec_per_pixel)
    else {
        return Ok(None);
    };

    let invalid = |reason: &str| ValidationError::InvalidScaleHint {
        reason: reason.to_string(),
    };

    if !(lower.is_finite() && upper.is_finite()) {
        return Err(invalid("bounds must be finite numbers"));
    }
    if lower <= 0.0 {
        return Err(invalid("lower_arcsec_per_pixel must be positive"));
    }
    if lower > upper {
        return Err(invalid(
            "lower_arcsec_per_pixel must not exceed upper_arcsec_per_pixel",
        ));
    }

    Ok(Some(ScaleHint {
        lower_arcsec_per_pixel: lower,
        upper_arcsec_per_pixel: upper,
    }))
}
