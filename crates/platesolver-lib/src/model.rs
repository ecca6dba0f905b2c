//! Core data model shared by the translator, session manager, and interpreter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Index scale used when a request does not name any.
pub const DEFAULT_SCALE: u32 = 6;

/// Fewest peaks worth handing to the matching engine.
pub const MIN_PEAKS: usize = 10;

/// A detected star centroid in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub x: f64,
    pub y: f64,
}

impl Peak {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Peak {
    fn from(pos: [f64; 2]) -> Self {
        Self::new(pos[0], pos[1])
    }
}

impl From<Peak> for [f64; 2] {
    fn from(peak: Peak) -> Self {
        [peak.x, peak.y]
    }
}

/// The configuration a matching engine is built from.
///
/// Equality is structural: two configurations are the same when they name
/// the same directory string and the same set of scales, regardless of the
/// order or duplication the scales were supplied in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolveConfiguration {
    index_directory: PathBuf,
    scales: BTreeSet<u32>,
}

impl SolveConfiguration {
    /// Build a configuration, falling back to [`DEFAULT_SCALE`] when `scales`
    /// is empty so the scale set is never empty.
    pub fn new(index_directory: impl Into<PathBuf>, scales: impl IntoIterator<Item = u32>) -> Self {
        let mut scales: BTreeSet<u32> = scales.into_iter().collect();
        if scales.is_empty() {
            scales.insert(DEFAULT_SCALE);
        }
        Self {
            index_directory: index_directory.into(),
            scales,
        }
    }

    pub fn index_directory(&self) -> &Path {
        &self.index_directory
    }

    pub fn scales(&self) -> &BTreeSet<u32> {
        &self.scales
    }
}

impl fmt::Display for SolveConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scales: Vec<String> = self.scales.iter().map(u32::to_string).collect();
        write!(
            f,
            "{} [scales {}]",
            self.index_directory.display(),
            scales.join(",")
        )
    }
}

/// Approximate sky position and search radius, all in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionHint {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub radius_deg: f64,
}

/// Bounds on the image pixel scale in arcseconds per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleHint {
    pub lower_arcsec_per_pixel: f64,
    pub upper_arcsec_per_pixel: f64,
}

/// Optional constraints forwarded to the matching engine.
///
/// Each hint is either entirely present or absent; partial input never
/// produces a hint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolveHints {
    pub position: Option<PositionHint>,
    pub scale: Option<ScaleHint>,
}

/// A scalar value stored in a flattened WCS header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Integer(i) => Some(*i as f64),
            HeaderValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

/// Flat, JSON-safe mapping of WCS header keywords to scalar values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WcsHeader(BTreeMap<String, HeaderValue>);

impl WcsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, HeaderValue)> for WcsHeader {
    fn from_iter<I: IntoIterator<Item = (String, HeaderValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The response contract of a solve: either a match or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolveOutcome {
    NoMatch,
    Match {
        center_ra_deg: f64,
        center_dec_deg: f64,
        scale_arcsec_per_pixel: f64,
        wcs_header: WcsHeader,
    },
}

impl SolveOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, SolveOutcome::Match { .. })
    }

    /// Metric/log label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            SolveOutcome::NoMatch => "no_match",
            SolveOutcome::Match { .. } => "match",
        }
    }
}
