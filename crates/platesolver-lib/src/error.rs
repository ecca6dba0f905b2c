use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the plate-solver library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
///
/// The three kinds that reach the request boundary are kept distinct:
/// [`Error::Validation`] is the caller's fault, while
/// [`Error::EngineConstruction`] and [`Error::SolveFailure`] mean the service
/// could not look at all. None of them is ever reported as a no-match.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound request was rejected before any engine interaction.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The matching engine could not be built for the requested configuration.
    #[error("failed to construct matching engine for {directory}: {reason}")]
    EngineConstruction { directory: PathBuf, reason: String },

    /// The matching engine faulted while solving (distinct from a no-match).
    #[error("solve failed: {message}")]
    SolveFailure { message: String },

    /// The default index directory could not be resolved or created.
    #[error("index directory {path} is unavailable: {source}")]
    IndexDirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A WCS header mapping could not be turned back into a transform.
    #[error("invalid WCS header key {key}: {reason}")]
    WcsHeader { key: String, reason: String },

    /// Raised when a FITS file produced by the engine cannot be parsed.
    #[error("malformed FITS data: {message}")]
    Fits { message: String },

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short, stable label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::EngineConstruction { .. } | Error::IndexDirectoryUnavailable { .. } => {
                "engine_unavailable"
            }
            Error::SolveFailure { .. } => "solve_failure",
            Error::WcsHeader { .. } | Error::Fits { .. } | Error::Io(_) => "internal_error",
        }
    }
}

/// Errors raised while translating an inbound solve request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A coordinate entry was not a two-element numeric pair.
    #[error("peak {index} is malformed: {reason}")]
    MalformedPeak { index: usize, reason: String },

    /// A fully specified position hint carried an unusable value.
    #[error("invalid position hint: {reason}")]
    InvalidPositionHint { reason: String },

    /// A fully specified scale hint carried an unusable value.
    #[error("invalid scale hint: {reason}")]
    InvalidScaleHint { reason: String },

    /// An index scale outside the range the index naming scheme supports.
    #[error("index scale {scale} is out of range (0-99)")]
    InvalidScale { scale: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_library_error() {
        let err: Error = ValidationError::MalformedPeak {
            index: 3,
            reason: "expected 2 elements, found 3".to_string(),
        }
        .into();

        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("peak 3"));
    }

    #[test]
    fn error_kinds_distinguish_engine_failures() {
        let construction = Error::EngineConstruction {
            directory: PathBuf::from("/data/astrometry_cache"),
            reason: "no index files".to_string(),
        };
        let solve = Error::SolveFailure {
            message: "solve-field exited with status 2".to_string(),
        };

        assert_eq!(construction.kind(), "engine_unavailable");
        assert_eq!(solve.kind(), "solve_failure");
        assert!(construction.to_string().contains("/data/astrometry_cache"));
    }
}
