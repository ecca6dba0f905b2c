//! Process-wide configuration for locating reference index data.
//!
//! The default index directory is derived from the environment on every call
//! so that an operator can repoint it without restarting the service.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable naming the data root.
pub const DATA_ROOT_ENV: &str = "ASTROMETRY_DATA_ROOT";

/// Data root used when [`DATA_ROOT_ENV`] is unset.
pub const DEFAULT_DATA_ROOT: &str = "/data";

/// Subdirectory of the data root that holds index files.
const INDEX_SUBDIR: &str = "astrometry_cache";

/// Resolves the default index directory for a request.
pub type DirectoryResolver = Arc<dyn Fn() -> Result<PathBuf> + Send + Sync>;

/// Default index directory derived from the current environment.
pub fn default_index_directory() -> PathBuf {
    let root = env::var_os(DATA_ROOT_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT));
    root.join(INDEX_SUBDIR)
}

/// Resolve the default index directory, creating it if it does not exist.
pub fn resolve_index_directory() -> Result<PathBuf> {
    ensure_directory(default_index_directory())
}

/// Create `path` (and parents) if needed and return it.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    fs::create_dir_all(path).map_err(|source| Error::IndexDirectoryUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "index directory ready");
    Ok(path.to_path_buf())
}

/// Resolver backed by the environment; the production default.
pub fn env_directory_resolver() -> DirectoryResolver {
    Arc::new(resolve_index_directory)
}

/// Resolver that always returns `path` without touching the filesystem.
pub fn fixed_directory_resolver(path: impl Into<PathBuf>) -> DirectoryResolver {
    let path = path.into();
    Arc::new(move || Ok(path.clone()))
}
