//! Discovery of astrometry.net series-5200 index files on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name prefix of index files for `scale`, e.g. `index-5206`.
pub fn index_file_prefix(scale: u32) -> String {
    format!("index-52{:02}", scale)
}

fn matches_scale(file_name: &str, prefix: &str) -> bool {
    file_name
        .strip_prefix(prefix)
        .map(|rest| rest.ends_with(".fits") && (rest.starts_with('-') || rest == ".fits"))
        .unwrap_or(false)
}

/// Index files in `directory` grouped by requested scale.
///
/// Every requested scale has an entry, possibly empty. Paths are sorted.
pub fn discover_index_files(
    directory: &Path,
    scales: &BTreeSet<u32>,
) -> Result<BTreeMap<u32, Vec<PathBuf>>> {
    let construction_error = |reason: String| Error::EngineConstruction {
        directory: directory.to_path_buf(),
        reason,
    };

    if !directory.is_dir() {
        return Err(construction_error("directory does not exist".to_string()));
    }

    let entries = fs::read_dir(directory)
        .map_err(|e| construction_error(format!("directory is not readable: {}", e)))?;

    let prefixes: Vec<(u32, String)> = scales
        .iter()
        .map(|&scale| (scale, index_file_prefix(scale)))
        .collect();
    let mut found: BTreeMap<u32, Vec<PathBuf>> =
        scales.iter().map(|&scale| (scale, Vec::new())).collect();

    for entry in entries {
        let entry =
            entry.map_err(|e| construction_error(format!("failed to list directory: {}", e)))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some((scale, _)) = prefixes.iter().find(|(_, prefix)| matches_scale(name, prefix)) {
            if let Some(files) = found.get_mut(scale) {
                files.push(path.clone());
            }
        }
    }

    for files in found.values_mut() {
        files.sort();
    }

    Ok(found)
}
