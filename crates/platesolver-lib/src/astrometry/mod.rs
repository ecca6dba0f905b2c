//! Matching engine backed by the astrometry.net `solve-field` program.
//!
//! Construction scans the index directory for series-5200 index files and
//! writes a private astrometry.net config listing them. Each solve writes the
//! peaks to a scratch x/y list, runs `solve-field`, and reads the fitted WCS
//! header back. Release deletes the working directory.

pub mod fits;
pub mod index;

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::engine::{EngineFactory, EngineMatch, EngineSolution, MatchingEngine};
use crate::error::{Error, Result};
use crate::model::{Peak, SolveConfiguration, SolveHints, WcsHeader};
use crate::wcs::Wcs;

use self::fits::{read_header_file, write_xylist};
use self::index::discover_index_files;

/// Environment variable overriding the `solve-field` executable.
pub const SOLVE_FIELD_ENV: &str = "SOLVE_FIELD_PATH";
/// Environment variable setting the per-solve CPU limit in seconds.
pub const CPU_LIMIT_ENV: &str = "SOLVE_CPU_LIMIT_SECS";
/// Environment variable choosing where working directories are created.
pub const WORK_DIR_ENV: &str = "ASTROMETRY_WORK_DIR";

const CONFIG_FILE: &str = "astrometry.cfg";
const XYLIST_FILE: &str = "field.xyls";
const WCS_FILE: &str = "field.wcs";
const STDERR_TAIL: usize = 512;

/// Settings for driving `solve-field`.
#[derive(Debug, Clone, PartialEq)]
pub struct AstrometryNetConfig {
    /// Path or name of the `solve-field` executable.
    pub solve_field: PathBuf,
    /// CPU time budget handed to `solve-field --cpulimit`.
    pub cpu_limit: Duration,
    /// Parent directory for engine working directories; system temp if unset.
    pub work_root: Option<PathBuf>,
}

impl Default for AstrometryNetConfig {
    fn default() -> Self {
        Self {
            solve_field: PathBuf::from("solve-field"),
            cpu_limit: Duration::from_secs(30),
            work_root: None,
        }
    }
}

impl AstrometryNetConfig {
    /// Create configuration from environment variables.
    ///
    /// - `SOLVE_FIELD_PATH`: executable (default: `solve-field` on `PATH`)
    /// - `SOLVE_CPU_LIMIT_SECS`: CPU limit per solve (default: 30)
    /// - `ASTROMETRY_WORK_DIR`: working directory root (default: system temp)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let solve_field = env::var_os(SOLVE_FIELD_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.solve_field);

        let cpu_limit = env::var(CPU_LIMIT_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.cpu_limit);

        let work_root = env::var_os(WORK_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            solve_field,
            cpu_limit,
            work_root,
        }
    }
}

/// Builds [`AstrometryNetEngine`]s.
#[derive(Debug, Clone, Default)]
pub struct AstrometryNetFactory {
    config: AstrometryNetConfig,
}

impl AstrometryNetFactory {
    pub fn new(config: AstrometryNetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AstrometryNetConfig {
        &self.config
    }

    fn create_work_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("platesolver-");
        match &self.config.work_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

impl EngineFactory for AstrometryNetFactory {
    fn construct(&self, config: &SolveConfiguration) -> Result<Box<dyn MatchingEngine>> {
        let directory = config.index_directory();
        let construction_error = |reason: String| Error::EngineConstruction {
            directory: directory.to_path_buf(),
            reason,
        };

        let found = discover_index_files(directory, config.scales())?;
        for (scale, files) in &found {
            if files.is_empty() {
                warn!(scale = *scale, directory = %directory.display(), "no index files for scale");
            }
        }

        let index_files: Vec<PathBuf> = found.into_values().flatten().collect();
        if index_files.is_empty() {
            return Err(construction_error(format!(
                "no usable index files for scales {:?}",
                config.scales()
            )));
        }

        let work_dir = self
            .create_work_dir()
            .map_err(|e| construction_error(format!("failed to create working directory: {}", e)))?;
        let config_path = work_dir.path().join(CONFIG_FILE);
        fs::write(&config_path, render_config(&index_files))
            .map_err(|e| construction_error(format!("failed to write {}: {}", CONFIG_FILE, e)))?;

        info!(
            index_files = index_files.len(),
            work_dir = %work_dir.path().display(),
            "astrometry.net engine configured"
        );

        Ok(Box::new(AstrometryNetEngine {
            solve_field: self.config.solve_field.clone(),
            cpu_limit: self.config.cpu_limit,
            config_path,
            work_path: work_dir.path().to_path_buf(),
            work_dir: Mutex::new(Some(work_dir)),
        }))
    }
}

/// astrometry.net backend configuration file contents.
fn render_config(index_files: &[PathBuf]) -> String {
    let mut cfg = String::from("inparallel\n");
    for path in index_files {
        let _ = writeln!(cfg, "index {}", path.display());
    }
    cfg
}

/// A configured `solve-field` invocation context.
#[derive(Debug)]
pub struct AstrometryNetEngine {
    solve_field: PathBuf,
    cpu_limit: Duration,
    config_path: PathBuf,
    work_path: PathBuf,
    work_dir: Mutex<Option<TempDir>>,
}

impl AstrometryNetEngine {
    fn command(&self, scratch: &Path, width: u32, height: u32, hints: &SolveHints) -> Command {
        let mut cmd = Command::new(&self.solve_field);
        cmd.current_dir(scratch)
            .arg("--config")
            .arg(&self.config_path)
            .arg("--dir")
            .arg(scratch)
            .args(["--no-plots", "--overwrite", "--no-remove-lines"])
            .args(["--new-fits", "none", "--corr", "none", "--rdls", "none"])
            .args(["--match", "none", "--index-xyls", "none"])
            .args(["--x-column", "X", "--y-column", "Y"])
            .arg("--width")
            .arg(width.to_string())
            .arg("--height")
            .arg(height.to_string())
            .arg("--cpulimit")
            .arg(self.cpu_limit.as_secs().max(1).to_string());

        if let Some(position) = hints.position {
            cmd.arg("--ra")
                .arg(position.ra_deg.to_string())
                .arg("--dec")
                .arg(position.dec_deg.to_string())
                .arg("--radius")
                .arg(position.radius_deg.to_string());
        }

        if let Some(scale) = hints.scale {
            cmd.args(["--scale-units", "arcsecperpix"])
                .arg("--scale-low")
                .arg(scale.lower_arcsec_per_pixel.to_string())
                .arg("--scale-high")
                .arg(scale.upper_arcsec_per_pixel.to_string());
        }

        cmd.arg(XYLIST_FILE);
        cmd
    }
}

impl MatchingEngine for AstrometryNetEngine {
    fn solve(&self, peaks: &[Peak], hints: &SolveHints) -> Result<Option<EngineSolution>> {
        let scratch = tempfile::Builder::new()
            .prefix("solve-")
            .tempdir_in(&self.work_path)
            .map_err(|e| Error::SolveFailure {
                message: format!("failed to create scratch directory: {}", e),
            })?;

        let (width, height) = image_extent(peaks);
        write_xylist(&scratch.path().join(XYLIST_FILE), peaks, width, height).map_err(|e| {
            Error::SolveFailure {
                message: format!("failed to write xylist: {}", e),
            }
        })?;

        let mut cmd = self.command(scratch.path(), width, height, hints);
        debug!(command = ?cmd, "running solve-field");

        let output = cmd.output().map_err(|e| Error::SolveFailure {
            message: format!("failed to run {}: {}", self.solve_field.display(), e),
        })?;
        check_status(&output)?;

        let wcs_path = scratch.path().join(WCS_FILE);
        if !wcs_path.exists() {
            debug!("solve-field finished without a solution");
            return Ok(None);
        }

        let header: WcsHeader = read_header_file(&wcs_path)
            .map_err(|e| Error::SolveFailure {
                message: format!("solve-field produced an unreadable WCS file: {}", e),
            })?
            .into_iter()
            .map(|(key, value)| (key, value.into()))
            .collect();
        let wcs = Wcs::from_header(&header).map_err(|e| Error::SolveFailure {
            message: format!("solve-field produced an unusable WCS: {}", e),
        })?;

        Ok(Some(EngineSolution::single(EngineMatch::from_wcs(wcs))))
    }

    fn release(&self) {
        let work_dir = self
            .work_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(dir) = work_dir {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove engine working directory");
            }
        }
    }
}

fn check_status(output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: String = stderr
        .chars()
        .rev()
        .take(STDERR_TAIL)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    Err(Error::SolveFailure {
        message: format!("solve-field exited with {}: {}", output.status, tail.trim()),
    })
}

/// Smallest image size, in whole pixels, that contains every peak.
fn image_extent(peaks: &[Peak]) -> (u32, u32) {
    let max_x = peaks.iter().map(|p| p.x).fold(0.0_f64, f64::max);
    let max_y = peaks.iter().map(|p| p.y).fold(0.0_f64, f64::max);
    let to_pixels = |v: f64| (v.ceil() as u32).saturating_add(1);
    (to_pixels(max_x), to_pixels(max_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn index_dir_with(names: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for name in names {
            fs::write(dir.path().join(name), b"SIMPLE").unwrap();
        }
        dir
    }

    fn factory_in(work_root: &Path) -> AstrometryNetFactory {
        AstrometryNetFactory::new(AstrometryNetConfig {
            solve_field: PathBuf::from("/nonexistent/solve-field"),
            cpu_limit: Duration::from_secs(5),
            work_root: Some(work_root.to_path_buf()),
        })
    }

    #[test]
    fn image_extent_covers_all_peaks() {
        let peaks = [Peak::new(10.2, 5.0), Peak::new(99.0, 300.7)];
        assert_eq!(image_extent(&peaks), (100, 302));
        assert_eq!(image_extent(&[]), (1, 1));
    }

    #[test]
    fn non_finite_cards_survive_the_json_round_trip() {
        let raw = [
            "CTYPE1  = 'RA---TAN'",
            "CRVAL1  =                 83.8",
            "CRVAL2  =                 -5.4",
            "CRPIX1  =                320.5",
            "CRPIX2  =                240.5",
            "CD1_1   =         -0.000416667",
            "CD2_2   =          0.000416667",
            "BLANKV  =                  NAN",
            "END",
        ];
        let bytes: Vec<u8> = raw
            .iter()
            .flat_map(|line| format!("{:<80}", line).into_bytes())
            .collect();

        let header: WcsHeader = fits::parse_header(&bytes)
            .unwrap()
            .into_iter()
            .map(|(key, value)| (key, value.into()))
            .collect();
        let wcs = Wcs::from_header(&header).unwrap();

        let json = serde_json::to_string(&wcs.to_header()).unwrap();
        assert!(json.contains(r#""BLANKV":"NAN""#));

        let back: WcsHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wcs.to_header());
        assert_eq!(Wcs::from_header(&back).unwrap(), wcs);
    }

    #[test]
    fn config_lists_every_index_file() {
        let cfg = render_config(&[
            PathBuf::from("/idx/index-5206-00.fits"),
            PathBuf::from("/idx/index-5206-01.fits"),
        ]);
        assert!(cfg.starts_with("inparallel\n"));
        assert!(cfg.contains("index /idx/index-5206-00.fits\n"));
        assert!(cfg.contains("index /idx/index-5206-01.fits\n"));
    }

    #[test]
    fn construction_fails_without_index_files_for_any_scale() {
        let index = index_dir_with(&["index-5207-00.fits"]);
        let work = tempdir().unwrap();

        let err = factory_in(work.path())
            .construct(&SolveConfiguration::new(index.path(), [6]))
            .err()
            .expect("construction must fail");
        assert!(matches!(err, Error::EngineConstruction { .. }));
    }

    #[test]
    fn construction_and_release_manage_working_directory() {
        let index = index_dir_with(&["index-5206-00.fits", "index-5206-01.fits"]);
        let work = tempdir().unwrap();

        let engine = factory_in(work.path())
            .construct(&SolveConfiguration::new(index.path(), [6, 7]))
            .unwrap();

        let entries: Vec<_> = fs::read_dir(work.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let work_dir = entries[0].as_ref().unwrap().path();
        let cfg = fs::read_to_string(work_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg.lines().filter(|l| l.starts_with("index ")).count(), 2);

        engine.release();
        engine.release();
        assert!(!work_dir.exists());
    }

    #[test]
    fn missing_executable_is_a_solve_failure() {
        let index = index_dir_with(&["index-5206-00.fits"]);
        let work = tempdir().unwrap();
        let engine = factory_in(work.path())
            .construct(&SolveConfiguration::new(index.path(), [6]))
            .unwrap();

        let peaks: Vec<Peak> = (0..12).map(|i| Peak::new(i as f64, i as f64)).collect();
        let err = engine.solve(&peaks, &SolveHints::default()).unwrap_err();
        assert!(matches!(err, Error::SolveFailure { .. }));
    }

    #[test]
    fn hints_become_command_line_flags() {
        let engine = AstrometryNetEngine {
            solve_field: PathBuf::from("solve-field"),
            cpu_limit: Duration::from_secs(30),
            config_path: PathBuf::from("/work/astrometry.cfg"),
            work_path: PathBuf::from("/work"),
            work_dir: Mutex::new(None),
        };
        let hints = SolveHints {
            position: Some(crate::model::PositionHint {
                ra_deg: 83.8,
                dec_deg: -5.4,
                radius_deg: 2.0,
            }),
            scale: Some(crate::model::ScaleHint {
                lower_arcsec_per_pixel: 1.0,
                upper_arcsec_per_pixel: 1.5,
            }),
        };

        let cmd = engine.command(Path::new("/work/solve-1"), 640, 480, &hints);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let after = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(after("--ra"), "83.8");
        assert_eq!(after("--dec"), "-5.4");
        assert_eq!(after("--radius"), "2");
        assert_eq!(after("--scale-units"), "arcsecperpix");
        assert_eq!(after("--scale-low"), "1");
        assert_eq!(after("--scale-high"), "1.5");
        assert_eq!(after("--width"), "640");
        assert_eq!(after("--cpulimit"), "30");
        assert_eq!(args.last().map(String::as_str), Some(XYLIST_FILE));
    }

    #[test]
    fn command_without_hints_has_no_hint_flags() {
        let engine = AstrometryNetEngine {
            solve_field: PathBuf::from("solve-field"),
            cpu_limit: Duration::from_secs(30),
            config_path: PathBuf::from("/work/astrometry.cfg"),
            work_path: PathBuf::from("/work"),
            work_dir: Mutex::new(None),
        };

        let cmd = engine.command(Path::new("/work/solve-1"), 640, 480, &SolveHints::default());
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        for flag in ["--ra", "--dec", "--radius", "--scale-low", "--scale-high"] {
            assert!(!args.iter().any(|a| a == flag), "{} should be absent", flag);
        }
    }
}
