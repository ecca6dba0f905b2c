//! Drives the astrometry.net adapter against a stand-in `solve-field` script.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use platesolver_lib::astrometry::fits::{format_card, CardValue};
use platesolver_lib::test_utils::json_peaks;
use platesolver_lib::{
    AstrometryNetConfig, AstrometryNetFactory, Error, PlateSolver, SolveOutcome, SolveRequest,
};
use tempfile::{tempdir, TempDir};

fn wcs_fixture() -> Vec<u8> {
    let scale = 1.5 / 3600.0;
    let cards = [
        ("SIMPLE", CardValue::Logical(true)),
        ("BITPIX", CardValue::Integer(8)),
        ("NAXIS", CardValue::Integer(0)),
        ("WCSAXES", CardValue::Integer(2)),
        ("CTYPE1", CardValue::Text("RA---TAN".into())),
        ("CTYPE2", CardValue::Text("DEC--TAN".into())),
        ("EQUINOX", CardValue::Float(2000.0)),
        ("CRVAL1", CardValue::Float(83.8)),
        ("CRVAL2", CardValue::Float(-5.4)),
        ("CRPIX1", CardValue::Float(320.5)),
        ("CRPIX2", CardValue::Float(240.5)),
        ("CD1_1", CardValue::Float(-scale)),
        ("CD1_2", CardValue::Float(0.0)),
        ("CD2_1", CardValue::Float(0.0)),
        ("CD2_2", CardValue::Float(scale)),
        ("IMAGEW", CardValue::Integer(640)),
        ("IMAGEH", CardValue::Integer(480)),
    ];

    let mut bytes: Vec<u8> = cards
        .iter()
        .flat_map(|(key, value)| format_card(key, value))
        .collect();
    bytes.extend(format!("{:<80}", "END").into_bytes());
    let padded = bytes.len().div_ceil(2880) * 2880;
    bytes.resize(padded, b' ');
    bytes
}

/// Index directory holding one scale-6 file, plus a script standing in for
/// `solve-field` that runs `body` in the solve's scratch directory.
fn fake_install(body: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("temp dir");
    let index = dir.path().join("index");
    fs::create_dir(&index).unwrap();
    fs::write(index.join("index-5206-00.fits"), b"SIMPLE").unwrap();

    let fixture = dir.path().join("solution.wcs");
    fs::write(&fixture, wcs_fixture()).unwrap();

    let script = dir.path().join("solve-field");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\nFIXTURE='{}'\n{}\n",
            fixture.display(),
            body
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    (dir, index)
}

fn solver_for(install: &Path, index: &Path) -> PlateSolver {
    let factory = AstrometryNetFactory::new(AstrometryNetConfig {
        solve_field: install.join("solve-field"),
        cpu_limit: Duration::from_secs(5),
        work_root: Some(install.join("work")),
    });
    PlateSolver::with_resolver(
        Arc::new(factory),
        platesolver_lib::config::fixed_directory_resolver(index),
    )
}

fn request() -> SolveRequest {
    SolveRequest {
        peaks_xy: json_peaks(12),
        ..SolveRequest::default()
    }
}

#[test]
fn solved_field_is_reported_as_a_match() {
    let (install, index) = fake_install("test -s field.xyls || exit 3\ncp \"$FIXTURE\" field.wcs");
    let solver = solver_for(install.path(), &index);

    let outcome = solver.solve(&request()).expect("solve succeeds");

    match outcome {
        SolveOutcome::Match {
            center_ra_deg,
            center_dec_deg,
            scale_arcsec_per_pixel,
            wcs_header,
        } => {
            assert!((center_ra_deg - 83.8).abs() < 1e-9);
            assert!((center_dec_deg + 5.4).abs() < 1e-9);
            assert!((scale_arcsec_per_pixel - 1.5).abs() < 1e-9);
            assert_eq!(
                wcs_header.get("CTYPE1").and_then(|v| v.as_str()),
                Some("RA---TAN")
            );
            assert!(wcs_header.contains_key("EQUINOX"));
        }
        other => panic!("expected a match, got {:?}", other),
    }
}

#[test]
fn missing_wcs_file_is_no_match() {
    let (install, index) = fake_install("exit 0");
    let solver = solver_for(install.path(), &index);

    let outcome = solver.solve(&request()).expect("solve succeeds");

    assert_eq!(outcome, SolveOutcome::NoMatch);
}

#[test]
fn failing_process_is_a_solve_failure() {
    let (install, index) = fake_install("echo 'index file is corrupt' >&2\nexit 2");
    let solver = solver_for(install.path(), &index);

    let err = solver.solve(&request()).unwrap_err();

    match err {
        Error::SolveFailure { message } => assert!(message.contains("index file is corrupt")),
        other => panic!("expected a solve failure, got {:?}", other),
    }
}

#[test]
fn unreadable_wcs_file_is_a_solve_failure() {
    let (install, index) = fake_install("echo garbage > field.wcs");
    let solver = solver_for(install.path(), &index);

    let err = solver.solve(&request()).unwrap_err();

    assert_eq!(err.kind(), "solve_failure");
    match err {
        Error::SolveFailure { message } => assert!(message.contains("unreadable WCS")),
        other => panic!("expected a solve failure, got {:?}", other),
    }
}

#[test]
fn shutdown_removes_the_working_directory() {
    let (install, index) = fake_install("exit 0");
    let solver = solver_for(install.path(), &index);

    solver.solve(&request()).unwrap();
    let work = install.path().join("work");
    assert_eq!(fs::read_dir(&work).unwrap().count(), 1);

    solver.shutdown();

    assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
}
