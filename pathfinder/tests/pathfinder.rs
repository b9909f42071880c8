//! Tests that run the pathfinder binary against the certpath test artifacts.

use assert_cmd::prelude::*;
use lazy_static::lazy_static;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use tempfile::TempDir;

const EXAMPLES: &str = "../certpath/tests/examples";
const TIME_OF_INTEREST: &str = "1798761600";

lazy_static! {
    static ref TA_DIR: Mutex<Option<TempDir>> = Mutex::new(None);
}

/// Returns a folder containing only the test root certificate.
fn ta_folder() -> String {
    let mut guard = TA_DIR.lock().unwrap();
    if guard.is_none() {
        let dir = tempfile::tempdir().unwrap();
        fs::copy(
            Path::new(EXAMPLES).join("root.der"),
            dir.path().join("root.der"),
        )
        .unwrap();
        *guard = Some(dir);
    }
    guard
        .as_ref()
        .unwrap()
        .path()
        .to_str()
        .unwrap()
        .to_string()
}

fn example(name: &str) -> String {
    format!("{}/{}", EXAMPLES, name)
}

#[test]
fn builds_path_using_ca_folder() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pathfinder")?;
    cmd.arg("-t")
        .arg(ta_folder())
        .arg("-c")
        .arg(example("store"))
        .arg("-e")
        .arg(example("ee.der"))
        .arg("-i")
        .arg(TIME_OF_INTEREST);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test End Entity"))
        .stdout(predicate::str::contains("Test Intermediate CA"))
        .stdout(predicate::str::contains("Trust anchor:").and(predicate::str::contains("Test Root CA")));
    Ok(())
}

#[test]
fn no_path_without_intermediate() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pathfinder")?;
    cmd.arg("-t")
        .arg(ta_folder())
        .arg("-e")
        .arg(example("ee.der"))
        .arg("-i")
        .arg(TIME_OF_INTEREST);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("NoPathsFound"));
    Ok(())
}

#[test]
fn path_length_limit() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pathfinder")?;
    cmd.arg("-t")
        .arg(ta_folder())
        .arg("-c")
        .arg(example("store"))
        .arg("-e")
        .arg(example("ee.der"))
        .arg("-i")
        .arg(TIME_OF_INTEREST)
        .arg("-m")
        .arg("0");
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("ERROR"));
    Ok(())
}

#[test]
fn settings_file_supplies_folders() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let settings = dir.path().join("settings.json");
    let ca_folder = fs::canonicalize(example("store"))?;
    let json = format!(
        r#"{{"psTrustAnchorFolder": {{"String": {:?}}}, "psCertificationAuthorityFolder": {{"String": {:?}}}, "psTimeOfInterest": {{"U64": {}}}}}"#,
        ta_folder(),
        ca_folder.to_str().unwrap_or_default(),
        TIME_OF_INTEREST
    );
    fs::write(&settings, json)?;

    let mut cmd = Command::cargo_bin("pathfinder")?;
    cmd.arg("-s").arg(&settings).arg("-e").arg(example("ee.der"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test Intermediate CA"));
    Ok(())
}

#[test]
fn missing_trust_anchor_folder() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pathfinder")?;
    cmd.arg("-t")
        .arg("tests/does_not_exist")
        .arg("-e")
        .arg(example("ee.der"));
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("Misconfiguration"));
    Ok(())
}

#[test]
fn missing_settings_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("pathfinder")?;
    cmd.arg("-s")
        .arg("tests/does_not_exist.json")
        .arg("-e")
        .arg(example("ee.der"));
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("NotFound"));
    Ok(())
}
