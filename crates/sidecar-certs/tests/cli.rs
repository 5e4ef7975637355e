//! End-to-end tests of the `sidecar-certs` binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const FAST_PROFILES: &str = r#"
[ca]
key_algorithm = "ecdsa-p256"

[leaf]
key_algorithm = "ecdsa-p256"
"#;

const ARTIFACTS: [&str; 5] = [
    "ca.key",
    "ca.crt",
    "sidecar-injector.key",
    "sidecar-injector.csr",
    "sidecar-injector.crt",
];

fn cmd(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sidecar-certs").unwrap();
    cmd.env_remove("DEPLOYMENT")
        .env_remove("CLUSTER")
        .env_remove("RUST_LOG")
        .arg("--root")
        .arg(root);
    cmd
}

fn fast_cmd(dir: &TempDir) -> Command {
    let config = dir.path().join("profiles.toml");
    if !config.exists() {
        fs::write(&config, FAST_PROFILES).unwrap();
    }
    let mut cmd = cmd(dir.path());
    cmd.arg("--config").arg(config);
    cmd
}

fn files_in(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn sorted_artifacts() -> Vec<String> {
    let mut names: Vec<String> = ARTIFACTS.iter().map(ToString::to_string).collect();
    names.sort();
    names
}

// ============================================================================
// issue
// ============================================================================

#[test]
fn test_issue_with_defaults_writes_five_artifacts() {
    let dir = TempDir::new().unwrap();

    cmd(dir.path())
        .args(["issue", "--az", "us-east-1", "--cluster", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Issued certificates for us-east-1-PRODUCTION"))
        .stdout(predicate::str::contains("bootstrapped"))
        .stdout(predicate::str::contains("Please commit these!"));

    let scope_dir = dir.path().join("us-east-1").join("PRODUCTION");
    assert_eq!(files_in(&scope_dir), sorted_artifacts());

    cmd(dir.path())
        .args(["verify", "--az", "us-east-1", "--cluster", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CN=k8s-sidecar-injector.kube-system.svc"));
}

#[test]
fn test_issue_reads_scope_from_environment() {
    let dir = TempDir::new().unwrap();

    fast_cmd(&dir)
        .env("DEPLOYMENT", "DC01")
        .env("CLUSTER", "blue")
        .arg("issue")
        .assert()
        .success();

    assert_eq!(
        files_in(&dir.path().join("dc01").join("BLUE")),
        sorted_artifacts()
    );
}

#[test]
fn test_issue_empty_az_fails_without_writing() {
    let dir = TempDir::new().unwrap();

    cmd(dir.path())
        .args(["issue", "--az", "", "--cluster", "production"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validate input"))
        .stderr(predicate::str::contains("invalid input"));

    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_issue_rerun_without_force_is_refused() {
    let dir = TempDir::new().unwrap();
    let issue = ["issue", "--az", "eu-west-1", "--cluster", "green"];

    fast_cmd(&dir).args(issue).assert().success();
    let leaf = dir
        .path()
        .join("eu-west-1")
        .join("GREEN")
        .join("sidecar-injector.crt");
    let before = fs::read(&leaf).unwrap();

    fast_cmd(&dir)
        .args(issue)
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to overwrite"));
    assert_eq!(fs::read(&leaf).unwrap(), before);

    fast_cmd(&dir)
        .args(issue)
        .arg("--force")
        .assert()
        .success()
        .stdout(predicate::str::contains("reused"));
    assert_ne!(fs::read(&leaf).unwrap(), before);
}

#[test]
fn test_regenerate_ca_requires_force() {
    let dir = TempDir::new().unwrap();

    fast_cmd(&dir)
        .args(["issue", "--az", "dc01", "--cluster", "x", "--regenerate-ca"])
        .assert()
        .failure();

    assert_eq!(files_in(dir.path()), vec!["profiles.toml".to_string()]);
}

#[test]
fn test_issue_json_report() {
    let dir = TempDir::new().unwrap();

    let output = fast_cmd(&dir)
        .args(["--format", "json", "issue", "--az", "dc02", "--cluster", "red"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["scope"]["az"], "dc02");
    assert_eq!(report["scope"]["cluster"], "RED");
    assert_eq!(report["leaf_serial"], 2);
    assert_eq!(report["artifacts"].as_array().map(Vec::len), Some(5));
}

// ============================================================================
// verify
// ============================================================================

#[test]
fn test_verify_missing_scope_fails() {
    let dir = TempDir::new().unwrap();

    cmd(dir.path())
        .args(["verify", "--az", "dc01", "--cluster", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: "));
}

#[test]
fn test_verify_detects_foreign_leaf() {
    let dir = TempDir::new().unwrap();
    fast_cmd(&dir)
        .args(["issue", "--az", "dc01", "--cluster", "a"])
        .assert()
        .success();
    fast_cmd(&dir)
        .args(["issue", "--az", "dc01", "--cluster", "b"])
        .assert()
        .success();

    let scopes = dir.path().join("dc01");
    fs::copy(
        scopes.join("B").join("sidecar-injector.crt"),
        scopes.join("A").join("sidecar-injector.crt"),
    )
    .unwrap();

    cmd(dir.path())
        .args(["verify", "--az", "dc01", "--cluster", "a"])
        .assert()
        .failure();
    cmd(dir.path())
        .args(["verify", "--az", "dc01", "--cluster", "b"])
        .assert()
        .success();
}

// ============================================================================
// profiles
// ============================================================================

#[test]
fn test_profiles_shows_expanded_defaults() {
    let dir = TempDir::new().unwrap();

    cmd(dir.path())
        .args(["profiles", "--az", "us-east-1", "--cluster", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("us-east-1-PRODUCTION sidecar injector CA"))
        .stdout(predicate::str::contains("rsa-4096"))
        .stdout(predicate::str::contains("rsa-2048"))
        .stdout(predicate::str::contains("999999 days"));

    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[leaf]\nvalidity_days = 0\n").unwrap();

    cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["issue", "--az", "dc01", "--cluster", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));

    assert!(!dir.path().join("dc01").exists());
}

#[test]
fn test_oversized_validity_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("long.toml");
    fs::write(&config, "[ca]\nvalidity_days = 4294967295\n").unwrap();

    cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["issue", "--az", "dc01", "--cluster", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ca.validity_days must be at most"));

    assert!(!dir.path().join("dc01").exists());
}
