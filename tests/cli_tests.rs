//! Command-line behaviour of the `lightd` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn lightd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lightd"));
    cmd.env_remove("LIGHTS_LOG_FILE")
        .env_remove("LIGHTS_TARGETS")
        .env_remove("LIGHTS_PORT")
        .env_remove("LIGHTS_DRIVER");
    cmd
}

#[test]
fn test_help_describes_protocol() {
    lightd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"set\""))
        .stdout(predicate::str::contains("--target"));
}

#[test]
fn test_version() {
    lightd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_duplicate_targets_are_rejected() {
    lightd()
        .args(["--driver", "memory", "--target", "red=1", "--target", "RED=2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INVALID_CONFIG"))
        .stderr(predicate::str::contains("red"));
}

#[test]
fn test_bad_environment_is_rejected() {
    lightd()
        .env("LIGHTS_PORT", "eighty")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LIGHTS_PORT"));
}

#[test]
fn test_malformed_target_flag() {
    lightd()
        .args(["--target", "red"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=PIN"));
}
