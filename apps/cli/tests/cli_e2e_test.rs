use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_version() {
    let mut cmd = Command::cargo_bin("runway-cli").unwrap();
    cmd.arg("-V").assert().success().stdout(predicate::str::contains("runway 0.1.0"));
}

#[test]
fn test_help() {
    let mut cmd = Command::cargo_bin("runway-cli").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Runway resolves log and checkpoint directories"));
}

#[test]
fn test_stage_help_lists_run_flags() {
    let mut cmd = Command::cargo_bin("runway-cli").unwrap();
    cmd.args(["fit", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--name"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("--ckpt-dirpath"));
}
