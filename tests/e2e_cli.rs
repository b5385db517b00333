//! CLI end-to-end tests
//!
//! Tests for the relayforge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the relayforge binary
#[allow(deprecated)]
fn relayforge_cmd() -> Command {
    let mut cmd = Command::cargo_bin("relayforge").unwrap();
    cmd.env_remove("PORT").env_remove("HW_ACCEL").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    relayforge_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_lists_commands() {
    relayforge_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("build-args"))
        .stdout(predicate::str::contains("check-tools"));
}

#[test]
fn test_cli_version_command() {
    relayforge_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "relayforge {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_check_tools_command() {
    relayforge_cmd()
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_build_args_software_720p() {
    relayforge_cmd()
        .args([
            "build-args",
            "--url",
            "https://cdn.example.com/movie.mkv",
            "--quality",
            "720p",
            "--start",
            "30",
        ])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("ffmpeg -loglevel error -ss 30 "))
        .stdout(predicate::str::contains("-i https://cdn.example.com/movie.mkv"))
        .stdout(predicate::str::contains("-c:v libx264"))
        .stdout(predicate::str::contains("-vf scale=-2:720"))
        .stdout(predicate::str::contains("-f mp4 pipe:1"));
}

#[test]
fn test_cli_build_args_hw_accel() {
    relayforge_cmd()
        .args([
            "build-args",
            "--url",
            "https://cdn.example.com/movie.mkv",
            "--quality",
            "1080p",
            "--hw-accel",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("-hwaccel vaapi"))
        .stdout(predicate::str::contains("-c:v h264_vaapi"))
        .stdout(predicate::str::contains("scale_vaapi=w=-2:h=1080"));
}

#[test]
fn test_cli_build_args_hw_accel_from_env() {
    relayforge_cmd()
        .env("HW_ACCEL", "true")
        .args(["build-args", "--url", "http://cdn.example.com/a.mp4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("h264_vaapi"));
}

#[test]
fn test_cli_build_args_rejects_non_http() {
    relayforge_cmd()
        .args(["build-args", "--url", "file:///etc/passwd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid URL protocol"));
}

#[test]
fn test_cli_build_args_rejects_unknown_quality() {
    relayforge_cmd()
        .args(["build-args", "--url", "http://a.b/c", "--quality", "4k"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown quality"));
}

#[test]
fn test_cli_validate_valid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("relayforge.json");
    fs::write(
        &path,
        r#"{ "server": { "port": 8081 }, "transcode": { "max_concurrent": 4 } }"#,
    )
    .unwrap();

    relayforge_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("0.0.0.0:8081"))
        .stdout(predicate::str::contains("Max concurrent transcodes: 4"));
}

#[test]
fn test_cli_validate_reports_warnings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("relayforge.json");
    fs::write(&path, r#"{ "transcode": { "max_concurrent": 0 } }"#).unwrap();

    relayforge_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("warning"));
}

#[test]
fn test_cli_validate_invalid_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    relayforge_cmd()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure();
}

#[test]
fn test_cli_validate_uses_global_config_flag() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("relayforge.json");
    fs::write(&path, "{}").unwrap();

    relayforge_cmd()
        .arg("--config")
        .arg(&path)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Validating config"));
}
