//! E2E tests for fetch-tools CLI

#![allow(deprecated)] // cargo_bin deprecation - will update when assert_cmd stabilizes replacement

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn fetch_tools() -> Command {
    let mut cmd = Command::cargo_bin("fetch-tools").unwrap();
    cmd.env_remove("FETCH_PROXY_URL");
    cmd
}

#[test]
fn test_help() {
    fetch_tools()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("stealth"))
        .stdout(predicate::str::contains("--log-level"));
}

#[test]
fn test_version() {
    fetch_tools()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch-tools"));
}

#[test]
fn test_fetch_help() {
    fetch_tools()
        .args(["fetch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--raw"))
        .stdout(predicate::str::contains("--country"))
        .stdout(predicate::str::contains("--max-chars"))
        .stdout(predicate::str::contains("--parallel"))
        .stdout(predicate::str::contains("--report"))
        .stdout(predicate::str::contains("--proxy"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_stealth_help() {
    fetch_tools()
        .args(["stealth", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--wait-selector"))
        .stdout(predicate::str::contains("--no-solve"))
        .stdout(predicate::str::contains("--headful"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_fetch_no_args() {
    fetch_tools()
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_stealth_no_args() {
    fetch_tools()
        .arg("stealth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_invalid_command() {
    fetch_tools()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.yaml");

    fetch_tools()
        .args(["fetch", "https://example.test/", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_malformed_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fetch.yaml");
    fs::write(&path, "max_retries: [not, a, number]\n").unwrap();

    fetch_tools()
        .args(["fetch", "https://example.test/", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_invalid_config_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fetch.yaml");
    fs::write(&path, "max_concurrent_per_domain: 0\n").unwrap();

    fetch_tools()
        .args(["stealth", "https://example.test/", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrent_per_domain"));
}

#[test]
fn test_retries_out_of_range() {
    fetch_tools()
        .args(["fetch", "https://example.test/", "--retries", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--retries"));
}

#[test]
fn test_invalid_url_reports_error_json() {
    // Rejected before any network or browser work
    fetch_tools()
        .args(["fetch", "not-a-url", "--min-delay", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ok\": false"))
        .stdout(predicate::str::contains("invalid URL"))
        .stderr(predicate::str::contains("Done: 0/1 OK"));
}

#[test]
fn test_invalid_url_yaml_output() {
    fetch_tools()
        .args(["fetch", "not-a-url", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: false"))
        .stdout(predicate::str::contains("status: error"));
}
