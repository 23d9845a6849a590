//! End-to-end CLI tests for the batchfetch binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

/// Binary isolated from the user's config file.
fn batchfetch(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("batchfetch").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env_remove("RUST_LOG");
    cmd
}

fn write_config(config_home: &std::path::Path, contents: &str) {
    let config_dir = config_home.join("batchfetch");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_binary_help_shows_usage() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--max-concurrent"))
        .stdout(predicate::str::contains("--probe"));
}

#[test]
fn test_binary_version_flag() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("batchfetch"));
}

#[test]
fn test_binary_rejects_unknown_flag() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_binary_without_input_exits_successfully() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .write_stdin("# nothing to fetch\n\n")
        .assert()
        .success();
}

#[test]
fn test_binary_probe_blocked_host_prints_skipped() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .args(["-q", "--probe", "https://www.youtube.com/watch?v=abc"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "skipped https://www.youtube.com/watch?v=abc (blocked host)",
        ));
}

#[test]
fn test_binary_probe_json_output() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .args(["-q", "--probe", "--json", "https://vimeo.com/123"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            r#"{"url":"https://vimeo.com/123","downloadable":false,"reason":"blocked host"}"#,
        ));
}

#[test]
fn test_binary_block_host_flag_replaces_defaults() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .args(["-q", "--probe", "--block-host", "files.test", "http://cdn.files.test/a.zip"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("(blocked host)"));
}

#[test]
fn test_binary_reports_invalid_config_file() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "max_concurrent = 4\nturbo = true\n");

    batchfetch(temp_dir.path())
        .arg("https://example.com/a.pdf")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown configuration key"))
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn test_binary_explicit_config_must_exist() {
    let temp_dir = TempDir::new().unwrap();
    batchfetch(temp_dir.path())
        .arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .arg("https://example.com/a.pdf")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[tokio::test]
async fn test_binary_partial_success_exits_with_two() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return socket_skip_return();
    };
    Mock::given(method("GET"))
        .and(path("/ok.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PDF".to_vec()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fail.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("out");
    batchfetch(temp_dir.path())
        .arg("-q")
        .arg("-d")
        .arg(&out_dir)
        .args(["-r", "0"])
        .arg(format!("{}/ok.pdf", mock_server.uri()))
        .arg(format!("{}/fail.pdf", mock_server.uri()))
        .assert()
        .code(2);

    assert_eq!(std::fs::read(out_dir.join("ok.pdf")).unwrap(), b"PDF");
}

#[tokio::test]
async fn test_binary_reads_urls_from_stdin_and_uses_config_dir() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return socket_skip_return();
    };
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"notes".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("from-config");
    write_config(
        temp_dir.path(),
        &format!(
            "download_dir = \"{}\"\nmax_retries = 0\n",
            out_dir.to_string_lossy().replace('\\', "/")
        ),
    );

    batchfetch(temp_dir.path())
        .arg("-q")
        .write_stdin(format!("# list\n{}/notes.txt\n", mock_server.uri()))
        .assert()
        .success();

    assert_eq!(std::fs::read(out_dir.join("notes.txt")).unwrap(), b"notes");
}
