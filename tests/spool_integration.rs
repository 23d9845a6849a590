//! Integration tests for log record delivery through the spool.

use std::time::Duration;

use batchfetch_core::{LogSpooler, SpoolConfig};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

fn record(n: u32) -> String {
    format!("{{\"level\":\"INFO\",\"n\":{n}}}")
}

#[tokio::test]
async fn test_spooled_records_are_delivered_in_order_after_recovery()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new()?;
    let spool_path = temp_dir.path().join("spool.jsonl");
    let config = SpoolConfig {
        request_timeout: Duration::from_secs(5),
        ..SpoolConfig::new(format!("{}/ingest", mock_server.uri()), &spool_path)
    };
    let spooler = LogSpooler::new(config)?;

    spooler.process_batch(&[record(1), record(2)]).await?;
    assert_eq!(
        std::fs::read_to_string(&spool_path)?,
        format!("{}\n{}\n", record(1), record(2))
    );

    mock_server.reset().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&mock_server)
        .await;

    spooler.process_batch(&[record(3)]).await?;

    let requests = mock_server.received_requests().await.ok_or("recording enabled")?;
    let bodies: Vec<String> = requests
        .iter()
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect();
    assert_eq!(bodies, vec![record(1), record(2), record(3)]);
    assert!(!spool_path.exists());
    mock_server.verify().await;
    Ok(())
}

#[tokio::test]
async fn test_drain_stops_at_first_failure_and_keeps_tail()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new()?;
    let spool_path = temp_dir.path().join("spool.jsonl");
    std::fs::write(
        &spool_path,
        format!("{}\n{}\n{}\n", record(1), record(2), record(3)),
    )?;
    let spooler = LogSpooler::new(SpoolConfig::new(
        format!("{}/ingest", mock_server.uri()),
        &spool_path,
    ))?;

    let remaining = spooler.drain_spool().await?;

    assert_eq!(remaining, 2);
    assert_eq!(
        std::fs::read_to_string(&spool_path)?,
        format!("{}\n{}\n", record(2), record(3))
    );
    Ok(())
}

#[tokio::test]
async fn test_empty_spool_drains_to_zero() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let spooler = LogSpooler::new(SpoolConfig::new(
        "http://127.0.0.1:9/ingest",
        temp_dir.path().join("absent.jsonl"),
    ))?;

    assert_eq!(spooler.drain_spool().await?, 0);
    Ok(())
}
