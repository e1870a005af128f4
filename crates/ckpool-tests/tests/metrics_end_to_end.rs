//! Starts the metrics HTTP server on port 19100, drives the same atomic
//! sequence the registry's own unit tests check in isolation, then confirms
//! a real `GET /` over a real TCP socket returns all four exact lines.

use std::sync::Arc;
use std::time::Duration;

use ckpool_metrics::{run_metrics_server, Metrics};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const PORT: u16 = 19100;

#[tokio::test]
async fn get_root_returns_expected_exposition_lines() {
    let metrics = Arc::new(Metrics::new());
    metrics.inc_shares_valid();
    metrics.inc_shares_valid();
    metrics.inc_shares_valid();
    metrics.inc_shares_invalid();
    metrics.add_diff_accepted(350);
    metrics.set_bitcoin_height(850_000);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let handle = tokio::spawn(run_metrics_server(metrics, PORT, server_cancel));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stream = TcpStream::connect(("127.0.0.1", PORT)).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let mut resp = Vec::new();
    let _ = stream.read_to_end(&mut resp).await;
    let text = String::from_utf8_lossy(&resp);

    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("ckpool_shares_valid_total 3"));
    assert!(text.contains("ckpool_shares_invalid_total 1"));
    assert!(text.contains("ckpool_total_diff_accepted_total 350"));
    assert!(text.contains("ckpool_bitcoin_height 850000"));

    cancel.cancel();
    let _ = handle.await;
}
