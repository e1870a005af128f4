//! A deliberately minimal embedded HTTP server: one request per
//! connection, `GET` only, Prometheus text exposition as the only body
//! shape it ever serves.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::Metrics;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Runs the metrics HTTP accept loop until `cancel` fires. Uses a short
/// timed accept so shutdown is prompt even with no inbound traffic.
#[tracing::instrument(skip(metrics, cancel))]
pub async fn run_metrics_server(
    metrics: Arc<Metrics>,
    port: u16,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "metrics HTTP server listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_one(stream, &metrics).await {
                                warn!(error = %e, %peer, "metrics request failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "metrics accept failed"),
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    info!("metrics HTTP server stopped");
    Ok(())
}

async fn serve_one(mut stream: tokio::net::TcpStream, metrics: &Metrics) -> std::io::Result<()> {
    let mut buf = [0u8; 2048];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let method = request.split_whitespace().next().unwrap_or("");

    let response = if method.eq_ignore_ascii_case("GET") {
        let body = metrics.render();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {CONTENT_TYPE}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    } else {
        let body = "405 Method Not Allowed";
        format!(
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpStream;

    async fn free_port() -> u16 {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn get_returns_exposition_body() {
        let metrics = Arc::new(Metrics::new());
        metrics.inc_shares_valid();
        metrics.inc_shares_valid();
        metrics.inc_shares_valid();
        metrics.inc_shares_invalid();
        metrics.add_diff_accepted(350);
        metrics.set_bitcoin_height(850_000);

        let port = free_port().await;
        let cancel = CancellationToken::new();
        let server_cancel = cancel.clone();
        let handle = tokio::spawn(run_metrics_server(metrics, port, server_cancel));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut resp = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut resp).await;
        let text = String::from_utf8_lossy(&resp);

        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.contains("ckpool_shares_valid_total 3"));
        assert!(text.contains("ckpool_shares_invalid_total 1"));
        assert!(text.contains("ckpool_total_diff_accepted_total 350"));
        assert!(text.contains("ckpool_bitcoin_height 850000"));

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn non_get_returns_405() {
        let metrics = Arc::new(Metrics::new());
        let port = free_port().await;
        let cancel = CancellationToken::new();
        let server_cancel = cancel.clone();
        let handle = tokio::spawn(run_metrics_server(metrics, port, server_cancel));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"POST / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut resp = Vec::new();
        let _ = tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut resp).await;
        let text = String::from_utf8_lossy(&resp);
        assert!(text.starts_with("HTTP/1.1 405"));

        cancel.cancel();
        let _ = handle.await;
    }
}
