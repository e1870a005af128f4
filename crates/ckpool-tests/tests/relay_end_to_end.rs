//! A mock primary (a bare `TcpListener` speaking the frame protocol by
//! hand) sends a TEMPLATE frame carrying `{"job":1}`; a real `RelayClient`
//! receives it and delivers the payload to its template callback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ckpool_core::TestClock;
use ckpool_relay::{frame, ClientState, MessageType, RelayClient, TemplateHandler};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn mock_primary_template_reaches_client_callback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mock_primary = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (mut read_half, mut write_half) = stream.into_split();
        let (msg_type, _payload) = frame::read_frame(&mut read_half).await.unwrap();
        assert_eq!(msg_type, MessageType::Register);
        frame::write_frame(&mut write_half, MessageType::Template, br#"{"job":1}"#)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let received: Arc<std::sync::Mutex<Option<Bytes>>> = Arc::new(std::sync::Mutex::new(None));
    let count = Arc::new(AtomicUsize::new(0));
    let received_clone = received.clone();
    let count_clone = count.clone();
    let on_template: TemplateHandler = Arc::new(move |payload| {
        *received_clone.lock().unwrap() = Some(payload);
        count_clone.fetch_add(1, Ordering::Relaxed);
    });

    let clock = Arc::new(TestClock::new(1_000));
    let client = RelayClient::new("us-east", Duration::from_secs(30), clock, on_template);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run_client = client.clone();
    let handle = tokio::spawn(async move {
        run_client.run(addr.to_string(), run_cancel).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(client.state(), ClientState::Connected);
    assert_eq!(count.load(Ordering::Relaxed), 1);
    assert_eq!(received.lock().unwrap().as_deref(), Some(&b"{\"job\":1}"[..]));

    cancel.cancel();
    let _ = handle.await;
    let _ = mock_primary.await;
}
