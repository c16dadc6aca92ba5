//! End-to-end scenarios for the endpoint channel: one integration test
//! per concrete scenario, each driving a pair of in-process channels
//! wired together with [`endpoint_channel::stream::Pipe`]s exactly the
//! way the unit-level data pump tests do, but exercised through the
//! full public API a real transport embedder would use.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::sync::oneshot;

use endpoint_channel::channel::{new_channel, BaseEndpointChannel, SimpleBehavior};
use endpoint_channel::crypto::EncryptionCodec;
use endpoint_channel::handshake_runner::HandshakeRunner;
use endpoint_channel::medium::{DisconnectionReason, Medium};
use endpoint_channel::stream::{OutputStream, Pipe};
use endpoint_channel::testing::pump::{spawn_pump, Monitor};
use endpoint_channel::Error;

/// Wires up a plaintext channel pair directly over paired [`Pipe`]s, no
/// pump in between.
fn direct_channel_pair(
    medium: Medium,
) -> (
    Arc<BaseEndpointChannel<SimpleBehavior>>,
    Arc<BaseEndpointChannel<SimpleBehavior>>,
) {
    let (reader_a, writer_a) = Pipe::channel(8);
    let (reader_b, writer_b) = Pipe::channel(8);
    let channel_a = new_channel(
        "endpoint_a",
        SimpleBehavior(medium),
        Box::new(reader_b),
        Box::new(writer_a),
        5 * 1024 * 1024,
    );
    let channel_b = new_channel(
        "endpoint_b",
        SimpleBehavior(medium),
        Box::new(reader_a),
        Box::new(writer_b),
        5 * 1024 * 1024,
    );
    (channel_a, channel_b)
}

/// Wires up a channel pair with a monitoring pump spliced into each
/// direction, so traffic between them can be inspected without either
/// channel knowing.
fn mitm_channel_pair(
    medium: Medium,
) -> (
    Arc<BaseEndpointChannel<SimpleBehavior>>,
    Arc<BaseEndpointChannel<SimpleBehavior>>,
    Monitor,
    Monitor,
) {
    let (reader_a_out, writer_a_out) = Pipe::channel(8);
    let (reader_b_in, writer_b_in) = Pipe::channel(8);
    let (reader_b_out, writer_b_out) = Pipe::channel(8);
    let (reader_a_in, writer_a_in) = Pipe::channel(8);

    let channel_a = new_channel(
        "endpoint_a",
        SimpleBehavior(medium),
        Box::new(reader_a_in),
        Box::new(writer_a_out),
        5 * 1024 * 1024,
    );
    let channel_b = new_channel(
        "endpoint_b",
        SimpleBehavior(medium),
        Box::new(reader_b_in),
        Box::new(writer_b_out),
        5 * 1024 * 1024,
    );

    let monitor_a = Monitor::new();
    let monitor_b = Monitor::new();
    spawn_pump("monitor_a", Box::new(reader_a_out), Box::new(writer_b_in), Some(monitor_a.clone()));
    spawn_pump("monitor_b", Box::new(reader_b_out), Box::new(writer_a_in), Some(monitor_b.clone()));

    (channel_a, channel_b, monitor_a, monitor_b)
}

async fn run_handshake(
    channel_a: Arc<BaseEndpointChannel<SimpleBehavior>>,
    channel_b: Arc<BaseEndpointChannel<SimpleBehavior>>,
    timeout: Duration,
) -> (String, String) {
    let (client_token_tx, client_token_rx) = oneshot::channel();
    let (server_token_tx, server_token_rx) = oneshot::channel();

    let client_channel = channel_a.clone();
    let client_done = HandshakeRunner::start_client(
        "endpoint_a".to_string(),
        channel_a.clone(),
        timeout,
        Box::new(move |_id, context, auth_token, _raw| {
            Box::pin(async move {
                client_channel.enable_encryption(EncryptionCodec::new(&context)).await;
                let _ = client_token_tx.send(auth_token);
            })
        }),
        Box::new(|_id, _channel| Box::pin(async move {})),
    );

    let server_channel = channel_b.clone();
    let server_done = HandshakeRunner::start_server(
        "endpoint_b".to_string(),
        channel_b.clone(),
        timeout,
        Box::new(move |_id, context, auth_token, _raw| {
            Box::pin(async move {
                server_channel.enable_encryption(EncryptionCodec::new(&context)).await;
                let _ = server_token_tx.send(auth_token);
            })
        }),
        Box::new(|_id, _channel| Box::pin(async move {})),
    );

    for result in join_all(vec![client_done, server_done]).await {
        result.unwrap();
    }

    (client_token_rx.await.unwrap(), server_token_rx.await.unwrap())
}

#[tokio::test]
async fn s1_plaintext_round_trip() {
    let (channel_a, channel_b) = direct_channel_pair(Medium::Ble);
    channel_a.write(b"data message").await.unwrap();
    let got = channel_b.read().await.unwrap();
    assert_eq!(got, Bytes::from_static(b"data message"));
}

#[tokio::test]
async fn s2_mitm_plaintext_capture() {
    let (channel_a, channel_b, monitor_a, monitor_b) = mitm_channel_pair(Medium::Ble);

    assert_eq!(channel_a.get_type().await, "BLE");
    assert_eq!(channel_b.get_type().await, "BLE");

    channel_a.write(b"data message").await.unwrap();
    let got = channel_b.read().await.unwrap();
    assert_eq!(got, Bytes::from_static(b"data message"));

    let capture_a = String::from_utf8_lossy(&monitor_a.captured()).into_owned();
    let capture_b = String::from_utf8_lossy(&monitor_b.captured()).into_owned();
    assert!(
        capture_a.contains("data message") || capture_b.contains("data message"),
        "expected at least one monitor to observe the plaintext payload"
    );
}

#[tokio::test]
async fn s3_mitm_encrypted_opacity() {
    let (channel_a, channel_b, monitor_a, monitor_b) = mitm_channel_pair(Medium::Bluetooth);

    let (token_a, token_b) =
        tokio::time::timeout(Duration::from_millis(5000), run_handshake(channel_a.clone(), channel_b.clone(), Duration::from_secs(5)))
            .await
            .expect("handshake completed within 5000ms");
    assert_eq!(token_a, token_b);

    assert_eq!(channel_a.get_type().await, "ENCRYPTED_BLUETOOTH");
    assert_eq!(channel_b.get_type().await, "ENCRYPTED_BLUETOOTH");

    channel_a.write(b"data message").await.unwrap();
    let got = channel_b.read().await.unwrap();
    assert_eq!(got, Bytes::from_static(b"data message"));

    let capture_a = monitor_a.captured();
    let capture_b = monitor_b.captured();
    assert!(!contains_subsequence(&capture_a, b"data message"));
    assert!(!contains_subsequence(&capture_b, b"data message"));
}

fn contains_subsequence(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[tokio::test]
async fn s4_pause_resume() {
    let (channel_a, channel_b) = direct_channel_pair(Medium::WifiLan);
    assert_eq!(channel_a.get_type().await, "WIFI_LAN");

    channel_a.write(b"data message").await.unwrap();
    channel_b.read().await.unwrap();

    channel_a.pause();
    let writer = channel_a.clone();
    let write_handle = tokio::spawn(async move { writer.write(b"more data").await });
    let reader = channel_b.clone();
    let read_handle = tokio::spawn(async move { reader.read().await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!write_handle.is_finished());
    assert!(!read_handle.is_finished());

    channel_a.resume();

    let resolved = tokio::time::timeout(Duration::from_millis(500), async {
        write_handle.await.unwrap().unwrap();
        read_handle.await.unwrap().unwrap()
    })
    .await
    .expect("write/read resumed within 500ms");
    assert_eq!(resolved, Bytes::from_static(b"more data"));
}

#[tokio::test]
async fn s5_read_after_writer_close_fails() {
    let (reader, mut writer) = Pipe::channel(8);
    writer.close().await.unwrap();
    let channel = new_channel(
        "endpoint_a",
        SimpleBehavior(Medium::Ble),
        Box::new(reader),
        Box::new(Pipe::channel(1).1),
        5 * 1024 * 1024,
    );
    let err = channel.read().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[tokio::test]
async fn s6_handshake_failure_invokes_on_failure_once() {
    // channel_a's peer never responds: its input is a reader whose
    // writer half nobody ever feeds.
    let (reader_a, _writer_a) = Pipe::channel(8);
    let channel_a = new_channel(
        "endpoint_a",
        SimpleBehavior(Medium::Ble),
        Box::new(reader_a),
        Box::new(Pipe::channel(8).1),
        5 * 1024 * 1024,
    );

    let failure_count = Arc::new(AtomicUsize::new(0));
    let counter = failure_count.clone();
    let done = HandshakeRunner::start_client(
        "endpoint_a".to_string(),
        channel_a,
        Duration::from_millis(200),
        Box::new(|_id, _context, _token, _raw| Box::pin(async move {})),
        Box::new(move |_id, _channel| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }),
    );

    tokio::time::timeout(Duration::from_secs(5), done)
        .await
        .expect("handshake runner reported completion within 5s")
        .unwrap();
    assert_eq!(failure_count.load(Ordering::SeqCst), 1);
}
