//! Session lifecycle tests against a local WebSocket analyzer stub

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alerting::{AlertPattern, AlertRenderer, DebounceConfig};
use camera_capture::{CameraError, FrameStream, MediaSource, StillImageSource, VideoFrame};
use futures_util::{SinkExt, StreamExt};
use monitor::{CaptureSession, SessionOptions};
use stream_transport::{ConnectionState, TransportConfig};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[derive(Default)]
struct RecordingRenderer {
    played: Mutex<Vec<AlertPattern>>,
}

impl RecordingRenderer {
    fn played(&self) -> Vec<AlertPattern> {
        self.played.lock().unwrap().clone()
    }
}

impl AlertRenderer for RecordingRenderer {
    fn render(&self, pattern: AlertPattern) {
        self.played.lock().unwrap().push(pattern);
    }
}

/// Stub analyzer: waits for the first frame, answers with `replies`, then
/// keeps reading until the client leaves
async fn analyzer_stub(replies: Vec<serde_json::Value>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        while let Some(Ok(message)) = ws.next().await {
            if message.is_binary() {
                break;
            }
        }
        for reply in replies {
            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    });
    addr
}

fn still_source() -> StillImageSource {
    StillImageSource::from_frame(VideoFrame::filled(32, 24, [120, 110, 100]), 40)
}

fn options() -> SessionOptions {
    SessionOptions {
        target_fps: 20,
        transport: TransportConfig {
            connect_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn wait_for_latest(session: &CaptureSession, count_drowsy: bool) {
    let mut results = session.subscribe_results();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let done = matches!(&*results.borrow_and_update(), Some(r) if r.drowsy == count_drowsy);
            if done {
                return;
            }
            results.changed().await.unwrap();
        }
    })
    .await
    .expect("no analysis result arrived");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_session_alerts_and_tears_down() {
    let addr = analyzer_stub(vec![
        serde_json::json!({"ear": 0.31, "mar": 0.2, "drowsy": false, "yawning": false}),
        serde_json::json!({"ear": 0.12, "mar": 0.2, "drowsy": true, "yawning": false}),
        serde_json::json!({"ear": 0.11, "mar": 0.2, "drowsy": true, "yawning": false}),
    ])
    .await;

    let renderer = Arc::new(RecordingRenderer::default());
    let session = CaptureSession::start_streaming(
        still_source(),
        &format!("ws://{}/ws", addr),
        &options(),
        renderer.clone(),
    )
    .await
    .unwrap();

    assert_eq!(session.wait_connected().await, ConnectionState::Open);
    assert!(session.has_device());

    wait_for_latest(&session, true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(renderer.played(), vec![AlertPattern::Drowsy]);
    assert!(session.capture_stats().sent() >= 1);

    let stats = session.capture_stats();
    let mut state = session.subscribe_state();
    let report = session.teardown().await;

    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(report.timer_stopped);
    assert!(report.device_released);
    assert_eq!(report.transport_state, ConnectionState::Closed);
    assert_eq!(*state.borrow_and_update(), ConnectionState::Closed);

    let ticks = stats.ticks();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stats.ticks(), ticks);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_muted_session_still_tracks_results() {
    let addr = analyzer_stub(vec![
        serde_json::json!({"ear": 0.10, "mar": 0.9, "drowsy": true, "yawning": true}),
    ])
    .await;

    let renderer = Arc::new(RecordingRenderer::default());
    let options = SessionOptions {
        alerts: DebounceConfig {
            enabled: false,
            ..Default::default()
        },
        ..options()
    };
    let session = CaptureSession::start_streaming(
        still_source(),
        &format!("ws://{}/ws", addr),
        &options,
        renderer.clone(),
    )
    .await
    .unwrap();
    assert!(!session.alerts_enabled());
    assert_eq!(session.wait_connected().await, ConnectionState::Open);

    wait_for_latest(&session, true).await;
    assert!(renderer.played().is_empty());
    assert!(session.latest().unwrap().yawning);

    // Re-enabling does not replay the edge that arrived while muted.
    session.set_alerts_enabled(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(renderer.played().is_empty());

    assert!(session.teardown().await.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_teardown_after_failed_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let renderer = Arc::new(RecordingRenderer::default());
    let session = CaptureSession::start_streaming(
        still_source(),
        &format!("ws://{}/ws", addr),
        &options(),
        renderer,
    )
    .await
    .unwrap();

    assert_eq!(session.wait_connected().await, ConnectionState::Failed);
    assert!(session.last_error().is_some());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(session.capture_stats().sent(), 0);

    let report = session.teardown().await;
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(report.device_released);
    assert_eq!(report.transport_state, ConnectionState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_teardown_while_connecting_without_timeout() {
    // Accepts TCP but never answers the WebSocket handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
        let (_tcp, _) = listener.accept().await.unwrap();
        std::future::pending::<()>().await;
    });

    let options = SessionOptions {
        transport: TransportConfig {
            connect_timeout: None,
            ..Default::default()
        },
        ..options()
    };
    let renderer = Arc::new(RecordingRenderer::default());
    let session = tokio::time::timeout(
        Duration::from_secs(2),
        CaptureSession::start_streaming(still_source(), &format!("ws://{}/ws", addr), &options, renderer),
    )
    .await
    .expect("start blocked on the handshake")
    .unwrap();

    let mut state = session.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), async {
        while *state.borrow_and_update() != ConnectionState::Connecting {
            state.changed().await.unwrap();
        }
    })
    .await
    .expect("never started connecting");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.capture_stats().sent(), 0);

    let report = tokio::time::timeout(Duration::from_secs(2), session.teardown())
        .await
        .expect("teardown blocked on the handshake");
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(report.timer_stopped);
    assert!(report.device_released);
    assert_eq!(report.transport_state, ConnectionState::Closed);

    silent.abort();
}

struct StubbornSource;

struct StubbornStream {
    frame: VideoFrame,
}

impl MediaSource for StubbornSource {
    type Stream = StubbornStream;

    fn describe(&self) -> String {
        "stubborn".to_string()
    }

    fn open(self) -> Result<StubbornStream, CameraError> {
        Ok(StubbornStream {
            frame: VideoFrame::filled(8, 8, [0, 0, 0]),
        })
    }
}

impl FrameStream for StubbornStream {
    fn next_frame(&mut self) -> Result<VideoFrame, CameraError> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(self.frame.clone())
    }

    fn close(self) -> Result<(), CameraError> {
        Err(CameraError::Stream("device busy".to_string()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_release_does_not_skip_other_steps() {
    let addr = analyzer_stub(Vec::new()).await;

    let renderer = Arc::new(RecordingRenderer::default());
    let session = CaptureSession::start_streaming(
        StubbornSource,
        &format!("ws://{}/ws", addr),
        &options(),
        renderer,
    )
    .await
    .unwrap();
    assert_eq!(session.wait_connected().await, ConnectionState::Open);

    let report = session.teardown().await;
    assert!(!report.is_clean());
    assert!(report.errors[0].contains("device busy"));
    assert!(report.timer_stopped);
    assert!(report.device_released);
    assert_eq!(report.transport_state, ConnectionState::Closed);
}

#[tokio::test]
async fn test_missing_camera_is_fatal() {
    let renderer = Arc::new(RecordingRenderer::default());
    let result = CaptureSession::start_streaming(
        StillImageSource::from_path("/nonexistent/face.jpg", 10),
        "ws://127.0.0.1:9/ws",
        &options(),
        renderer,
    )
    .await;

    match result {
        Err(monitor::SessionError::Camera(CameraError::DeviceUnavailable(_))) => {}
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("session started without a camera"),
    }
}
