//! One-shot analysis against a local HTTP analyzer stub

use std::net::SocketAddr;
use std::sync::Mutex;

use alerting::{AlertPattern, AlertRenderer};
use analysis_protocol::{AnalysisClient, ProtocolError};
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use monitor::analyze_once;
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingRenderer {
    played: Mutex<Vec<AlertPattern>>,
}

impl AlertRenderer for RecordingRenderer {
    fn render(&self, pattern: AlertPattern) {
        self.played.lock().unwrap().push(pattern);
    }
}

async fn analyzer_replying(reply: Value) -> SocketAddr {
    let app = Router::new().route(
        "/analyze",
        post(move |body: Bytes| {
            let reply = reply.clone();
            async move {
                assert!(!body.is_empty());
                Json(reply)
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_alerting_result_plays_its_pattern() {
    let addr = analyzer_replying(json!({
        "ear": 0.12, "mar": 0.85, "drowsy": true, "yawning": true,
        "annotated_image": "data:image/jpeg;base64,AAAA"
    }))
    .await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();
    let renderer = RecordingRenderer::default();

    let report = analyze_once(&client, vec![0xFF, 0xD8, 0xFF, 0xD9], "face.jpg", None, &renderer)
        .await
        .unwrap();

    assert_eq!(report.pattern, AlertPattern::Critical);
    assert!(report.result.annotated_image.is_some());
    assert_eq!(*renderer.played.lock().unwrap(), vec![AlertPattern::Critical]);
}

#[tokio::test]
async fn test_normal_result_plays_success() {
    let addr = analyzer_replying(json!({"ear": 0.32, "mar": 0.3, "drowsy": false, "yawning": false})).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();
    let renderer = RecordingRenderer::default();

    let report = analyze_once(&client, vec![1, 2, 3], "face.jpg", None, &renderer)
        .await
        .unwrap();

    assert_eq!(report.pattern, AlertPattern::Success);
    assert_eq!(*renderer.played.lock().unwrap(), vec![AlertPattern::Success]);
}

#[tokio::test]
async fn test_failed_request_plays_nothing() {
    let app = Router::new().route("/analyze", post(|| async { StatusCode::BAD_GATEWAY }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();
    let renderer = RecordingRenderer::default();
    let err = analyze_once(&client, vec![1, 2, 3], "face.jpg", None, &renderer)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
    assert!(renderer.played.lock().unwrap().is_empty());

    let empty = analyze_once(&client, Vec::new(), "face.jpg", None, &renderer)
        .await
        .unwrap_err();
    assert!(matches!(empty, ProtocolError::AnalysisRequestFailed { status: 400, .. }));
}
