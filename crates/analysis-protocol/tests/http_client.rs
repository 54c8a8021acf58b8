//! HTTP client tests against a local analyzer stub

use std::collections::HashMap;
use std::net::SocketAddr;

use analysis_protocol::{AnalysisClient, DetectionStatus, ProtocolError, Thresholds};
use axum::body::Bytes;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn analyze_stub(Query(params): Query<HashMap<String, String>>, body: Bytes) -> (StatusCode, Json<Value>) {
    let body = String::from_utf8_lossy(&body);
    if !body.contains("name=\"file\"") {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "missing file"})));
    }
    let overridden = params.contains_key("ear_threshold") && params.contains_key("mar_threshold");
    (
        StatusCode::OK,
        Json(json!({
            "ear": 0.21,
            "mar": 0.82,
            "drowsy": true,
            "yawning": overridden,
            "annotated_image": "data:image/png;base64,iVBORw0KGgo="
        })),
    )
}

fn analyzer_stub() -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/status",
            get(|| async { Json(json!({"ear": 0.3, "mar": 0.1, "drowsy": false, "yawning": false})) }),
        )
        .route("/analyze", post(analyze_stub))
}

#[tokio::test]
async fn test_analyze_image_uploads_multipart() {
    let addr = serve(analyzer_stub()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let result = client
        .analyze_image(vec![0xFF, 0xD8, 0xFF, 0xD9], "face.jpg", None)
        .await
        .unwrap();
    assert!(result.drowsy);
    assert!(!result.yawning);
    assert!(result.annotated_image.is_some());
    assert_eq!(result.status(), DetectionStatus::Drowsy);
}

#[tokio::test]
async fn test_analyze_image_sends_threshold_overrides() {
    let addr = serve(analyzer_stub()).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let result = client
        .analyze_image(vec![1, 2, 3], "face.png", Some(Thresholds::default()))
        .await
        .unwrap();
    assert_eq!(result.status(), DetectionStatus::Critical);
}

#[tokio::test]
async fn test_status_and_health() {
    let addr = serve(analyzer_stub()).await;
    let client = AnalysisClient::new(&format!("http://{}/", addr)).unwrap();

    client.health().await.unwrap();
    let status = client.status().await.unwrap();
    assert_eq!(status.status(), DetectionStatus::Normal);
    assert!(status.annotated_image.is_none());
}

#[tokio::test]
async fn test_non_success_status_is_surfaced() {
    let app = Router::new().route(
        "/analyze",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let addr = serve(app).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    let err = client.analyze_image(vec![1], "face.jpg", None).await.unwrap_err();
    match err {
        ProtocolError::AnalysisRequestFailed { status, message } => {
            assert_eq!(status, 500);
            assert!(message.starts_with("Analysis failed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_body_is_malformed() {
    let app = Router::new().route("/status", get(|| async { "<html>" }));
    let addr = serve(app).await;
    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();

    assert!(matches!(
        client.status().await,
        Err(ProtocolError::MalformedMessage(_))
    ));
}

#[tokio::test]
async fn test_unreachable_server_reports_status_zero() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = AnalysisClient::new(&format!("http://{}", addr)).unwrap();
    let err = client.health().await.unwrap_err();
    assert_eq!(err.status(), Some(0));
}
