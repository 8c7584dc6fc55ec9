//! HTTP-level tests for the clonepilot router.
//!
//! Sessions run against the scripted remote UI, so no browser is needed and
//! the paused tokio clock makes settle waits instant.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use clonepilot_core::browser::mock::{ScriptedLauncher, ScriptedUi};
use clonepilot_core::browser::SessionLauncher;
use clonepilot_core::PlatformProfile;
use clonepilot_server::{build_engine, build_router, ServerConfig};

struct TestApp {
    router: Router,
    launcher: Arc<ScriptedLauncher>,
    dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        screenshots_dir: dir.path().join("screenshots"),
        ..ServerConfig::default()
    };
    let ui = ScriptedUi::builder(PlatformProfile::default()).build();
    let launcher = Arc::new(ScriptedLauncher::new(ui));
    let state = build_engine(&config, launcher.clone() as Arc<dyn SessionLauncher>).unwrap();
    TestApp {
        router: build_router(&config, state),
        launcher,
        dir,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let response = app.router.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"status": "ok", "message": "Server is running"})
    );
}

#[tokio::test]
async fn test_stream_requires_url() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(get("/api/clone-stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "URL is required"})
    );
    assert_eq!(app.launcher.launches(), 0);
}

#[tokio::test]
async fn test_stream_rejects_malformed_url() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(get("/api/clone-stream?url=not%20a%20url"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "Invalid URL format"})
    );
    assert_eq!(app.launcher.launches(), 0);
}

#[tokio::test]
async fn test_post_clone_points_at_stream() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/clone")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"url":"https://example.com/?q=1&r=2"}"#))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body["streamUrl"],
        "/api/clone-stream?url=https%3A%2F%2Fexample.com%2F%3Fq%3D1%26r%3D2"
    );
    assert!(body["message"].as_str().unwrap().contains("/api/clone-stream"));
    assert_eq!(app.launcher.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stream_runs_session_to_completion() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(get(
            "/api/clone-stream?url=https%3A%2F%2Fexample.com&prompt=Keep%20it%20minimal",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect();

    assert_eq!(events.first().unwrap()["type"], "status");
    assert_eq!(events.first().unwrap()["message"], "Starting clone process...");
    assert!(events
        .iter()
        .any(|e| e["message"] == "Adding custom instructions..."));
    assert!(events.iter().any(|e| e["type"] == "preview_ready"));

    let last = events.last().unwrap();
    assert_eq!(last["type"], "complete");
    assert_eq!(last["success"], true);
    assert_eq!(last["publishedUrl"], "https://mock-site.dev.animaapp.io");
    assert!(last["previewScreenshot"]
        .as_str()
        .unwrap()
        .starts_with("/screenshots/preview-"));
    assert_eq!(
        events.iter().filter(|e| e["type"] == "complete" || e["type"] == "error").count(),
        1
    );
    assert_eq!(app.launcher.launches(), 1);
}

#[tokio::test]
async fn test_screenshots_are_served() {
    let app = test_app();
    std::fs::write(
        app.dir.path().join("screenshots").join("preview-1.png"),
        b"\x89PNG",
    )
    .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get("/screenshots/preview-1.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let missing = app
        .router
        .clone()
        .oneshot(get("/screenshots/nope.png"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
