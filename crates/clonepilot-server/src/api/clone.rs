//! Clone API - /api/clone
//!
//! POST /api/clone - Non-streaming fallback; points the caller at the SSE endpoint

use axum::{routing::post, Json, Router};
use serde::Deserialize;

use clonepilot_core::{ServerError, SessionRequest};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(clone_redirect))
}

#[derive(Debug, Deserialize)]
struct CloneRequest {
    url: Option<String>,
}

async fn clone_redirect(
    Json(body): Json<CloneRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let request = SessionRequest::new(body.url.as_deref().unwrap_or(""), None)?;

    Ok(Json(serde_json::json!({
        "message": "Please use the streaming endpoint: GET /api/clone-stream?url=<your-url>",
        "streamUrl": format!(
            "/api/clone-stream?url={}",
            urlencoding::encode(&request.target_url)
        ),
    })))
}
