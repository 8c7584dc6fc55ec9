//! Clone Stream API - /api/clone-stream
//!
//! GET /api/clone-stream?url=<target>&prompt=<instructions> - Run one clone
//! session and stream its progress events over SSE

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio_stream::StreamExt;

use clonepilot_core::{run_session, ProgressChannel, ServerError, SessionRequest};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(clone_stream))
}

#[derive(Debug, Deserialize)]
struct CloneStreamQuery {
    url: Option<String>,
    #[serde(alias = "instructions")]
    prompt: Option<String>,
}

async fn clone_stream(
    State(state): State<AppState>,
    Query(query): Query<CloneStreamQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ServerError> {
    // Rejected requests never reach the launcher.
    let request = SessionRequest::new(query.url.as_deref().unwrap_or(""), query.prompt.as_deref())?;

    let (channel, rx) = ProgressChannel::new();
    tokio::spawn(run_session(request, state, channel));

    // The channel is dropped once the session has released its browser,
    // which ends this stream.
    let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
