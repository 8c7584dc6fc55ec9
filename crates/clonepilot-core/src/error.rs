//! Error types for the clonepilot engine.
//!
//! `ServerError` is what request-facing code returns. When the `axum` feature
//! is enabled, it also implements `IntoResponse` so it can be used directly as
//! an axum handler error type.
//!
//! `UiError` is the single failure shape of every remote UI action, and
//! `WorkflowError` is the fatal subset that ends a session early.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure of a single remote UI action.
#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("Timeout after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    #[error("No element matches {0}")]
    NotFound(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser session is closed")]
    Closed,
}

impl UiError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        UiError::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, UiError::Timeout { .. })
    }
}

/// Failures that abort a session and produce the `error` event.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("could not load {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: UiError,
    },

    #[error("{step}: {source}")]
    Ui {
        step: &'static str,
        #[source]
        source: UiError,
    },

    #[error("login required but no credentials are configured (set ANIMA_EMAIL and ANIMA_PASSWORD)")]
    Credentials,

    #[error("caller disconnected")]
    Disconnected,
}

impl WorkflowError {
    pub fn ui(step: &'static str) -> impl FnOnce(UiError) -> WorkflowError {
        move |source| WorkflowError::Ui { step, source }
    }

    /// Error chain rendered for the `details` field of the `error` event.
    pub fn details(&self) -> String {
        let mut details = format!("{:?}", self);
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            details.push_str("\ncaused by: ");
            details.push_str(&err.to_string());
            source = err.source();
        }
        details
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
