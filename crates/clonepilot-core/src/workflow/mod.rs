//! Workflow — one clone session from request to terminal event.
//!
//! ```text
//! Init → Navigated → Submitted → (AuthChallenged → Authenticated → Resubmitted)
//!      → Monitoring → PreviewReady → (EditsSettling) → (ContentLoading)
//!      → PreviewCaptured → (Publishing → Published | PublishFailed) → Complete
//! ```
//!
//! Any phase may instead end in `Failed`.

pub mod driver;

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::artifacts::ArtifactRecord;
use crate::error::{ServerError, WorkflowError};
use crate::events::{steps, ProgressChannel, ProgressEvent};
use crate::state::EngineContext;

pub use driver::WorkflowDriver;

/// Validated input of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub target_url: String,
    /// `None` when absent or blank.
    pub instructions: Option<String>,
}

impl SessionRequest {
    pub fn new(target_url: &str, instructions: Option<&str>) -> Result<Self, ServerError> {
        let target_url = target_url.trim();
        if target_url.is_empty() {
            return Err(ServerError::BadRequest("URL is required".to_string()));
        }
        url::Url::parse(target_url)
            .map_err(|_| ServerError::BadRequest("Invalid URL format".to_string()))?;

        let instructions = instructions
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            target_url: target_url.to_string(),
            instructions,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Navigated,
    Submitted,
    AuthChallenged,
    Authenticated,
    Resubmitted,
    Monitoring,
    PreviewReady,
    EditsSettling,
    ContentLoading,
    PreviewCaptured,
    Publishing,
    Published,
    PublishFailed,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }

    /// Phases only move forward; `Published` and `PublishFailed` exclude each
    /// other, and any live phase may fail.
    pub fn can_advance_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Phase::Failed) => true,
            (Phase::Published, Phase::PublishFailed) => false,
            _ => next > self,
        }
    }
}

/// Phase history of one session.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    history: Vec<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            history: vec![Phase::Init],
        }
    }
}

impl PhaseTracker {
    pub fn current(&self) -> Phase {
        self.history.last().copied().unwrap_or(Phase::Init)
    }

    /// Returns false (and records nothing) for an out-of-order transition.
    pub fn advance(&mut self, next: Phase) -> bool {
        let current = self.current();
        if !current.can_advance_to(next) {
            tracing::error!("Refusing phase transition {:?} -> {:?}", current, next);
            return false;
        }
        tracing::debug!("Phase {:?} -> {:?}", current, next);
        self.history.push(next);
        true
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Phase> {
        self.history
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Published {
        url: String,
        artifacts: ArtifactRecord,
    },
    PreviewOnly {
        artifacts: ArtifactRecord,
        /// Whether the result page was reached before the monitoring ceiling.
        preview_reached: bool,
    },
    Failed {
        reason: String,
        details: String,
    },
}

impl Outcome {
    pub fn failed(err: &WorkflowError) -> Self {
        Outcome::Failed {
            reason: err.to_string(),
            details: err.details(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }

    pub fn artifacts(&self) -> Option<&ArtifactRecord> {
        match self {
            Outcome::Published { artifacts, .. } | Outcome::PreviewOnly { artifacts, .. } => {
                Some(artifacts)
            }
            Outcome::Failed { .. } => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Outcome::Published { .. } => "Landing page generated and published successfully!",
            Outcome::PreviewOnly {
                preview_reached: true,
                ..
            } => "Landing page generated! Publish could not be completed, preview shown below.",
            Outcome::PreviewOnly { .. } => {
                "Generation process completed (check platform for results)"
            }
            Outcome::Failed { .. } => "Failed to clone website",
        }
    }

    /// The terminal event for this outcome.
    pub fn to_event(&self) -> ProgressEvent {
        match self {
            Outcome::Published { url, artifacts } => ProgressEvent::Complete {
                success: true,
                screenshot: artifacts.final_screenshot.clone(),
                preview_screenshot: artifacts.preview_screenshot.clone(),
                edit_url: artifacts.edit_url.clone(),
                published_url: Some(url.clone()),
                message: self.message().to_string(),
            },
            Outcome::PreviewOnly { artifacts, .. } => ProgressEvent::Complete {
                success: true,
                screenshot: artifacts.final_screenshot.clone(),
                preview_screenshot: artifacts.preview_screenshot.clone(),
                edit_url: artifacts.edit_url.clone(),
                published_url: None,
                message: self.message().to_string(),
            },
            Outcome::Failed { reason, details } => ProgressEvent::Error {
                error: format!("{}: {}", self.message(), reason),
                details: details.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: Outcome,
    pub phases: Vec<Phase>,
}

/// Run one session end to end: launch a browser, drive the workflow, emit the
/// terminal event, linger, release the browser.
///
/// The channel is dropped on return, which ends the caller's stream.
pub async fn run_session(
    request: SessionRequest,
    ctx: Arc<EngineContext>,
    channel: ProgressChannel,
) -> SessionReport {
    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session_id, url = %request.target_url);
    run_session_inner(session_id, request, ctx, channel)
        .instrument(span)
        .await
}

async fn run_session_inner(
    session_id: Uuid,
    request: SessionRequest,
    ctx: Arc<EngineContext>,
    mut channel: ProgressChannel,
) -> SessionReport {
    tracing::info!("🚀 Starting clone process for: {}", request.target_url);
    channel.emit(ProgressEvent::status(
        "Starting clone process...",
        steps::STARTED,
    ));

    let ui = match ctx.launcher.launch().await {
        Ok(ui) => ui,
        Err(e) => {
            tracing::error!("❌ Browser launch failed: {}", e);
            let err = WorkflowError::Ui {
                step: "launch browser",
                source: e,
            };
            let outcome = Outcome::failed(&err);
            channel.emit(outcome.to_event());
            return SessionReport {
                session_id,
                outcome,
                phases: vec![Phase::Init, Phase::Failed],
            };
        }
    };

    let (outcome, phases) = WorkflowDriver::new(ui.as_ref(), &ctx, &request, &mut channel)
        .run()
        .await;

    channel.emit(outcome.to_event());

    if outcome.is_success() && !ctx.workflow.linger.is_zero() {
        tracing::info!(
            "🎉 Process complete. Browser stays open for {}s",
            ctx.workflow.linger.as_secs()
        );
        linger(&ctx, &channel).await;
    }

    if let Err(e) = ui.close().await {
        tracing::warn!("⚠️ Failed to close browser: {}", e);
    }
    tracing::info!("Session finished (success: {})", outcome.is_success());

    SessionReport {
        session_id,
        outcome,
        phases,
    }
}

/// Idle before closing the browser; cut short when the caller is gone and
/// `cancel_on_disconnect` is set.
async fn linger(ctx: &EngineContext, channel: &ProgressChannel) {
    if !ctx.workflow.cancel_on_disconnect {
        tokio::time::sleep(ctx.workflow.linger).await;
        return;
    }
    let deadline = tokio::time::Instant::now() + ctx.workflow.linger;
    while tokio::time::Instant::now() < deadline {
        if channel.is_closed() {
            tracing::info!("Caller disconnected, closing browser early");
            return;
        }
        let step = ctx.workflow.poll_interval.min(deadline - tokio::time::Instant::now());
        tokio::time::sleep(step).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        let err = SessionRequest::new("", None).unwrap_err();
        assert_eq!(err.to_string(), "URL is required");

        let err = SessionRequest::new("not a url", None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid URL format");

        let req = SessionRequest::new(" https://example.com ", Some("   ")).unwrap();
        assert_eq!(req.target_url, "https://example.com");
        assert_eq!(req.instructions, None);

        let req = SessionRequest::new("https://example.com", Some(" dark theme ")).unwrap();
        assert_eq!(req.instructions.as_deref(), Some("dark theme"));
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Init.can_advance_to(Phase::Navigated));
        assert!(Phase::Submitted.can_advance_to(Phase::Monitoring));
        assert!(!Phase::Monitoring.can_advance_to(Phase::Submitted));
        assert!(!Phase::Published.can_advance_to(Phase::PublishFailed));
        assert!(Phase::PublishFailed.can_advance_to(Phase::Complete));
        assert!(Phase::Monitoring.can_advance_to(Phase::Failed));
        assert!(!Phase::Complete.can_advance_to(Phase::Failed));
    }

    #[test]
    fn test_tracker_rejects_regression() {
        let mut tracker = PhaseTracker::default();
        assert!(tracker.advance(Phase::Navigated));
        assert!(tracker.advance(Phase::Submitted));
        assert!(!tracker.advance(Phase::Navigated));
        assert_eq!(tracker.current(), Phase::Submitted);
        assert_eq!(
            tracker.history(),
            &[Phase::Init, Phase::Navigated, Phase::Submitted]
        );
    }

    #[test]
    fn test_outcome_events() {
        let artifacts = ArtifactRecord {
            final_screenshot: Some("/screenshots/clone-final-1.png".to_string()),
            ..ArtifactRecord::default()
        };
        let generic = Outcome::PreviewOnly {
            artifacts,
            preview_reached: false,
        };
        match generic.to_event() {
            ProgressEvent::Complete {
                success,
                published_url,
                message,
                ..
            } => {
                assert!(success);
                assert_eq!(published_url, None);
                assert_eq!(
                    message,
                    "Generation process completed (check platform for results)"
                );
            }
            other => panic!("unexpected event {:?}", other),
        }

        let failed = Outcome::Failed {
            reason: "boom".to_string(),
            details: "trace".to_string(),
        };
        match failed.to_event() {
            ProgressEvent::Error { error, .. } => {
                assert_eq!(error, "Failed to clone website: boom")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
