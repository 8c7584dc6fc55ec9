//! Progress Channel — ordered, one-way events from a session to its caller.
//!
//! Emission never blocks the driver: the channel is unbounded and a gone
//! receiver just means the event is dropped. Exactly one terminal event
//! (`complete` or `error`) is delivered; anything emitted after it is dropped.

use serde::Serialize;
use tokio::sync::mpsc;

/// Step indices reported alongside status messages.
pub mod steps {
    pub const STARTED: u32 = 1;
    pub const COMPOSE: u32 = 7;
    pub const PROGRESS: u32 = 16;
    pub const SUBMITTED: u32 = 16;
    pub const SUBMITTED_WITH_INSTRUCTIONS: u32 = 18;
    pub const MONITORING: u32 = 17;
    pub const MONITORING_WITH_INSTRUCTIONS: u32 = 19;
    pub const PUBLISH_ISSUE: u32 = 19;
    pub const EDITS: u32 = 20;
    pub const PREVIEW: u32 = 21;
    pub const PUBLISH_RETRY: u32 = 22;
    pub const PUBLISHING: u32 = 23;
    pub const PUBLISH_WAIT: u32 = 24;
    pub const PUBLISH_DETAILS: u32 = 25;
    pub const PUBLISH_RESULT: u32 = 27;
}

/// One record on the progress stream, serialized as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        message: String,
        step: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    Progress {
        message: String,
        /// `null` when only a milestone phrase was seen.
        progress: Option<u8>,
        step: u32,
    },
    PreviewReady {
        #[serde(rename = "previewScreenshot")]
        preview_screenshot: String,
        message: String,
    },
    Complete {
        success: bool,
        screenshot: Option<String>,
        #[serde(rename = "previewScreenshot")]
        preview_screenshot: Option<String>,
        #[serde(rename = "editUrl")]
        edit_url: Option<String>,
        #[serde(rename = "publishedUrl")]
        published_url: Option<String>,
        message: String,
    },
    Error {
        error: String,
        details: String,
    },
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>, step: u32) -> Self {
        ProgressEvent::Status {
            message: message.into(),
            step,
            progress: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Status { .. } => "status",
            ProgressEvent::Progress { .. } => "progress",
            ProgressEvent::PreviewReady { .. } => "preview_ready",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "error": e.to_string(), "details": "" })
                .to_string()
        })
    }
}

/// Receiving half handed to the transport.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Sink for status lines, implemented by the channel and by test recorders.
pub trait StatusSink: Send {
    fn status(&mut self, message: String, step: u32);
}

pub struct ProgressChannel {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    finished: bool,
}

impl ProgressChannel {
    pub fn new() -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                finished: false,
            },
            rx,
        )
    }

    /// Push one event. Returns whether it was handed to a live receiver.
    pub fn emit(&mut self, event: ProgressEvent) -> bool {
        if self.finished {
            tracing::debug!("Dropping {} event emitted after terminal event", event.kind());
            return false;
        }
        if event.is_terminal() {
            self.finished = true;
        }
        self.tx.send(event).is_ok()
    }

    /// True once the caller has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl StatusSink for ProgressChannel {
    fn status(&mut self, message: String, step: u32) {
        self.emit(ProgressEvent::Status {
            message,
            step,
            progress: None,
        });
    }
}
