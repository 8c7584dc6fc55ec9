//! clonepilot core — transport-agnostic engine that drives a remote
//! AI page-builder through a real browser.
//!
//! A session loads the platform, submits a target URL (plus optional
//! instructions), signs in if asked to, watches generation progress, captures
//! the preview and tries to publish it. Progress is reported as an ordered
//! stream of [`ProgressEvent`]s ending in exactly one `complete` or `error`.
//!
//! This crate has **no HTTP framework dependency** by default, so it can back:
//!
//! - the HTTP server (via `clonepilot-server`)
//! - the `clonepilot run` CLI command
//! - tests, through the scripted [`browser::mock::ScriptedUi`]
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod artifacts;
pub mod browser;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod publish;
pub mod signals;
pub mod state;
pub mod workflow;

// Convenience re-exports
pub use config::{BrowserConfig, Credentials, WorkflowConfig};
pub use error::{ServerError, UiError, WorkflowError};
pub use events::{ProgressChannel, ProgressEvent, ProgressReceiver};
pub use platform::PlatformProfile;
pub use state::{Engine, EngineContext};
pub use workflow::{run_session, Outcome, SessionReport, SessionRequest};
