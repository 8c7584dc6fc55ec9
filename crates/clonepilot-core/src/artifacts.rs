//! Artifact Capturer — timestamped screenshots under one directory.
//!
//! Files are named `<kind>-<epoch-millis>.png` and handed back to callers as
//! paths under a public prefix (default `/screenshots`).

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::browser::{Locator, RemoteUi};
use crate::error::UiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Progress,
    Preview,
    PublishSheet,
    Published,
    Final,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Progress => "progress",
            ArtifactKind::Preview => "preview",
            ArtifactKind::PublishSheet => "publish-sheet",
            ArtifactKind::Published => "published",
            ArtifactKind::Final => "clone-final",
        }
    }
}

/// Everything a session produced, built up phase by phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Public paths of every screenshot taken, in capture order.
    pub screenshot_paths: Vec<String>,
    pub preview_screenshot: Option<String>,
    pub final_screenshot: Option<String>,
    pub edit_url: Option<String>,
    pub published_url: Option<String>,
}

impl ArtifactRecord {
    pub fn push_screenshot(&mut self, path: String) {
        self.screenshot_paths.push(path);
    }

    pub fn latest_screenshot(&self) -> Option<&str> {
        self.screenshot_paths.last().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    url_prefix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    pub fn file_name(kind: ArtifactKind) -> String {
        format!(
            "{}-{}.png",
            kind.as_str(),
            chrono::Utc::now().timestamp_millis()
        )
    }

    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.url_prefix, file_name)
    }

    /// Viewport screenshot. Returns the public path.
    pub async fn capture(&self, ui: &dyn RemoteUi, kind: ArtifactKind) -> Result<String, UiError> {
        let file_name = Self::file_name(kind);
        ui.screenshot(&self.dir.join(&file_name), None).await?;
        tracing::info!("📸 {} screenshot saved: {}", kind.as_str(), file_name);
        Ok(self.public_path(&file_name))
    }

    /// Screenshot clipped to `region` when its box resolves with a positive
    /// area, otherwise (or if the clipped capture fails) the whole viewport.
    pub async fn capture_region(
        &self,
        ui: &dyn RemoteUi,
        kind: ArtifactKind,
        region: &Locator,
    ) -> Result<String, UiError> {
        let file_name = Self::file_name(kind);
        let path = self.dir.join(&file_name);

        let clip = match ui.bounding_box(region).await {
            Ok(Some(rect)) if rect.has_area() => Some(rect),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("⚠️ Could not resolve {} for clipping: {}", region, e);
                None
            }
        };

        match clip {
            Some(rect) => match ui.screenshot(&path, Some(rect)).await {
                Ok(()) => tracing::info!("✅ {} captured from {}", kind.as_str(), region),
                Err(e) => {
                    tracing::warn!("⚠️ Clipped screenshot failed, using viewport: {}", e);
                    ui.screenshot(&path, None).await?;
                }
            },
            None => ui.screenshot(&path, None).await?,
        }

        Ok(self.public_path(&file_name))
    }
}
