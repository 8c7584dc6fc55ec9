//! Remote UI adapter — intent-level actions against a controllable browser.
//!
//! The workflow driver only ever talks to [`RemoteUi`]. Everything that knows
//! about how an element is actually found (roles, accessible names, CSS, the
//! DevTools protocol) lives below this module boundary.
//!
//! ```text
//! WorkflowDriver ──► RemoteUi (trait) ──► CdpPage ──► CdpConnection ──► Chrome
//!                                    └──► ScriptedUi (tests)
//! ```

pub mod cdp;
pub mod launcher;
pub mod mock;
pub mod page;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UiError;

pub use cdp::CdpConnection;
pub use launcher::ChromeLauncher;
pub use page::CdpPage;

/// How an element on the remote page is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum LocatorKind {
    /// ARIA role, optionally narrowed by an accessible-name substring (case-insensitive).
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Innermost element whose text contains `text`.
    Text { text: String },
    /// `data-testid` attribute.
    TestId { id: String },
    /// CSS selector, optionally narrowed to elements whose text contains `has_text`.
    Css {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        has_text: Option<String>,
    },
}

/// A locator plus the index of the match to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(flatten)]
    pub kind: LocatorKind,
    #[serde(default)]
    pub nth: usize,
}

impl Locator {
    pub fn role(role: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Role {
            role: role.into(),
            name: None,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Text { text: text.into() })
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::TestId { id: id.into() })
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_kind(LocatorKind::Css {
            selector: selector.into(),
            has_text: None,
        })
    }

    fn from_kind(kind: LocatorKind) -> Self {
        Self { kind, nth: 0 }
    }

    /// Narrow a role locator by accessible name. No-op for other kinds.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        if let LocatorKind::Role { name: slot, .. } = &mut self.kind {
            *slot = Some(name.into());
        }
        self
    }

    /// Narrow a CSS locator to elements containing `text`. No-op for other kinds.
    pub fn has_text(mut self, text: impl Into<String>) -> Self {
        if let LocatorKind::Css { has_text, .. } = &mut self.kind {
            *has_text = Some(text.into());
        }
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = index;
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LocatorKind::Role { role, name: None } => write!(f, "role={}", role)?,
            LocatorKind::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name=\"{}\"]", role, name)?,
            LocatorKind::Text { text } => write!(f, "text=\"{}\"", text)?,
            LocatorKind::TestId { id } => write!(f, "testid={}", id)?,
            LocatorKind::Css {
                selector,
                has_text: None,
            } => write!(f, "{}", selector)?,
            LocatorKind::Css {
                selector,
                has_text: Some(text),
            } => write!(f, "{}:has-text(\"{}\")", selector, text)?,
        }
        if self.nth > 0 {
            write!(f, " >> nth={}", self.nth)?;
        }
        Ok(())
    }
}

/// Condition for [`RemoteUi::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Visible,
    Hidden,
}

/// Rectangle in CSS pixels, page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Intent-level actions on one remote page.
///
/// Every method reports failure as [`UiError`]; implementations apply their
/// own actionability wait before clicking or filling.
#[async_trait]
pub trait RemoteUi: Send + Sync {
    /// Load `url` and wait until the DOM is parsed.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), UiError>;

    async fn current_url(&self) -> Result<String, UiError>;

    async fn click(&self, locator: &Locator) -> Result<(), UiError>;

    /// Replace the content of an editable element with `text`.
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), UiError>;

    /// Send `text` as individual key presses to the element.
    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), UiError>;

    async fn is_visible(&self, locator: &Locator) -> Result<bool, UiError>;

    async fn wait_for(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), UiError>;

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, UiError>;

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<Rect>, UiError>;

    /// `textContent` of every element matching `selector`, in document order.
    async fn scrape_texts(&self, selector: &str) -> Result<Vec<String>, UiError>;

    /// Write a PNG of the viewport (or of `clip`) to `path`.
    async fn screenshot(&self, path: &Path, clip: Option<Rect>) -> Result<(), UiError>;

    /// Release the underlying browser. Safe to call more than once.
    async fn close(&self) -> Result<(), UiError>;
}

/// Creates one exclusively-owned [`RemoteUi`] per session.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RemoteUi>, UiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        let login = Locator::role("button").with_name("Log in");
        assert_eq!(login.to_string(), "role=button[name=\"Log in\"]");

        let second = Locator::role("paragraph").nth(1);
        assert_eq!(second.to_string(), "role=paragraph >> nth=1");

        let publish = Locator::css("button.w-full").has_text("Publish");
        assert_eq!(publish.to_string(), "button.w-full:has-text(\"Publish\")");
    }

    #[test]
    fn test_builders_ignore_mismatched_kind() {
        let text = Locator::text("LIVE!").with_name("ignored").has_text("ignored");
        assert_eq!(text, Locator::text("LIVE!"));
    }

    #[test]
    fn test_locator_yaml_shape() {
        let yaml = r#"
by: role
role: textbox
name: "Paste your link here"
"#;
        let locator: Locator = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(locator, Locator::role("textbox").with_name("Paste your link here"));

        let yaml = "by: css\nselector: iframe\nnth: 2\n";
        let locator: Locator = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(locator, Locator::css("iframe").nth(2));
    }

    #[test]
    fn test_rect_area() {
        let rect = Rect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 0.0,
        };
        assert!(!rect.has_area());
    }
}
