//! CdpPage — [`RemoteUi`] over one attached Chrome page target.
//!
//! Locators are resolved in the page by a single injected function
//! ([`LOCATE_JS`]) that understands roles, text, test ids and CSS; input is
//! delivered as trusted `Input.*` events so the remote application sees real
//! clicks and keystrokes.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::cdp::{CdpConnection, COMMAND_TIMEOUT};
use super::{Locator, Rect, RemoteUi, WaitState};
use crate::config::BrowserConfig;
use crate::error::UiError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(60);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const STALE_MARKER: &str = "__clonepilotStaleDocument";

/// Resolves `spec` (a serialized [`Locator`]) and performs `op` on the match.
/// Returns `{found: false}` or `{found: true, value}`.
const LOCATE_JS: &str = r##"(spec, op) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const isVisible = (el) => {
    const rect = el.getBoundingClientRect();
    if (rect.width <= 0 || rect.height <= 0) return false;
    const style = window.getComputedStyle(el);
    return style.visibility !== 'hidden' && style.display !== 'none';
  };
  const implicitRole = (el) => {
    const tag = el.tagName.toLowerCase();
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    if (tag === 'button') return 'button';
    if (tag === 'input') {
      if (['button', 'submit', 'reset', 'image'].includes(type)) return 'button';
      if (['text', 'email', 'password', 'search', 'url', 'tel'].includes(type)) return 'textbox';
      return null;
    }
    if (tag === 'textarea') return 'textbox';
    if (tag === 'a' && el.hasAttribute('href')) return 'link';
    if (tag === 'p') return 'paragraph';
    if (/^h[1-6]$/.test(tag)) return 'heading';
    if (el.isContentEditable && el.hasAttribute('contenteditable')) return 'textbox';
    return null;
  };
  const roleOf = (el) => (el.getAttribute('role') || '').split(' ')[0] || implicitRole(el);
  const nameOf = (el) => {
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {
      const text = labelledBy.split(/\s+/)
        .map((id) => norm((document.getElementById(id) || {}).textContent))
        .join(' ');
      if (norm(text)) return norm(text);
    }
    const direct = el.getAttribute('aria-label') || el.getAttribute('placeholder')
      || el.getAttribute('data-placeholder') || el.getAttribute('alt') || el.getAttribute('title');
    if (direct) return norm(direct);
    if (el.labels && el.labels.length) return norm(el.labels[0].textContent);
    return norm(el.innerText || el.textContent);
  };
  const all = () => Array.from(document.querySelectorAll('body *'));
  let matches = [];
  if (spec.by === 'role') {
    const wanted = spec.name ? spec.name.toLowerCase() : null;
    matches = all().filter((el) => roleOf(el) === spec.role
      && (wanted === null || nameOf(el).toLowerCase().includes(wanted)));
  } else if (spec.by === 'text') {
    matches = all().filter((el) => norm(el.textContent).includes(spec.text)
      && !Array.from(el.children).some((c) => norm(c.textContent).includes(spec.text)));
  } else if (spec.by === 'test_id') {
    matches = Array.from(document.querySelectorAll('[data-testid="' + CSS.escape(spec.id) + '"]'));
  } else if (spec.by === 'css') {
    matches = Array.from(document.querySelectorAll(spec.selector))
      .filter((el) => !spec.has_text || norm(el.textContent).includes(spec.has_text));
  }
  const el = matches[spec.nth || 0];
  if (!el) return { found: false };
  switch (op) {
    case 'visible':
      return { found: true, value: isVisible(el) };
    case 'text':
      return { found: true, value: el.textContent };
    case 'box': {
      const r = el.getBoundingClientRect();
      return { found: true, value: {
        x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height } };
    }
    case 'point': {
      el.scrollIntoView({ block: 'center', inline: 'center' });
      const r = el.getBoundingClientRect();
      return { found: true, value: { x: r.left + r.width / 2, y: r.top + r.height / 2 } };
    }
    case 'focus_select':
    case 'focus_end': {
      el.focus();
      const select = op === 'focus_select';
      if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) {
        try {
          if (select) el.select(); else el.setSelectionRange(el.value.length, el.value.length);
        } catch (e) { /* input types without selection support */ }
      } else {
        const range = document.createRange();
        range.selectNodeContents(el);
        if (!select) range.collapse(false);
        const selection = window.getSelection();
        selection.removeAllRanges();
        selection.addRange(range);
      }
      return { found: true, value: true };
    }
    case 'clear':
      if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) el.value = '';
      else el.textContent = '';
      el.dispatchEvent(new Event('input', { bubbles: true }));
      return { found: true, value: true };
    default:
      return { found: true, value: null };
  }
}"##;

pub struct CdpPage {
    conn: Arc<CdpConnection>,
    session_id: String,
    target_id: String,
    action_timeout: Duration,
    child: Mutex<Option<Child>>,
    profile: Mutex<Option<TempDir>>,
    closed: AtomicBool,
}

impl CdpPage {
    /// Open a fresh page target on `conn` and take ownership of the browser
    /// process and its profile directory.
    pub async fn attach(
        conn: Arc<CdpConnection>,
        child: Child,
        profile: TempDir,
        config: &BrowserConfig,
    ) -> Result<Self, UiError> {
        let created = conn
            .call("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = string_field(&created, "targetId")?;

        let attached = conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = string_field(&attached, "sessionId")?;

        let page = Self {
            conn,
            session_id,
            target_id,
            action_timeout: config.action_timeout,
            child: Mutex::new(Some(child)),
            profile: Mutex::new(Some(profile)),
            closed: AtomicBool::new(false),
        };

        page.command("Page.enable", json!({})).await?;
        page.command(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": config.viewport_width,
                "height": config.viewport_height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;

        tracing::debug!(
            "Attached to page target {} (session {})",
            page.target_id,
            page.session_id
        );
        Ok(page)
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value, UiError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(UiError::Closed);
        }
        self.conn
            .send(Some(&self.session_id), method, params, COMMAND_TIMEOUT)
            .await
    }

    async fn evaluate(&self, expression: String) -> Result<Value, UiError> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .pointer("/exception/description")
                .or_else(|| exception.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown script error");
            return Err(UiError::Protocol(format!("script error: {}", message)));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Run [`LOCATE_JS`]; `None` when nothing matches the locator.
    async fn locate(&self, locator: &Locator, op: &str) -> Result<Option<Value>, UiError> {
        let spec = serde_json::to_string(locator)
            .map_err(|e| UiError::Protocol(format!("serialize locator: {}", e)))?;
        let expression = format!("({})({}, {})", LOCATE_JS, spec, json!(op));
        let outcome = self.evaluate(expression).await?;

        if outcome.get("found").and_then(Value::as_bool) == Some(true) {
            Ok(Some(outcome.get("value").cloned().unwrap_or(Value::Null)))
        } else {
            Ok(None)
        }
    }

    async fn visible_now(&self, locator: &Locator) -> Result<bool, UiError> {
        Ok(self
            .locate(locator, "visible")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Wait until `locator` resolves to a visible element.
    async fn wait_actionable(&self, locator: &Locator) -> Result<(), UiError> {
        self.wait_for(locator, WaitState::Visible, self.action_timeout)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UiError::NotFound(locator.to_string())
                } else {
                    e
                }
            })
    }

    async fn mouse(&self, kind: &str, x: f64, y: f64) -> Result<(), UiError> {
        self.command(
            "Input.dispatchMouseEvent",
            json!({
                "type": kind,
                "x": x,
                "y": y,
                "button": "left",
                "clickCount": 1,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn key_press(&self, ch: char) -> Result<(), UiError> {
        let (key, text) = match ch {
            '\n' => ("Enter".to_string(), "\r".to_string()),
            other => (other.to_string(), other.to_string()),
        };
        self.command(
            "Input.dispatchKeyEvent",
            json!({ "type": "keyDown", "key": key, "text": text, "unmodifiedText": text }),
        )
        .await?;
        self.command("Input.dispatchKeyEvent", json!({ "type": "keyUp", "key": key }))
            .await?;
        Ok(())
    }

    /// True once a new document has replaced the marked one and is past `loading`.
    async fn document_parsed(&self) -> Result<bool, UiError> {
        let expression = format!(
            "document.readyState !== 'loading' && !window.{}",
            STALE_MARKER
        );
        Ok(self.evaluate(expression).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl RemoteUi for CdpPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), UiError> {
        let navigation = async {
            // Mark the outgoing document so the wait below can tell it apart from the new one.
            let _ = self.evaluate(format!("window.{} = true", STALE_MARKER)).await;

            let result = self.command("Page.navigate", json!({ "url": url })).await?;
            if let Some(error) = result.get("errorText").and_then(Value::as_str) {
                if !error.is_empty() {
                    return Err(UiError::Navigation {
                        url: url.to_string(),
                        reason: error.to_string(),
                    });
                }
            }
            loop {
                match self.document_parsed().await {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    // Evaluation races with the document swap; try again.
                    Err(UiError::Protocol(_)) => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(UiError::timeout(format!("navigation to {}", url), timeout)),
        }
    }

    async fn current_url(&self) -> Result<String, UiError> {
        let href = self.evaluate("window.location.href".to_string()).await?;
        href.as_str()
            .map(str::to_string)
            .ok_or_else(|| UiError::Protocol("location.href is not a string".to_string()))
    }

    async fn click(&self, locator: &Locator) -> Result<(), UiError> {
        self.wait_actionable(locator).await?;
        let point = self
            .locate(locator, "point")
            .await?
            .ok_or_else(|| UiError::NotFound(locator.to_string()))?;
        let x = point.get("x").and_then(Value::as_f64).unwrap_or(0.0);
        let y = point.get("y").and_then(Value::as_f64).unwrap_or(0.0);

        self.mouse("mouseMoved", x, y).await?;
        self.mouse("mousePressed", x, y).await?;
        self.mouse("mouseReleased", x, y).await?;
        tracing::debug!("clicked {} at ({:.0}, {:.0})", locator, x, y);
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), UiError> {
        self.wait_actionable(locator).await?;
        if text.is_empty() {
            self.locate(locator, "clear").await?;
            return Ok(());
        }
        self.locate(locator, "focus_select")
            .await?
            .ok_or_else(|| UiError::NotFound(locator.to_string()))?;
        self.command("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), UiError> {
        self.wait_actionable(locator).await?;
        self.locate(locator, "focus_end")
            .await?
            .ok_or_else(|| UiError::NotFound(locator.to_string()))?;
        for ch in text.chars() {
            self.key_press(ch).await?;
        }
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, UiError> {
        self.visible_now(locator).await
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), UiError> {
        let deadline = Instant::now() + timeout;
        loop {
            let visible = self.visible_now(locator).await?;
            let satisfied = match state {
                WaitState::Visible => visible,
                WaitState::Hidden => !visible,
            };
            if satisfied {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let what = match state {
                    WaitState::Visible => format!("{} to be visible", locator),
                    WaitState::Hidden => format!("{} to be hidden", locator),
                };
                return Err(UiError::timeout(what, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, UiError> {
        Ok(self
            .locate(locator, "text")
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<Rect>, UiError> {
        match self.locate(locator, "box").await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| UiError::Protocol(format!("bad bounding box: {}", e))),
            None => Ok(None),
        }
    }

    async fn scrape_texts(&self, selector: &str) -> Result<Vec<String>, UiError> {
        let expression = format!(
            "Array.from(document.querySelectorAll({}), (el) => el.textContent || '')",
            json!(selector)
        );
        let value = self.evaluate(expression).await?;
        serde_json::from_value(value)
            .map_err(|e| UiError::Protocol(format!("bad text snapshot: {}", e)))
    }

    async fn screenshot(&self, path: &Path, clip: Option<Rect>) -> Result<(), UiError> {
        let mut params = json!({ "format": "png", "captureBeyondViewport": false });
        if let Some(rect) = clip {
            params["clip"] = json!({
                "x": rect.x,
                "y": rect.y,
                "width": rect.width,
                "height": rect.height,
                "scale": 1,
            });
        }

        let result = self
            .conn
            .send(
                Some(&self.session_id),
                "Page.captureScreenshot",
                params,
                SCREENSHOT_TIMEOUT,
            )
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| UiError::Protocol("screenshot without data".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| UiError::Protocol(format!("screenshot is not base64: {}", e)))?;

        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), UiError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self
            .conn
            .send(None, "Browser.close", json!({}), CLOSE_TIMEOUT)
            .await
        {
            tracing::debug!("Browser.close failed ({}), killing process", e);
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill().await;
            }
            let _ = child.wait().await;
        }
        // Profile directory goes away with the TempDir.
        self.profile.lock().await.take();
        tracing::info!("Browser closed");
        Ok(())
    }
}

fn string_field(value: &Value, key: &str) -> Result<String, UiError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UiError::Protocol(format!("response is missing '{}'", key)))
}
