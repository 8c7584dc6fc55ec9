//! Scripted [`RemoteUi`] for driving the workflow without a browser.
//!
//! A `ScriptedUi` simulates the remote platform described by a
//! [`PlatformProfile`]: it recognises the profile's locators, moves to the
//! result page a scripted time after submission, serves progress snapshots,
//! and lets publish succeed on a chosen attempt. All timing uses
//! `tokio::time`, so tests run with a paused clock.
//!
//! Handles are cheap clones sharing one state, which lets a test keep a handle
//! for assertions while the driver owns a boxed copy.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Locator, Rect, RemoteUi, SessionLauncher, WaitState};
use crate::error::UiError;
use crate::platform::PlatformProfile;

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Navigate(String),
    Click(Locator),
    Fill(Locator, String),
    Type(Locator, String),
    Screenshot(PathBuf, Option<Rect>),
    Close,
}

#[derive(Debug, Clone)]
struct Script {
    login_required: bool,
    ready_after: Option<Duration>,
    frames: Vec<(Duration, Vec<String>)>,
    publish_succeeds_on: Option<u32>,
    published_host: String,
    host_in_styled_element: bool,
    edits_for: Option<Duration>,
    loading_for: Option<Duration>,
    preview_box: Option<Rect>,
    fail_navigation: bool,
    fail_screenshots: bool,
    fail_locators: Vec<Locator>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            login_required: false,
            ready_after: Some(Duration::from_secs(60)),
            frames: Vec::new(),
            publish_succeeds_on: Some(1),
            published_host: "mock-site.dev.animaapp.io".to_string(),
            host_in_styled_element: true,
            edits_for: None,
            loading_for: None,
            preview_box: Some(Rect {
                x: 480.0,
                y: 64.0,
                width: 1440.0,
                height: 1016.0,
            }),
            fail_navigation: false,
            fail_screenshots: false,
            fail_locators: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    location: String,
    actions: Vec<UiAction>,
    submissions: u32,
    submitted_at: Option<Instant>,
    login_prompt: bool,
    logged_in: bool,
    identity: Option<String>,
    publish_attempts: u32,
    live: bool,
    details_open: bool,
    closed: bool,
}

struct Inner {
    profile: PlatformProfile,
    script: Script,
    state: Mutex<State>,
}

#[derive(Clone)]
pub struct ScriptedUi {
    inner: Arc<Inner>,
}

/// Builder for [`ScriptedUi`].
pub struct ScriptedUiBuilder {
    profile: PlatformProfile,
    script: Script,
}

impl ScriptedUiBuilder {
    /// Submitting shows a login prompt until the sign-in button is clicked.
    pub fn login_required(mut self) -> Self {
        self.script.login_required = true;
        self
    }

    /// Time between the accepted submission and the result page appearing.
    pub fn ready_after(mut self, after: Duration) -> Self {
        self.script.ready_after = Some(after);
        self
    }

    /// The result page never appears.
    pub fn never_ready(mut self) -> Self {
        self.script.ready_after = None;
        self
    }

    /// Page text served from `at` (measured from submission) onwards.
    pub fn progress_frame(mut self, at: Duration, texts: &[&str]) -> Self {
        self.script
            .frames
            .push((at, texts.iter().map(|t| t.to_string()).collect()));
        self.script.frames.sort_by_key(|(at, _)| *at);
        self
    }

    /// Publish goes live on the given attempt (1-based).
    pub fn publish_succeeds_on(mut self, attempt: u32) -> Self {
        self.script.publish_succeeds_on = Some(attempt);
        self
    }

    pub fn publish_never_succeeds(mut self) -> Self {
        self.script.publish_succeeds_on = None;
        self
    }

    pub fn published_host(mut self, host: impl Into<String>) -> Self {
        self.script.published_host = host.into();
        self
    }

    /// The styled element shows a label instead of the host, so only a
    /// document scan finds the address.
    pub fn host_only_in_document(mut self) -> Self {
        self.script.host_in_styled_element = false;
        self
    }

    /// "edits in progress" marker visible for `span` after the result page appears.
    pub fn edits_for(mut self, span: Duration) -> Self {
        self.script.edits_for = Some(span);
        self
    }

    /// "content loading" marker visible for `span` after the result page appears.
    pub fn loading_for(mut self, span: Duration) -> Self {
        self.script.loading_for = Some(span);
        self
    }

    pub fn preview_box(mut self, rect: Option<Rect>) -> Self {
        self.script.preview_box = rect;
        self
    }

    pub fn fail_navigation(mut self) -> Self {
        self.script.fail_navigation = true;
        self
    }

    pub fn fail_screenshots(mut self) -> Self {
        self.script.fail_screenshots = true;
        self
    }

    /// Any action on `locator` fails with [`UiError::NotFound`].
    pub fn fail_locator(mut self, locator: Locator) -> Self {
        self.script.fail_locators.push(locator);
        self
    }

    pub fn build(self) -> ScriptedUi {
        ScriptedUi {
            inner: Arc::new(Inner {
                profile: self.profile,
                script: self.script,
                state: Mutex::new(State {
                    location: "about:blank".to_string(),
                    ..State::default()
                }),
            }),
        }
    }
}

impl ScriptedUi {
    pub fn builder(profile: PlatformProfile) -> ScriptedUiBuilder {
        ScriptedUiBuilder {
            profile,
            script: Script::default(),
        }
    }

    pub fn actions(&self) -> Vec<UiAction> {
        self.lock().actions.clone()
    }

    pub fn clicked(&self, locator: &Locator) -> usize {
        self.lock()
            .actions
            .iter()
            .filter(|a| matches!(a, UiAction::Click(l) if l == locator))
            .count()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                UiAction::Navigate(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn screenshots(&self) -> Vec<(PathBuf, Option<Rect>)> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                UiAction::Screenshot(path, clip) => Some((path.clone(), *clip)),
                _ => None,
            })
            .collect()
    }

    /// Submit clicks, including ones answered by a login prompt.
    pub fn submissions(&self) -> u32 {
        self.lock().submissions
    }

    /// Clicks on the confirming publish button.
    pub fn publish_attempts(&self) -> u32 {
        self.lock().publish_attempts
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn profile(&self) -> &PlatformProfile {
        &self.inner.profile
    }

    fn script(&self) -> &Script {
        &self.inner.script
    }

    fn check(&self, state: &State, locator: &Locator) -> Result<(), UiError> {
        if state.closed {
            return Err(UiError::Closed);
        }
        if self.script().fail_locators.contains(locator) {
            return Err(UiError::NotFound(locator.to_string()));
        }
        Ok(())
    }

    fn ready_at(&self, state: &State) -> Option<Instant> {
        Some(state.submitted_at? + self.script().ready_after?)
    }

    fn result_url(&self) -> String {
        format!(
            "{}{}mock-project",
            self.profile().landing_url.trim_end_matches('/'),
            self.profile().result_path
        )
    }

    /// Instant until which a post-result marker stays visible.
    fn marker_until(&self, state: &State, span: Option<Duration>) -> Option<Instant> {
        Some(self.ready_at(state)? + span?)
    }

    /// `Some(t)`: the locator is visible until `t`. `None`: visibility does not expire.
    fn visibility(&self, state: &State, locator: &Locator, now: Instant) -> (bool, Option<Instant>) {
        let profile = self.profile();
        let markers = &profile.markers;
        if *locator == profile.auth.login_button {
            return (state.login_prompt, None);
        }
        if *locator == markers.locator(crate::signals::Marker::PublishedBadge) {
            return (state.live, None);
        }
        if *locator == profile.publish.published_host {
            return (state.live && state.details_open, None);
        }
        let span = if *locator == markers.locator(crate::signals::Marker::EditsInProgress) {
            Some(self.script().edits_for)
        } else if *locator == markers.locator(crate::signals::Marker::ContentLoading) {
            Some(self.script().loading_for)
        } else {
            None
        };
        match span {
            Some(span) => match self.marker_until(state, span) {
                Some(until) if now < until => (true, Some(until)),
                _ => (false, None),
            },
            None => (true, None),
        }
    }

    fn on_click(&self, state: &mut State, locator: &Locator) -> Result<(), UiError> {
        let profile = self.profile();
        if *locator == profile.submit_button {
            state.submissions += 1;
            if self.script().login_required && !state.logged_in {
                state.login_prompt = true;
            } else {
                state.submitted_at = Some(Instant::now());
            }
        } else if *locator == profile.auth.login_button {
            if !state.login_prompt {
                return Err(UiError::NotFound(locator.to_string()));
            }
        } else if *locator == profile.auth.sign_in_button {
            if state.identity.is_some() {
                state.logged_in = true;
                state.login_prompt = false;
            }
        } else if *locator == profile.publish.trigger {
            state.details_open = state.live;
        } else if *locator == profile.publish.confirm {
            state.publish_attempts += 1;
            if let Some(n) = self.script().publish_succeeds_on {
                if state.publish_attempts >= n {
                    state.live = true;
                    state.details_open = true;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteUi for ScriptedUi {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), UiError> {
        let mut state = self.lock();
        if state.closed {
            return Err(UiError::Closed);
        }
        state.actions.push(UiAction::Navigate(url.to_string()));
        if self.script().fail_navigation {
            return Err(UiError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        state.location = url.to_string();
        state.submitted_at = None;
        state.login_prompt = false;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, UiError> {
        let state = self.lock();
        match self.ready_at(&state) {
            Some(at) if Instant::now() >= at => Ok(self.result_url()),
            _ => Ok(state.location.clone()),
        }
    }

    async fn click(&self, locator: &Locator) -> Result<(), UiError> {
        let mut state = self.lock();
        self.check(&state, locator)?;
        state.actions.push(UiAction::Click(locator.clone()));
        self.on_click(&mut state, locator)
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), UiError> {
        let mut state = self.lock();
        self.check(&state, locator)?;
        state
            .actions
            .push(UiAction::Fill(locator.clone(), text.to_string()));
        if *locator == self.profile().auth.identity_field {
            state.identity = Some(text.to_string());
        }
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), UiError> {
        let mut state = self.lock();
        self.check(&state, locator)?;
        state
            .actions
            .push(UiAction::Type(locator.clone(), text.to_string()));
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, UiError> {
        let state = self.lock();
        self.check(&state, locator)?;
        Ok(self.visibility(&state, locator, Instant::now()).0)
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        wait: WaitState,
        timeout: Duration,
    ) -> Result<(), UiError> {
        let deadline = Instant::now() + timeout;
        let settles_at = {
            let state = self.lock();
            self.check(&state, locator)?;
            match (wait, self.visibility(&state, locator, Instant::now())) {
                (WaitState::Visible, (true, _)) | (WaitState::Hidden, (false, _)) => {
                    return Ok(())
                }
                (WaitState::Hidden, (true, Some(until))) => Some(until),
                _ => None,
            }
        };
        match settles_at {
            Some(at) if at <= deadline => {
                tokio::time::sleep_until(at).await;
                Ok(())
            }
            _ => {
                tokio::time::sleep_until(deadline).await;
                Err(UiError::timeout(locator.to_string(), timeout))
            }
        }
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>, UiError> {
        let state = self.lock();
        self.check(&state, locator)?;
        if *locator == self.profile().publish.published_host {
            if !(state.live && state.details_open) {
                return Ok(None);
            }
            let text = if self.script().host_in_styled_element {
                format!(" {} ", self.script().published_host)
            } else {
                "Published".to_string()
            };
            return Ok(Some(text));
        }
        Ok(None)
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<Rect>, UiError> {
        let state = self.lock();
        self.check(&state, locator)?;
        if *locator == self.profile().preview_frame {
            return Ok(self.script().preview_box);
        }
        Ok(None)
    }

    async fn scrape_texts(&self, selector: &str) -> Result<Vec<String>, UiError> {
        let state = self.lock();
        if state.closed {
            return Err(UiError::Closed);
        }
        let profile = self.profile();
        if selector == profile.progress_selector {
            let Some(submitted_at) = state.submitted_at else {
                return Ok(Vec::new());
            };
            let elapsed = Instant::now().saturating_duration_since(submitted_at);
            return Ok(self
                .script()
                .frames
                .iter()
                .rev()
                .find(|(at, _)| *at <= elapsed)
                .map(|(_, texts)| texts.clone())
                .unwrap_or_default());
        }
        if selector == profile.publish.scan_selector {
            let mut texts = vec!["Publish".to_string()];
            if state.live {
                let host = &self.script().published_host;
                texts.push(format!("Your site is live at {}", host));
                texts.push(host.clone());
            }
            return Ok(texts);
        }
        Ok(Vec::new())
    }

    async fn screenshot(&self, path: &Path, clip: Option<Rect>) -> Result<(), UiError> {
        let mut state = self.lock();
        if state.closed {
            return Err(UiError::Closed);
        }
        if self.script().fail_screenshots {
            return Err(UiError::Protocol("Page.captureScreenshot failed".to_string()));
        }
        state
            .actions
            .push(UiAction::Screenshot(path.to_path_buf(), clip));
        Ok(())
    }

    async fn close(&self) -> Result<(), UiError> {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            state.actions.push(UiAction::Close);
        }
        Ok(())
    }
}

/// Hands out the same [`ScriptedUi`] for every launch and counts launches.
pub struct ScriptedLauncher {
    ui: Option<ScriptedUi>,
    launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(ui: ScriptedUi) -> Self {
        Self {
            ui: Some(ui),
            launches: AtomicUsize::new(0),
        }
    }

    /// Every launch fails, as if no browser could be started.
    pub fn failing() -> Self {
        Self {
            ui: None,
            launches: AtomicUsize::new(0),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn RemoteUi>, UiError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        match &self.ui {
            Some(ui) => Ok(Box::new(ui.clone())),
            None => Err(UiError::Launch("no browser available".to_string())),
        }
    }
}
