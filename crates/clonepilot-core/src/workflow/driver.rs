//! Workflow Driver — the per-session state machine.
//!
//! Every step is awaited in order; nothing inside one session runs
//! concurrently. Fatal failures surface as [`WorkflowError`]; everything after
//! the result page appears is best-effort.

use tokio::time::{sleep, Instant};

use super::{Outcome, Phase, PhaseTracker, SessionRequest};
use crate::artifacts::{ArtifactKind, ArtifactRecord};
use crate::browser::{RemoteUi, WaitState};
use crate::error::{UiError, WorkflowError};
use crate::events::{steps, ProgressChannel, ProgressEvent, StatusSink};
use crate::publish::PublishController;
use crate::signals::{Marker, ProgressSignal};
use crate::state::EngineContext;

pub struct WorkflowDriver<'a> {
    ui: &'a dyn RemoteUi,
    ctx: &'a EngineContext,
    request: &'a SessionRequest,
    channel: &'a mut ProgressChannel,
    phase: PhaseTracker,
    artifacts: ArtifactRecord,
    last_progress: Option<(String, Option<u8>)>,
}

impl<'a> WorkflowDriver<'a> {
    pub fn new(
        ui: &'a dyn RemoteUi,
        ctx: &'a EngineContext,
        request: &'a SessionRequest,
        channel: &'a mut ProgressChannel,
    ) -> Self {
        Self {
            ui,
            ctx,
            request,
            channel,
            phase: PhaseTracker::default(),
            artifacts: ArtifactRecord::default(),
            last_progress: None,
        }
    }

    /// Drive the session to its outcome. Emits every non-terminal event; the
    /// terminal one is left to the caller.
    pub async fn run(mut self) -> (Outcome, Vec<Phase>) {
        let outcome = match self.drive().await {
            Ok(outcome) => {
                self.phase.advance(Phase::Complete);
                outcome
            }
            Err(e) => {
                tracing::error!("❌ Error during cloning: {}", e);
                self.phase.advance(Phase::Failed);
                Outcome::failed(&e)
            }
        };
        (outcome, self.phase.into_history())
    }

    async fn drive(&mut self) -> Result<Outcome, WorkflowError> {
        self.open_landing().await?;
        self.phase.advance(Phase::Navigated);

        self.submit().await?;
        self.phase.advance(Phase::Submitted);

        if self.login_challenged().await {
            self.phase.advance(Phase::AuthChallenged);
            self.authenticate().await?;
            self.phase.advance(Phase::Authenticated);

            self.open_landing().await?;
            let step = self.with_instructions(steps::SUBMITTED_WITH_INSTRUCTIONS, steps::SUBMITTED);
            self.channel.status("Submitting...".to_string(), step);
            self.submit().await?;
            self.phase.advance(Phase::Resubmitted);
        }

        let step = self.with_instructions(steps::MONITORING_WITH_INSTRUCTIONS, steps::MONITORING);
        self.channel.status(
            "Generation process started! Monitoring progress...".to_string(),
            step,
        );
        tracing::info!("⏳ Generation process started. Monitoring progress...");
        sleep(self.ctx.workflow.redirect_settle).await;

        self.phase.advance(Phase::Monitoring);
        let preview_reached = self.monitor().await?;

        let mut published_url = None;
        if preview_reached {
            self.phase.advance(Phase::PreviewReady);
            match self.finish_preview().await {
                Ok(url) => published_url = url,
                Err(e) => {
                    tracing::warn!("⚠️ Error during publish process: {}", e);
                    self.channel.status(
                        "Publish process encountered an issue. Showing preview.".to_string(),
                        steps::PUBLISH_ISSUE,
                    );
                }
            }
        } else {
            tracing::warn!("⚠️ Monitoring ceiling reached without a result page");
        }

        self.capture_final().await;
        self.artifacts.edit_url = match self.ui.current_url().await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("⚠️ Could not read final URL: {}", e);
                None
            }
        };
        tracing::info!(
            "✅ Generation complete. Final URL: {}",
            self.artifacts.edit_url.as_deref().unwrap_or("<unknown>")
        );

        let artifacts = std::mem::take(&mut self.artifacts);
        Ok(match published_url {
            Some(url) => {
                let mut artifacts = artifacts;
                artifacts.published_url = Some(url.clone());
                Outcome::Published { url, artifacts }
            }
            None => Outcome::PreviewOnly {
                artifacts,
                preview_reached,
            },
        })
    }

    fn with_instructions(&self, with: u32, without: u32) -> u32 {
        if self.request.instructions.is_some() {
            with
        } else {
            without
        }
    }

    async fn open_landing(&self) -> Result<(), WorkflowError> {
        let url = &self.ctx.platform.landing_url;
        tracing::info!("🌐 Navigating to platform {}", url);
        self.ui
            .navigate(url, self.ctx.workflow.navigation_timeout)
            .await
            .map_err(|source| WorkflowError::Navigation {
                url: url.clone(),
                source,
            })?;
        sleep(self.ctx.workflow.landing_settle).await;
        Ok(())
    }

    /// Fill the target URL, apply instructions if any, click submit.
    async fn submit(&mut self) -> Result<(), WorkflowError> {
        let ctx = self.ctx;
        let request = self.request;
        let platform = &ctx.platform;
        tracing::info!("📝 Entering URL: {}", request.target_url);
        self.ui
            .fill(&platform.url_field, &request.target_url)
            .await
            .map_err(WorkflowError::ui("enter target URL"))?;

        if let Some(instructions) = &request.instructions {
            self.channel
                .status("Adding custom instructions...".to_string(), steps::COMPOSE);
            let preview: String = instructions.chars().take(50).collect();
            tracing::info!("💬 Adding custom instructions: {}...", preview);
            if let Err(e) = self.compose(instructions).await {
                tracing::warn!("⚠️ Could not add instructions, continuing without them: {}", e);
                if let Err(e) = self
                    .ui
                    .fill(&platform.url_field, &request.target_url)
                    .await
                {
                    tracing::warn!("⚠️ Could not restore URL field: {}", e);
                }
            }
        }

        tracing::info!("▶️ Clicking submit");
        self.ui
            .click(&platform.submit_button)
            .await
            .map_err(WorkflowError::ui("submit"))?;
        sleep(ctx.workflow.submit_settle).await;
        Ok(())
    }

    async fn compose(&self, instructions: &str) -> Result<(), UiError> {
        let compose = &self.ctx.platform.compose;
        let timing = &self.ctx.workflow;

        self.ui.click(&compose.secondary_region).await?;
        sleep(timing.compose_click_delay).await;
        self.ui.click(&compose.primary_region).await?;
        sleep(timing.compose_click_delay).await;

        let text = format!("{}{}", instructions, compose.separator);
        self.ui.fill(&compose.prompt_field, &text).await?;
        self.ui
            .type_text(&compose.prompt_field, &compose.trigger_char)
            .await?;
        sleep(timing.compose_menu_delay).await;
        self.ui.click(&compose.menu_action).await?;

        let url_field = &self.ctx.platform.url_field;
        self.ui.click(url_field).await?;
        self.ui.fill(url_field, &self.request.target_url).await?;
        sleep(timing.compose_settle).await;
        Ok(())
    }

    async fn login_challenged(&self) -> bool {
        tracing::info!("🔐 Checking if login is required");
        match self.ui.is_visible(&self.ctx.platform.auth.login_button).await {
            Ok(visible) => visible,
            Err(e) => {
                tracing::debug!("Login check failed, assuming no challenge: {}", e);
                false
            }
        }
    }

    /// Sign in without verifying the result; a rejected login shows up later
    /// as a monitoring timeout.
    async fn authenticate(&self) -> Result<(), WorkflowError> {
        let credentials = self
            .ctx
            .credentials
            .as_ref()
            .ok_or(WorkflowError::Credentials)?;
        let auth = &self.ctx.platform.auth;
        let step = || WorkflowError::ui("login");

        tracing::info!("🔑 Login required, signing in as {}", credentials.identity);
        self.ui.click(&auth.login_button).await.map_err(step())?;
        sleep(self.ctx.workflow.login_step_delay).await;

        self.ui.click(&auth.identity_field).await.map_err(step())?;
        self.ui
            .fill(&auth.identity_field, &credentials.identity)
            .await
            .map_err(step())?;
        self.ui.click(&auth.secret_field).await.map_err(step())?;
        self.ui
            .fill(&auth.secret_field, &credentials.secret)
            .await
            .map_err(step())?;

        self.ui.click(&auth.sign_in_button).await.map_err(step())?;
        sleep(self.ctx.workflow.login_settle).await;
        tracing::info!("✅ Sign-in submitted, returning to platform");
        Ok(())
    }

    /// Poll until the result page appears or the ceiling passes.
    async fn monitor(&mut self) -> Result<bool, WorkflowError> {
        let ctx = self.ctx;
        let timing = &ctx.workflow;
        let started = Instant::now();
        let mut next_capture = timing.screenshot_cadence;

        while started.elapsed() < timing.monitor_ceiling {
            if timing.cancel_on_disconnect && self.channel.is_closed() {
                tracing::warn!("Caller disconnected, abandoning session");
                return Err(WorkflowError::Disconnected);
            }

            if self.on_result_page().await {
                self.channel.emit(ProgressEvent::Status {
                    message: "Preview is ready!".to_string(),
                    step: steps::PREVIEW,
                    progress: Some(100),
                });
                tracing::info!("✅ Preview is ready!");
                return Ok(true);
            }

            match self.ui.scrape_texts(&ctx.platform.progress_selector).await {
                Ok(blocks) => {
                    if let Some(signal) = ctx.extractor.extract(&blocks) {
                        self.emit_progress(signal);
                    }
                }
                Err(e) => tracing::debug!("Progress snapshot failed: {}", e),
            }

            if started.elapsed() >= next_capture {
                next_capture += timing.screenshot_cadence;
                match ctx.artifacts.capture(self.ui, ArtifactKind::Progress).await {
                    Ok(path) => self.artifacts.push_screenshot(path),
                    Err(e) => tracing::debug!("Progress screenshot failed: {}", e),
                }
            }

            sleep(timing.poll_interval).await;
        }

        Ok(self.on_result_page().await)
    }

    async fn on_result_page(&self) -> bool {
        match self.ui.current_url().await {
            Ok(url) => self.ctx.platform.is_result_url(&url),
            Err(e) => {
                tracing::debug!("Could not read current URL: {}", e);
                false
            }
        }
    }

    /// Emits only when `(message, percent)` differs from the last emission.
    fn emit_progress(&mut self, signal: ProgressSignal) {
        let key = (signal.message(), signal.percent);
        if self.last_progress.as_ref() == Some(&key) {
            return;
        }
        tracing::info!("📊 Progress: {}", key.0);
        self.channel.emit(ProgressEvent::Progress {
            message: key.0.clone(),
            progress: key.1,
            step: steps::PROGRESS,
        });
        self.last_progress = Some(key);
    }

    /// Settle, wait out edits and loading, capture the preview, publish.
    async fn finish_preview(&mut self) -> Result<Option<String>, UiError> {
        let ctx = self.ctx;
        let timing = &ctx.workflow;
        let markers = &ctx.platform.markers;

        sleep(timing.preview_settle).await;
        self.channel.status(
            "Waiting before checking edits...".to_string(),
            steps::EDITS,
        );
        sleep(timing.edits_check_delay).await;

        self.channel.status(
            "Checking if edits are complete...".to_string(),
            steps::EDITS,
        );
        let edits = markers.locator(Marker::EditsInProgress);
        if self.ui.is_visible(&edits).await.unwrap_or(false) {
            self.phase.advance(Phase::EditsSettling);
            self.channel.status(
                format!(
                    "Waiting for \"{}\" to complete before publishing...",
                    markers.edits_in_progress
                ),
                steps::EDITS,
            );
            match self
                .ui
                .wait_for(&edits, WaitState::Hidden, timing.edits_timeout)
                .await
            {
                Ok(()) => {
                    self.channel.status(
                        "Edits complete. Proceeding to publish...".to_string(),
                        steps::PREVIEW,
                    );
                    sleep(timing.edits_settle).await;
                }
                Err(e) => tracing::warn!("⚠️ Edits still in progress, proceeding: {}", e),
            }
        }

        self.channel.status(
            "Waiting for preview to load...".to_string(),
            steps::PREVIEW,
        );
        let loading = markers.locator(Marker::ContentLoading);
        if self.ui.is_visible(&loading).await.unwrap_or(false) {
            self.phase.advance(Phase::ContentLoading);
            self.channel.status(
                format!("Waiting for \"{}\" to complete...", markers.content_loading),
                steps::PREVIEW,
            );
            if let Err(e) = self
                .ui
                .wait_for(&loading, WaitState::Hidden, timing.loading_timeout)
                .await
            {
                tracing::warn!("⚠️ Preview still loading, capturing anyway: {}", e);
            }
        }

        self.channel
            .status("Preview settling...".to_string(), steps::PREVIEW);
        sleep(timing.capture_settle).await;

        let preview = ctx
            .artifacts
            .capture_region(self.ui, ArtifactKind::Preview, &ctx.platform.preview_frame)
            .await?;
        self.artifacts.push_screenshot(preview.clone());
        self.artifacts.preview_screenshot = Some(preview.clone());
        self.phase.advance(Phase::PreviewCaptured);
        self.channel.emit(ProgressEvent::PreviewReady {
            preview_screenshot: preview,
            message: "Preview ready. Publishing your site...".to_string(),
        });

        if !timing.publish_enabled {
            tracing::info!("Publishing disabled, keeping preview only");
            return Ok(None);
        }

        self.phase.advance(Phase::Publishing);
        let result = PublishController::new(
            self.ui,
            &ctx.platform.publish,
            markers.locator(Marker::PublishedBadge),
            &timing.publish,
            &ctx.artifacts,
            &ctx.address_rules,
        )
        .run(&mut *self.channel)
        .await;

        for path in result.screenshots {
            self.artifacts.push_screenshot(path);
        }
        match result.url {
            Some(url) => {
                self.phase.advance(Phase::Published);
                Ok(Some(url))
            }
            None => {
                self.phase.advance(Phase::PublishFailed);
                Ok(None)
            }
        }
    }

    /// Fresh capture, falling back to the latest recorded screenshot.
    async fn capture_final(&mut self) {
        match self.ctx.artifacts.capture(self.ui, ArtifactKind::Final).await {
            Ok(path) => {
                self.artifacts.push_screenshot(path.clone());
                self.artifacts.final_screenshot = Some(path);
            }
            Err(e) => {
                tracing::warn!("⚠️ Final screenshot failed: {}", e);
                self.artifacts.final_screenshot =
                    self.artifacts.latest_screenshot().map(str::to_string);
            }
        }
    }
}
