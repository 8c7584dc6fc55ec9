//! Publish Retry Controller.
//!
//! Each attempt opens the publish panel, confirms, waits for the "live" badge
//! and then tries a list of [`AddressRule`]s to recover the published host.
//! A failed attempt is logged and the next one starts; the first recovered
//! address ends the loop.

use async_trait::async_trait;

use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::browser::{Locator, RemoteUi, WaitState};
use crate::config::PublishConfig;
use crate::error::UiError;
use crate::events::{steps, StatusSink};
use crate::platform::PublishLocators;

/// One way of reading the published host off the page.
#[async_trait]
pub trait AddressRule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find(
        &self,
        ui: &dyn RemoteUi,
        locators: &PublishLocators,
    ) -> Result<Option<String>, UiError>;
}

/// Text of the styled host element, accepted if it carries the domain suffix.
pub struct StyledElementRule;

#[async_trait]
impl AddressRule for StyledElementRule {
    fn name(&self) -> &'static str {
        "styled-element"
    }

    async fn find(
        &self,
        ui: &dyn RemoteUi,
        locators: &PublishLocators,
    ) -> Result<Option<String>, UiError> {
        if !ui.is_visible(&locators.published_host).await? {
            return Ok(None);
        }
        let text = ui.text_content(&locators.published_host).await?;
        Ok(text
            .map(|t| t.trim().to_string())
            .filter(|t| t.contains(&locators.domain_suffix)))
    }
}

/// First short text node anywhere in the document that carries the suffix.
pub struct DocumentScanRule;

#[async_trait]
impl AddressRule for DocumentScanRule {
    fn name(&self) -> &'static str {
        "document-scan"
    }

    async fn find(
        &self,
        ui: &dyn RemoteUi,
        locators: &PublishLocators,
    ) -> Result<Option<String>, UiError> {
        let texts = ui.scrape_texts(&locators.scan_selector).await?;
        Ok(texts.into_iter().find_map(|text| {
            let text = text.trim();
            (text.contains(&locators.domain_suffix) && !text.chars().any(char::is_whitespace))
                .then(|| text.to_string())
        }))
    }
}

pub fn default_address_rules() -> Vec<Box<dyn AddressRule>> {
    vec![Box::new(StyledElementRule), Box::new(DocumentScanRule)]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishResult {
    /// `https://<host>` when an address was recovered.
    pub url: Option<String>,
    pub attempts: u32,
    pub screenshots: Vec<String>,
}

pub struct PublishController<'a> {
    ui: &'a dyn RemoteUi,
    locators: &'a PublishLocators,
    badge: Locator,
    config: &'a PublishConfig,
    artifacts: &'a ArtifactStore,
    rules: &'a [Box<dyn AddressRule>],
}

impl<'a> PublishController<'a> {
    pub fn new(
        ui: &'a dyn RemoteUi,
        locators: &'a PublishLocators,
        badge: Locator,
        config: &'a PublishConfig,
        artifacts: &'a ArtifactStore,
        rules: &'a [Box<dyn AddressRule>],
    ) -> Self {
        Self {
            ui,
            locators,
            badge,
            config,
            artifacts,
            rules,
        }
    }

    pub async fn run(&self, sink: &mut dyn StatusSink) -> PublishResult {
        let max = self.config.max_attempts;
        let mut result = PublishResult::default();

        for attempt in 1..=max {
            if attempt > 1 {
                sink.status(
                    format!("Retrying publish (attempt {}/{})...", attempt, max),
                    steps::PUBLISH_RETRY,
                );
                tracing::info!("🔄 Retrying publish - attempt {}/{}", attempt, max);
                tokio::time::sleep(self.config.retry_delay).await;
            }
            result.attempts = attempt;

            match self.attempt(sink, &mut result.screenshots).await {
                Ok(Some(url)) => {
                    match self.artifacts.capture(self.ui, ArtifactKind::Published).await {
                        Ok(path) => result.screenshots.push(path),
                        Err(e) => tracing::warn!("⚠️ Published screenshot failed: {}", e),
                    }
                    sink.status(
                        format!("Website published at: {}", url),
                        steps::PUBLISH_RESULT,
                    );
                    tracing::info!("✅ Website published at: {}", url);
                    result.url = Some(url);
                    return result;
                }
                Ok(None) => tracing::warn!("⚠️ Publish attempt {} found no address", attempt),
                Err(e) => tracing::warn!("⚠️ Publish attempt {} failed: {}", attempt, e),
            }
        }

        tracing::warn!("⚠️ Publish failed after {} attempts", max);
        sink.status(
            "Publish could not be completed. Showing preview.".to_string(),
            steps::PUBLISH_RESULT,
        );
        result
    }

    async fn attempt(
        &self,
        sink: &mut dyn StatusSink,
        screenshots: &mut Vec<String>,
    ) -> Result<Option<String>, UiError> {
        tracing::info!("📤 Opening publish panel");
        self.ui.click(&self.locators.trigger).await?;
        tokio::time::sleep(self.config.panel_delay).await;

        sink.status("Publishing website...".to_string(), steps::PUBLISHING);
        self.ui.click(&self.locators.confirm).await?;

        sink.status(
            "Waiting for publish to complete...".to_string(),
            steps::PUBLISH_WAIT,
        );
        match self
            .ui
            .wait_for(&self.badge, WaitState::Visible, self.config.live_timeout)
            .await
        {
            Ok(()) => tracing::info!("✅ Live badge appeared"),
            Err(e) => tracing::warn!("⚠️ Live badge not seen this attempt: {}", e),
        }
        tokio::time::sleep(self.config.live_settle).await;

        sink.status(
            "Opening published details...".to_string(),
            steps::PUBLISH_DETAILS,
        );
        match self.ui.is_visible(&self.locators.published_host).await {
            Ok(true) => {}
            Ok(false) => {
                self.ui.click(&self.locators.trigger).await?;
                tokio::time::sleep(self.config.panel_delay).await;
            }
            Err(e) => tracing::warn!("⚠️ Could not check details panel: {}", e),
        }

        match self.artifacts.capture(self.ui, ArtifactKind::PublishSheet).await {
            Ok(path) => screenshots.push(path),
            Err(e) => tracing::warn!("⚠️ Publish sheet screenshot failed: {}", e),
        }

        for rule in self.rules {
            match rule.find(self.ui, self.locators).await {
                Ok(Some(host)) => {
                    tracing::debug!("Address found by {} rule", rule.name());
                    return Ok(Some(format!("https://{}", host)));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("⚠️ {} rule failed: {}", rule.name(), e),
            }
        }
        Ok(None)
    }
}
