//! Shared engine state, read-only once sessions start.

use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::browser::SessionLauncher;
use crate::config::{Credentials, WorkflowConfig};
use crate::platform::PlatformProfile;
use crate::publish::{default_address_rules, AddressRule};
use crate::signals::SignalExtractor;

/// Everything a session needs besides its own request and browser.
pub struct EngineContext {
    pub workflow: WorkflowConfig,
    pub platform: PlatformProfile,
    pub credentials: Option<Credentials>,
    pub artifacts: ArtifactStore,
    pub extractor: SignalExtractor,
    /// Tried in order to recover the published address.
    pub address_rules: Vec<Box<dyn AddressRule>>,
    pub launcher: Arc<dyn SessionLauncher>,
}

pub type Engine = Arc<EngineContext>;

impl EngineContext {
    /// Default timings and platform profile, no credentials.
    pub fn new(launcher: Arc<dyn SessionLauncher>, artifacts: ArtifactStore) -> Self {
        let platform = PlatformProfile::default();
        Self {
            workflow: WorkflowConfig::default(),
            extractor: SignalExtractor::with_milestones(platform.milestone_phrases.clone()),
            platform,
            address_rules: default_address_rules(),
            credentials: None,
            artifacts,
            launcher,
        }
    }

    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    /// Also rebuilds the extractor from the profile's milestone phrases.
    pub fn with_platform(mut self, platform: PlatformProfile) -> Self {
        self.extractor = SignalExtractor::with_milestones(platform.milestone_phrases.clone());
        self.platform = platform;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn into_engine(self) -> Engine {
        Arc::new(self)
    }
}
