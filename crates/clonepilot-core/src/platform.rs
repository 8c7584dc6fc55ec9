//! PlatformProfile — the remote application's markup contract.
//!
//! Every locator, marker text and URL pattern the driver relies on lives
//! here, so a change on the remote side means editing a YAML profile rather
//! than the phase logic. Defaults describe the Anima web app.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::browser::Locator;
use crate::error::ServerError;
use crate::signals::Markers;

/// Locators of the optional "compose instructions" sub-sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeLocators {
    pub secondary_region: Locator,
    pub primary_region: Locator,
    pub prompt_field: Locator,
    /// Appended to the instructions before the trigger character.
    pub separator: String,
    pub trigger_char: String,
    pub menu_action: Locator,
}

impl Default for ComposeLocators {
    fn default() -> Self {
        Self {
            secondary_region: Locator::role("paragraph").nth(1),
            primary_region: Locator::role("paragraph"),
            prompt_field: Locator::role("textbox"),
            separator: "\n\n\n".to_string(),
            trigger_char: "/".to_string(),
            menu_action: Locator::text("Clone Website"),
        }
    }
}

/// Locators of the login form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthLocators {
    pub login_button: Locator,
    pub identity_field: Locator,
    pub secret_field: Locator,
    pub sign_in_button: Locator,
}

impl Default for AuthLocators {
    fn default() -> Self {
        Self {
            login_button: Locator::role("button").with_name("Log in"),
            identity_field: Locator::role("textbox").with_name("name@email.com"),
            secret_field: Locator::role("textbox").with_name("Type your password here"),
            sign_in_button: Locator::role("button").with_name("Sign In"),
        }
    }
}

/// Locators of the publish panel and the published address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishLocators {
    pub trigger: Locator,
    pub confirm: Locator,
    /// Styled element holding the published host inside the details panel.
    pub published_host: Locator,
    /// Elements scanned when `published_host` yields nothing usable.
    pub scan_selector: String,
    pub domain_suffix: String,
}

impl Default for PublishLocators {
    fn default() -> Self {
        Self {
            trigger: Locator::css("button").has_text("Publish"),
            confirm: Locator::css("button.w-full").has_text("Publish"),
            published_host: Locator::css("span.text-blue-500"),
            scan_selector: "span, a, div".to_string(),
            domain_suffix: ".dev.animaapp.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformProfile {
    pub landing_url: String,
    /// Substring of the location once generation has produced a result page.
    pub result_path: String,
    pub url_field: Locator,
    pub submit_button: Locator,
    pub compose: ComposeLocators,
    pub auth: AuthLocators,
    /// Elements whose text forms the progress snapshot.
    pub progress_selector: String,
    pub milestone_phrases: Vec<String>,
    pub markers: Markers,
    pub preview_frame: Locator,
    pub publish: PublishLocators,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self {
            landing_url: "https://dev.animaapp.com/".to_string(),
            result_path: "/chat/".to_string(),
            url_field: Locator::role("textbox").with_name("Paste your link here"),
            submit_button: Locator::test_id("import-submit-button"),
            compose: ComposeLocators::default(),
            auth: AuthLocators::default(),
            progress_selector: "h1, h2, h3, div".to_string(),
            milestone_phrases: vec![
                "Creating visual direction".to_string(),
                "Scanning page elements".to_string(),
                "Project structure".to_string(),
                "Let's build".to_string(),
            ],
            markers: Markers::default(),
            preview_frame: Locator::css("iframe"),
            publish: PublishLocators::default(),
        }
    }
}

impl PlatformProfile {
    pub fn from_yaml(yaml: &str) -> Result<Self, ServerError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ServerError::BadRequest(format!("Invalid platform profile: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::NotFound(format!("platform profile {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Defaults, with `CLONEPILOT_PLATFORM_URL` overriding the landing URL.
    pub fn from_env() -> Self {
        let mut profile = Self::default();
        if let Ok(url) = std::env::var("CLONEPILOT_PLATFORM_URL") {
            if !url.trim().is_empty() {
                profile.landing_url = url.trim().to_string();
            }
        }
        profile
    }

    pub fn is_result_url(&self, url: &str) -> bool {
        url.contains(&self.result_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
landing_url: "https://staging.example.test/"
result_path: "/project/"
submit_button:
  by: test_id
  id: go
markers:
  edits_in_progress: "Applying changes..."
  content_loading: "Loading..."
  published_badge: "LIVE!"
"#;
        let profile = PlatformProfile::from_yaml(yaml).unwrap();
        assert_eq!(profile.landing_url, "https://staging.example.test/");
        assert_eq!(profile.submit_button, Locator::test_id("go"));
        assert_eq!(profile.markers.edits_in_progress, "Applying changes...");
        assert_eq!(profile.auth, AuthLocators::default());
        assert_eq!(profile.publish.domain_suffix, ".dev.animaapp.io");
        assert!(profile.is_result_url("https://staging.example.test/project/42"));
    }

    #[test]
    fn test_nested_partial_yaml() {
        let yaml = r#"
auth:
  sign_in_button:
    by: role
    role: button
    name: "Continue"
publish:
  domain_suffix: ".staging.example.test"
markers:
  published_badge: "Online"
"#;
        let profile = PlatformProfile::from_yaml(yaml).unwrap();
        assert_eq!(
            profile.auth.sign_in_button,
            Locator::role("button").with_name("Continue")
        );
        assert_eq!(profile.auth.login_button, AuthLocators::default().login_button);
        assert_eq!(profile.publish.domain_suffix, ".staging.example.test");
        assert_eq!(profile.publish.trigger, PublishLocators::default().trigger);
        assert_eq!(profile.markers.published_badge, "Online");
        assert_eq!(profile.markers.edits_in_progress, "Making edits...");
        assert_eq!(profile.compose, ComposeLocators::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = PlatformProfile::from_yaml("landing_url: [").unwrap_err();
        assert!(err.to_string().starts_with("Invalid platform profile"));
    }

    #[test]
    fn test_default_result_url() {
        let profile = PlatformProfile::default();
        assert!(profile.is_result_url("https://dev.animaapp.com/chat/abc123"));
        assert!(!profile.is_result_url("https://dev.animaapp.com/loading"));
    }
}
