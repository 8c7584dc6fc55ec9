//! Engine configuration: timings, browser launch options and credentials.
//!
//! Every value has a default; `from_env()` constructors apply `CLONEPILOT_*`
//! overrides on top.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Login identity for the remote platform. Read-only for the whole process.
#[derive(Clone)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// `ANIMA_EMAIL` / `ANIMA_PASSWORD`; `None` unless both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let identity = std::env::var("ANIMA_EMAIL").ok()?;
        let secret = std::env::var("ANIMA_PASSWORD").ok()?;
        if identity.trim().is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self::new(identity.trim(), secret))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Publish Retry Controller timings.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Pause after opening the publish panel / details sheet.
    pub panel_delay: Duration,
    pub live_timeout: Duration,
    pub live_settle: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_delay: Duration::from_secs(3),
            panel_delay: Duration::from_secs(2),
            live_timeout: Duration::from_secs(60),
            live_settle: Duration::from_secs(3),
        }
    }
}

/// Workflow Driver timings and switches.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub navigation_timeout: Duration,
    pub landing_settle: Duration,
    pub submit_settle: Duration,
    pub login_settle: Duration,
    /// Pause between the two login sub-steps that reveal new fields.
    pub login_step_delay: Duration,
    pub redirect_settle: Duration,
    pub poll_interval: Duration,
    pub monitor_ceiling: Duration,
    pub screenshot_cadence: Duration,
    pub preview_settle: Duration,
    pub edits_check_delay: Duration,
    pub edits_timeout: Duration,
    pub edits_settle: Duration,
    pub loading_timeout: Duration,
    pub capture_settle: Duration,
    pub compose_click_delay: Duration,
    pub compose_menu_delay: Duration,
    pub compose_settle: Duration,
    pub publish: PublishConfig,
    pub publish_enabled: bool,
    /// Idle period after the terminal event before the browser is closed.
    pub linger: Duration,
    /// End the session as soon as the caller's connection is gone.
    pub cancel_on_disconnect: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            landing_settle: Duration::from_secs(3),
            submit_settle: Duration::from_secs(2),
            login_settle: Duration::from_secs(5),
            login_step_delay: Duration::from_secs(2),
            redirect_settle: Duration::from_secs(5),
            poll_interval: Duration::from_secs(3),
            monitor_ceiling: Duration::from_secs(35 * 60),
            screenshot_cadence: Duration::from_secs(30),
            preview_settle: Duration::from_secs(3),
            edits_check_delay: Duration::from_secs(10),
            edits_timeout: Duration::from_secs(10 * 60),
            edits_settle: Duration::from_secs(2),
            loading_timeout: Duration::from_secs(2 * 60),
            capture_settle: Duration::from_secs(5),
            compose_click_delay: Duration::from_millis(300),
            compose_menu_delay: Duration::from_secs(1),
            compose_settle: Duration::from_secs(3),
            publish: PublishConfig::default(),
            publish_enabled: true,
            linger: Duration::from_secs(120),
            cancel_on_disconnect: false,
        }
    }
}

impl WorkflowConfig {
    /// Defaults with environment overrides:
    ///
    /// - `CLONEPILOT_MONITOR_CEILING_SECS`
    /// - `CLONEPILOT_LINGER_SECS`
    /// - `CLONEPILOT_PUBLISH` (`0`/`false` disables publishing)
    /// - `CLONEPILOT_CANCEL_ON_DISCONNECT` (`1`/`true` enables)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("CLONEPILOT_MONITOR_CEILING_SECS") {
            config.monitor_ceiling = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("CLONEPILOT_LINGER_SECS") {
            config.linger = Duration::from_secs(secs);
        }
        if let Some(flag) = env_flag("CLONEPILOT_PUBLISH") {
            config.publish_enabled = flag;
        }
        if let Some(flag) = env_flag("CLONEPILOT_CANCEL_ON_DISCONNECT") {
            config.cancel_on_disconnect = flag;
        }
        config
    }
}

/// How the Chrome child process is started.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Explicit executable; otherwise `CHROME_PATH` or a PATH search.
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub launch_timeout: Duration,
    /// How long click/fill wait for their element to become visible.
    pub action_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            viewport_width: 1920,
            viewport_height: 1080,
            launch_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(30),
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Headful with the sandbox on a workstation; headless without the
    /// sandbox inside a container.
    pub fn for_host(in_container: bool) -> Self {
        Self {
            headless: in_container,
            no_sandbox: in_container,
            ..Self::default()
        }
    }

    /// [`BrowserConfig::for_host`] for the detected host (`DOCKER=1` or
    /// `/.dockerenv`), then `CHROME_PATH`, `CLONEPILOT_HEADED` and
    /// `CLONEPILOT_NO_SANDBOX`.
    pub fn from_env() -> Self {
        let in_container =
            env_flag("DOCKER") == Some(true) || std::path::Path::new("/.dockerenv").exists();
        let mut config = Self::for_host(in_container);
        if let Ok(path) = std::env::var("CHROME_PATH") {
            if !path.trim().is_empty() {
                config.executable = Some(PathBuf::from(path));
            }
        }
        if let Some(headed) = env_flag("CLONEPILOT_HEADED") {
            config.headless = !headed;
        }
        if let Some(flag) = env_flag("CLONEPILOT_NO_SANDBOX") {
            config.no_sandbox = flag;
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    parse_flag(&raw)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
