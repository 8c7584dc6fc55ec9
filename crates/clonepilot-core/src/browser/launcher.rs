//! ChromeLauncher — starts one Chrome/Chromium child per session.
//!
//! The child gets a throw-away profile directory and `--remote-debugging-port=0`;
//! Chrome prints the chosen DevTools websocket URL on stderr, which we read
//! back before connecting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::cdp::CdpConnection;
use super::page::CdpPage;
use super::{RemoteUi, SessionLauncher};
use crate::config::BrowserConfig;
use crate::error::UiError;

const DEVTOOLS_PREFIX: &str = "DevTools listening on ";

const CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const MACOS_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn resolve_executable(&self) -> Result<PathBuf, UiError> {
        if let Some(path) = &self.config.executable {
            return Ok(path.clone());
        }
        for name in CANDIDATES {
            if let Some(path) = which(name) {
                return Ok(path);
            }
        }
        let mac = Path::new(MACOS_CHROME);
        if mac.exists() {
            return Ok(mac.to_path_buf());
        }
        Err(UiError::Launch(
            "no Chrome/Chromium executable found; set CHROME_PATH".to_string(),
        ))
    }

    fn args(&self, profile_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--remote-debugging-port=0".to_string(),
            format!("--user-data-dir={}", profile_dir.display()),
            format!(
                "--window-size={},{}",
                self.config.viewport_width, self.config.viewport_height
            ),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-popup-blocking".to_string(),
        ];
        if self.config.headless {
            args.push("--headless=new".to_string());
            args.push("--hide-scrollbars".to_string());
        }
        if self.config.no_sandbox {
            args.extend(
                [
                    "--no-sandbox",
                    "--disable-setuid-sandbox",
                    "--disable-dev-shm-usage",
                    "--disable-gpu",
                    "--disable-software-rasterizer",
                ]
                .map(String::from),
            );
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn RemoteUi>, UiError> {
        let executable = self.resolve_executable()?;
        let profile = tempfile::Builder::new()
            .prefix("clonepilot-profile-")
            .tempdir()?;

        tracing::info!(
            "Launching browser {} ({})",
            executable.display(),
            if self.config.headless { "headless" } else { "headful" }
        );

        let mut child = Command::new(&executable)
            .args(self.args(profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                UiError::Launch(format!("failed to spawn '{}': {}", executable.display(), e))
            })?;

        let ws_url = match tokio::time::timeout(
            self.config.launch_timeout,
            read_devtools_url(&mut child),
        )
        .await
        {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(UiError::timeout(
                    "DevTools endpoint",
                    self.config.launch_timeout,
                ));
            }
        };
        tracing::debug!("DevTools endpoint: {}", ws_url);

        let conn = match CdpConnection::connect(&ws_url).await {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        let page = CdpPage::attach(conn, child, profile, &self.config).await?;
        Ok(Box::new(page))
    }
}

/// Read stderr until Chrome announces its websocket URL. The rest of stderr is
/// drained in the background so the child never blocks on a full pipe.
async fn read_devtools_url(child: &mut Child) -> Result<String, UiError> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| UiError::Launch("no stderr on browser process".to_string()))?;
    let mut lines = BufReader::new(stderr).lines();

    while let Some(line) = lines.next_line().await? {
        if let Some(url) = parse_devtools_line(&line) {
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!("[chrome stderr] {}", line);
                }
            });
            return Ok(url);
        }
        tracing::trace!("[chrome stderr] {}", line);
    }

    Err(UiError::Launch(
        "browser exited before announcing a DevTools endpoint".to_string(),
    ))
}

fn parse_devtools_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(DEVTOOLS_PREFIX)?;
    rest.starts_with("ws://").then(|| rest.trim().to_string())
}

fn which(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
