//! `clonepilot run` — Run one session in-process, one JSON event per stdout line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clonepilot_core::{
    run_session, BrowserConfig, ProgressChannel, SessionRequest, WorkflowConfig,
};
use clonepilot_server::{build_engine, ServerConfig};

pub struct RunOptions {
    pub url: String,
    pub instructions: Option<String>,
    pub screenshots_dir: PathBuf,
    pub profile: Option<PathBuf>,
    pub linger: Option<u64>,
    pub browser: BrowserConfig,
}

pub async fn run(options: RunOptions) -> Result<(), String> {
    let request = SessionRequest::new(&options.url, options.instructions.as_deref())
        .map_err(|e| e.to_string())?;

    let config = ServerConfig {
        screenshots_dir: options.screenshots_dir,
        profile: options.profile,
        browser: options.browser.clone(),
        ..ServerConfig::default()
    };
    let launcher = Arc::new(clonepilot_core::browser::ChromeLauncher::new(options.browser));
    let engine = build_engine(&config, launcher)?;

    let engine = match options.linger {
        Some(secs) => {
            let mut workflow: WorkflowConfig = engine.workflow.clone();
            workflow.linger = Duration::from_secs(secs);
            Arc::new(rebuild(engine, workflow)?)
        }
        None => engine,
    };

    let (channel, mut rx) = ProgressChannel::new();
    let session = tokio::spawn(run_session(request, engine, channel));

    while let Some(event) = rx.recv().await {
        println!("{}", event.to_json());
    }

    let report = session
        .await
        .map_err(|e| format!("Session task failed: {}", e))?;
    tracing::info!("Session {} finished", report.session_id);

    if report.outcome.is_success() {
        Ok(())
    } else {
        Err("clone session failed".to_string())
    }
}

/// Swap the timings of a freshly built engine that nothing else holds yet.
fn rebuild(
    engine: clonepilot_core::Engine,
    workflow: WorkflowConfig,
) -> Result<clonepilot_core::EngineContext, String> {
    let ctx = Arc::try_unwrap(engine).map_err(|_| "engine is already shared".to_string())?;
    Ok(ctx.with_workflow(workflow))
}
