//! clonepilot Server — HTTP front for the clone workflow engine.
//!
//! - `GET /api/clone-stream?url=&prompt=` runs one session and streams its
//!   progress events as Server-Sent Events
//! - `POST /api/clone` points callers at the streaming endpoint
//! - `GET /api/health` liveness check
//! - `/screenshots/*` serves captured screenshots
//!
//! The engine itself lives in `clonepilot-core`; this crate only adapts it to
//! axum.

pub mod api;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clonepilot_core::artifacts::ArtifactStore;
use clonepilot_core::browser::{ChromeLauncher, SessionLauncher};
use clonepilot_core::{BrowserConfig, Credentials, EngineContext, PlatformProfile, WorkflowConfig};

/// Shared state handed to every handler.
pub type AppState = clonepilot_core::Engine;

/// URL prefix under which screenshots are served.
pub const SCREENSHOTS_PREFIX: &str = "/screenshots";

/// Configuration for the clonepilot HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub screenshots_dir: PathBuf,
    /// Optional path to static frontend files.
    /// When set, the server serves these files for all non-API routes.
    pub static_dir: Option<String>,
    /// Optional YAML platform profile; defaults (plus env overrides) otherwise.
    pub profile: Option<PathBuf>,
    pub browser: BrowserConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            screenshots_dir: PathBuf::from("screenshots"),
            static_dir: None,
            profile: None,
            browser: BrowserConfig::default(),
        }
    }
}

/// Initialize the global tracing subscriber (stderr, `RUST_LOG` aware).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clonepilot_server=info,clonepilot_core=info,tower_http=info".into()
            }),
        )
        .try_init();
}

/// Build the engine from a server config: screenshots directory, platform
/// profile, env-driven timings and credentials, and a Chrome launcher.
pub fn create_app_state(config: &ServerConfig) -> Result<AppState, String> {
    let launcher: Arc<dyn SessionLauncher> = Arc::new(ChromeLauncher::new(config.browser.clone()));
    build_engine(config, launcher)
}

/// Same as [`create_app_state`] with a caller-supplied launcher.
pub fn build_engine(
    config: &ServerConfig,
    launcher: Arc<dyn SessionLauncher>,
) -> Result<AppState, String> {
    let artifacts = ArtifactStore::new(&config.screenshots_dir, SCREENSHOTS_PREFIX);
    artifacts.ensure_dir().map_err(|e| {
        format!(
            "Failed to create screenshots directory {}: {}",
            config.screenshots_dir.display(),
            e
        )
    })?;

    let platform = match &config.profile {
        Some(path) => PlatformProfile::load(path).map_err(|e| e.to_string())?,
        None => PlatformProfile::from_env(),
    };

    let credentials = Credentials::from_env();
    if credentials.is_none() {
        tracing::warn!("ANIMA_EMAIL / ANIMA_PASSWORD not set; sessions that hit a login prompt will fail");
    }

    let engine = EngineContext::new(launcher, artifacts)
        .with_workflow(WorkflowConfig::from_env())
        .with_platform(platform)
        .with_credentials(credentials)
        .into_engine();
    Ok(engine)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    init_tracing();

    tracing::info!(
        "Starting clonepilot server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config)?;

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let app = build_router(&config, state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("🚀 clonepilot server listening on http://{}", local_addr);
    tracing::info!("🔗 Stream endpoint: GET http://{}/api/clone-stream?url=<website-url>", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

/// The complete application router: API, health, screenshots, optional frontend.
pub fn build_router(config: &ServerConfig, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let screenshots = tower_http::services::ServeDir::new(state.artifacts.dir());

    let mut app = Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .nest_service(SCREENSHOTS_PREFIX, screenshots)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Serve static frontend files if configured
    if let Some(ref static_dir) = config.static_dir {
        let static_path = std::path::Path::new(static_dir);
        if static_path.exists() && static_path.is_dir() {
            tracing::info!("Serving static frontend from: {}", static_dir);
            let serve_dir = tower_http::services::ServeDir::new(static_dir).not_found_service(
                tower_http::services::ServeFile::new(static_path.join("index.html")),
            );
            app = app.fallback_service(serve_dir);
        } else {
            tracing::warn!(
                "Static directory not found: {}. Frontend won't be served.",
                static_dir
            );
        }
    }

    app
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "message": "Server is running",
    }))
}
