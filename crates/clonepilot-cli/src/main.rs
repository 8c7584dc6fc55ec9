//! clonepilot CLI — drive the remote page builder from the terminal.
//!
//! Reuses the same engine (clonepilot-core) and server bootstrap
//! (clonepilot-server) that power the HTTP API.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// clonepilot — clone a website into a generated landing page
#[derive(Parser)]
#[command(name = "clonepilot", version, about = "clonepilot — clone a website into a generated landing page")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Browser launch flags shared by every command that starts sessions.
#[derive(Args, Debug, Clone)]
pub struct BrowserArgs {
    /// Show the browser window (default outside containers)
    #[arg(long, conflicts_with = "headless")]
    headed: bool,
    /// Run without a window (default inside containers)
    #[arg(long)]
    headless: bool,
    /// Disable the Chrome sandbox (needed in most containers)
    #[arg(long)]
    no_sandbox: bool,
    /// Chrome/Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Server {
        /// Host to bind to
        #[arg(long, env = "CLONEPILOT_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 5001)]
        port: u16,
        /// Directory screenshots are written to and served from
        #[arg(long, env = "CLONEPILOT_SCREENSHOTS_DIR", default_value = "screenshots")]
        screenshots_dir: PathBuf,
        /// Path to static frontend directory
        #[arg(long, env = "CLONEPILOT_STATIC_DIR")]
        static_dir: Option<String>,
        /// YAML platform profile overriding the built-in locators
        #[arg(long, env = "CLONEPILOT_PROFILE")]
        profile: Option<PathBuf>,
        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Run one clone session and print its events as JSON lines
    Run {
        /// Website to clone
        #[arg(long)]
        url: String,
        /// Extra instructions for the generator
        #[arg(long)]
        instructions: Option<String>,
        /// Directory screenshots are written to
        #[arg(long, env = "CLONEPILOT_SCREENSHOTS_DIR", default_value = "screenshots")]
        screenshots_dir: PathBuf,
        /// YAML platform profile overriding the built-in locators
        #[arg(long, env = "CLONEPILOT_PROFILE")]
        profile: Option<PathBuf>,
        /// Seconds to keep the browser open after completion
        #[arg(long)]
        linger: Option<u64>,
        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so `run` keeps stdout for events.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clonepilot_core=info,clonepilot_server=info,clonepilot_cli=info,tower_http=info"
                    .into()
            }),
        )
        .init();

    let result = match cli.command {
        Commands::Server {
            host,
            port,
            screenshots_dir,
            static_dir,
            profile,
            browser,
        } => {
            let config = clonepilot_server::ServerConfig {
                host,
                port,
                screenshots_dir,
                static_dir,
                profile,
                browser: commands::browser_config(&browser),
            };
            commands::server::run(config).await
        }

        Commands::Run {
            url,
            instructions,
            screenshots_dir,
            profile,
            linger,
            browser,
        } => {
            commands::run::run(commands::run::RunOptions {
                url,
                instructions,
                screenshots_dir,
                profile,
                linger,
                browser: commands::browser_config(&browser),
            })
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
