//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command.

pub mod run;
pub mod server;

use clonepilot_core::BrowserConfig;

use crate::BrowserArgs;

/// Environment defaults with the command-line flags applied on top.
pub fn browser_config(args: &BrowserArgs) -> BrowserConfig {
    let mut config = BrowserConfig::from_env();
    if args.headed {
        config.headless = false;
    }
    if args.headless {
        config.headless = true;
    }
    if args.no_sandbox {
        config.no_sandbox = true;
    }
    if let Some(path) = &args.chrome_path {
        config.executable = Some(path.clone());
    }
    config
}
