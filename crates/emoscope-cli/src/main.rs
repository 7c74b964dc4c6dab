//! emoscope - command-line client for the emotion analysis service.
//!
//! Holds one session per process: restores it from the token store, logs in
//! and out, and checks which views the current account may open.

mod cli;
mod commands;
mod format;
mod logging;

use anyhow::Result;
use tracing::{debug, info};

use emoscope_core::Config;

use commands::CommandContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run 'emoscope --help' for usage.");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return Ok(());
    }
    if args.version {
        cli::print_version();
        return Ok(());
    }
    let Some(command) = args.command else {
        cli::print_help();
        return Ok(());
    };

    let mut config = match args.config {
        Some(ref path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load()?,
    };
    if let Some(url) = args.api_url {
        config.api_base_url = url;
    }

    let log_dir = config.data_dir().ok();
    let _log_guard = logging::init(args.log_level.as_deref(), log_dir.as_deref());
    info!(api = %config.api_base_url, "emoscope starting");
    debug!(?command, backend = ?config.token_backend, "Running command");

    let session = config.session()?;
    let result = commands::run(
        command,
        CommandContext {
            session: &session,
            config: &mut config,
            config_path: args.config.as_deref(),
        },
    )
    .await;

    if let Err(ref e) = result {
        debug!(error = ?e, "Command failed");
    }
    result
}
