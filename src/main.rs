//! devicelogin - Microsoft login (Device Code)
//!
//! An interactive terminal page that signs a user in with the OAuth2 device-code
//! flow and shows who they are according to Microsoft Graph.

#![deny(clippy::all)]

mod auth;
mod config;
mod error;
mod page;
mod session;

use anyhow::{Context, Result};
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use page::PageBuilder;
use session::{DeviceFlowController, SessionState};

/// Log filter used when neither `RUST_LOG` nor the configuration provides one.
const DEFAULT_LOG_LEVEL: &str = "warn";

fn main() -> ExitCode {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        // .env file is optional - only log if it's not a "file not found" error
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let config = Config::load();

    init_logging(
        config
            .as_ref()
            .map(|c| c.logging.level.as_str())
            .unwrap_or(DEFAULT_LOG_LEVEL),
    );

    info!("Starting devicelogin v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(c) => {
            info!("Configuration loaded for tenant {}", c.auth.tenant_id);
            c
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            let page = page_builder(String::new());
            if let Err(io_err) = page.render_config_error(&mut io::stdout(), &e.user_message()) {
                eprintln!("Configuration error: {} ({})", e, io_err);
            }
            return ExitCode::FAILURE;
        }
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing/logging.
///
/// Logs go to stderr so they never interleave with the page.
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

/// Colors are only used when stdout is a terminal.
fn page_builder(default_login_url: String) -> PageBuilder {
    let page = PageBuilder::new(default_login_url);
    if io::stdout().is_terminal() {
        page
    } else {
        page.plain()
    }
}

/// Serve one session on this terminal until the user quits.
fn run(config: Config) -> Result<()> {
    // Every action runs to completion before the next one is read.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    let controller =
        DeviceFlowController::new(&config).context("Failed to create device-flow controller")?;
    let page = page_builder(config.auth.default_verification_uri.clone());
    let mut session = SessionState::new();

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout().lock();

    runtime
        .block_on(page::run(
            &controller,
            &mut session,
            &page,
            stdin,
            &mut stdout,
        ))
        .context("Terminal I/O failed")?;

    info!("Session ended");
    Ok(())
}
