//! RMS CLI - a command-line client for the resource-management system.
//!
//! Signs in against the RMS API, keeps the session between runs, and exposes
//! the admin user-management flows (list, change role, delete).

mod commands;
mod format;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use rms_core::{open_storage, ApiError, Config, RmsClient};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "rms.log";

/// Exit code when the session expired and the user must log in again
const EXIT_SESSION_EXPIRED: u8 = 2;

/// Initialize the tracing subscriber for logging.
/// Warnings and above go to stderr; everything the filter allows also goes
/// to a daily log file when a log directory is available.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = config.cache_dir().ok();
    if let Some(ref dir) = log_dir {
        let _ = std::fs::create_dir_all(dir);
    }
    let _guard = init_tracing(log_dir.as_deref());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args, &mut config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(ApiError::SessionExpired) = e.downcast_ref::<ApiError>() {
                return ExitCode::from(EXIT_SESSION_EXPIRED);
            }
            let detail = format!("{:#}", e);
            error!(error = %detail, "Command failed");
            let message = match e.downcast_ref::<ApiError>() {
                Some(api @ ApiError::Http { .. }) => api.detail(),
                _ => detail,
            };
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String], config: &mut Config) -> Result<()> {
    let command = Command::parse(args)?;
    info!(base_url = %config.api_base_url(), "RMS CLI starting");

    let storage = open_storage(config)?;
    let client = RmsClient::from_config(config, storage)?.on_session_expired(|| {
        eprintln!("Session expired. Please log in again with `rms login`.");
    });

    commands::run(command, &client, config).await
}
