//! garden-tracker: command-line driver for MindGarden tracking.
//!
//! Loads the TOML config, initialises logging, and runs one subcommand
//! against Supabase or, with `--offline` or missing credentials, against
//! the in-memory backend.

mod cli;
mod commands;

use tracing_subscriber::EnvFilter;

use garden_config::schema::{GardenConfig, LogLevel, LoggingConfig};

/// Filter directive for a `--log-level` value: bare levels apply to the
/// garden crates, anything with `=` is passed through.
fn log_directive(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("garden={}", level.trim().to_ascii_lowercase())
    }
}

fn init_logging(log_level: Option<&str>, logging: &LoggingConfig) {
    // --log-level beats RUST_LOG, which beats the config file.
    let filter = match log_level {
        Some(level) => EnvFilter::new(log_directive(level)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logging.level.directive())),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.show_targets)
        .init();
}

fn load_config(args: &cli::Args) -> (GardenConfig, Option<garden_common::ConfigError>) {
    let loaded = match &args.config {
        Some(path) => garden_config::load_config_from(path),
        None => garden_config::load_config(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(e) => {
            let mut config = GardenConfig::default();
            garden_config::env::apply_env_overrides(&mut config);
            (config, Some(e))
        }
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse();
    let (config, load_error) = load_config(&args);

    init_logging(args.log_level.as_deref(), &config.logging);
    tracing::info!("garden-tracker v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(path) = &args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    if let Some(e) = load_error {
        tracing::warn!("Config load failed, using defaults: {e}");
    }
    if config.logging.level == LogLevel::Trace {
        tracing::trace!(config = ?config, "Effective config");
    }

    if let Err(e) = commands::run(args, config).await {
        tracing::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
