// src/main.rs

//! The entry point for the `hyperstore` node.

use anyhow::Result;
use hyperstore::config::Config;
use hyperstore::server;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("hyperstore version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.apply_cli_overrides(&args) {
        eprintln!("Invalid command-line arguments: {e}");
        std::process::exit(1);
    }

    // Reloadable filter layer, kept wired through even though nothing in
    // this node currently reloads it at runtime.
    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    info!("starting hyperstore {VERSION}");

    if let Err(e) = server::run(config).await {
        error!("server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
