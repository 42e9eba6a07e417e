// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

/// Orchestrates node startup: builds shared state, spawns background
/// tasks, then runs the accept loop until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let mut ctx = initialization::setup(config).await?;
    spawner::spawn_all(&mut ctx).await?;
    connection_loop::run(ctx).await;
    Ok(())
}
