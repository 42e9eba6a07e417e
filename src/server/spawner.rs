// src/server/spawner.rs

//! Spawns the background tasks a running node needs: bootstrap dial
//! fan-out, the optional storage self-test, the dispatcher, the accept
//! loop, and the metrics server.

use super::context::ServerContext;
use super::{metrics_server, self_test};
use crate::core::transport;
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::warn;

pub async fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let (bootstrap_addrs, test_storage, metrics_port) = {
        let config = ctx.state.config.lock().await;
        (config.bootstrap.clone(), config.test_storage, config.metrics_port)
    };

    if let Err(e) = ctx.state.bootstrap(&bootstrap_addrs).await {
        warn!(error = %e, "some bootstrap dials failed; continuing with whatever peers connected");
    }

    if test_storage {
        self_test::run(&ctx.state).await;
    }

    let (_, empty_rx) = mpsc::channel(1);
    let inbound_rx = std::mem::replace(&mut ctx.inbound_rx, empty_rx);
    let dispatch_state = ctx.state.clone();
    let dispatch_shutdown = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        dispatch_state.run_dispatch_loop(inbound_rx, dispatch_shutdown).await;
    });

    let listener = ctx
        .listener
        .take()
        .context("listener already taken; spawn_all must run exactly once")?;
    let accept_state = ctx.state.clone();
    let accept_shutdown = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        transport::accept_loop(listener, accept_state, accept_shutdown).await;
    });

    if metrics_port != 0 {
        let metrics_state = ctx.state.clone();
        let metrics_shutdown = ctx.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run(metrics_state, metrics_port, metrics_shutdown).await;
        });
    }

    Ok(())
}
