// src/server/connection_loop.rs

//! Waits for a shutdown signal or an unexpected background-task exit, then
//! runs the graceful shutdown sequence.

use super::context::ServerContext;
use std::time::Duration;
use tracing::{error, info, warn};

#[cfg(windows)]
use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

async fn await_shutdown_signal() {
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    #[cfg(windows)]
    let mut ctrl_c = signal::ctrl_c().expect("failed to install Ctrl+C handler");

    tokio::select! {
        _ = async { #[cfg(unix)] { sigint.recv().await; info!("SIGINT received, initiating graceful shutdown"); } } => {},
        _ = async { #[cfg(unix)] { sigterm.recv().await; info!("SIGTERM received, initiating graceful shutdown"); } } => {},
        _ = async { #[cfg(windows)] { ctrl_c.await; info!("Ctrl-C received, initiating graceful shutdown"); } } => {},
    }
}

pub async fn run(mut ctx: ServerContext) {
    loop {
        tokio::select! {
            biased;
            _ = await_shutdown_signal() => {
                break;
            }
            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(()) => info!("a background task exited"),
                    Err(e) if e.is_panic() => error!("a background task panicked: {e:?}"),
                    Err(e) => warn!("a background task was cancelled: {e:?}"),
                }
            }
        }
    }

    info!("shutting down; broadcasting shutdown signal to all tasks");
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("no background tasks were listening for the shutdown signal");
    }

    info!("waiting for background tasks to finish");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("timed out waiting for background tasks to finish cleanly");
    }
    info!("node shutdown complete");
}
