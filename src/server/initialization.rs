// src/server/initialization.rs

//! Builds the `ServerContext`: binds the listener, creates the storage base
//! directory, and wires up the node's shared state.

use super::context::ServerContext;
use crate::config::{Config, IntoMutex, log_startup_info};
use crate::core::node::NodeState;
use crate::core::path::PathTransform;
use crate::core::store::BlobStore;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    tokio::fs::create_dir_all(&config.file_storage_path)
        .await
        .with_context(|| format!("failed to create storage directory '{}'", config.file_storage_path))?;

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind listener on '{}'", config.listen_addr()))?;
    info!("listening on {}", config.listen_addr());

    let channel_capacity = config.inbound_channel_capacity;
    let metrics_port = config.metrics_port;
    let transform = PathTransform::from_kind(config.path_transform);
    let store = BlobStore::new(config.file_storage_path.clone(), transform);

    let (inbound_tx, inbound_rx) = mpsc::channel(channel_capacity);
    let config_mutex = config.into_mutex();
    let state = NodeState::new(config_mutex, store, inbound_tx);

    let (shutdown_tx, _) = broadcast::channel(1);

    Ok(ServerContext {
        state,
        listener: Some(listener),
        inbound_rx,
        shutdown_tx,
        background_tasks: tokio::task::JoinSet::new(),
        metrics_port,
    })
}
