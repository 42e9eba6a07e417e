// src/server/context.rs

//! Bundles everything `initialization::setup` produces and `connection_loop`
//! consumes.

use crate::core::node::NodeState;
use crate::core::transport::InboundFrame;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

pub struct ServerContext {
    pub state: Arc<NodeState>,
    pub listener: Option<TcpListener>,
    pub inbound_rx: mpsc::Receiver<InboundFrame>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
    pub metrics_port: u16,
}
