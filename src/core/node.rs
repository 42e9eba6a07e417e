// src/core/node.rs

//! The control plane: dispatches inbound frames, runs the store/get/delete
//! protocol, fans out to peers, and correlates fetch responses. Grounded on
//! `core/state/core.rs`'s `ServerState` for the shared-state shape and on
//! `connection/handler.rs`'s dispatch-and-reply pattern for the per-frame
//! branches.

use crate::config::Config;
use crate::core::errors::NodeError;
use crate::core::metrics;
use crate::core::pending::{FetchResult, PendingFetchRegistry, fetch_id};
use crate::core::peer::StreamHandoff;
use crate::core::protocol::{ControlCommand, Frame, MAX_PAYLOAD};
use crate::core::registry::PeerRegistry;
use crate::core::store::BlobStore;
use crate::core::transport::{self, InboundFrame};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

/// All process-wide mutable state, analogous to `ServerState`: a process
/// hosts exactly one `NodeState`, held behind `Arc` and passed by reference
/// rather than accessed as a true global.
pub struct NodeState {
    pub config: Arc<Mutex<Config>>,
    pub store: BlobStore,
    pub registry: PeerRegistry,
    pub pending: PendingFetchRegistry,
    pub inbound_tx: mpsc::Sender<InboundFrame>,
}

impl NodeState {
    pub fn new(
        config: Arc<Mutex<Config>>,
        store: BlobStore,
        inbound_tx: mpsc::Sender<InboundFrame>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            registry: PeerRegistry::new(),
            pending: PendingFetchRegistry::new(),
            inbound_tx,
        })
    }

    /// Dials every bootstrap address concurrently. Failures are aggregated
    /// and returned jointly; a node with zero successful dials still
    /// operates, since it can accept inbound connections.
    pub async fn bootstrap(self: &Arc<Self>, addrs: &[String]) -> Result<(), NodeError> {
        if addrs.is_empty() {
            return Ok(());
        }
        let results = futures::future::join_all(
            addrs
                .iter()
                .map(|addr| transport::dial(addr.clone(), self.clone())),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        for (addr, result) in addrs.iter().zip(results.iter()) {
            if let Err(e) = result {
                metrics::BOOTSTRAP_DIAL_FAILURES_TOTAL.inc();
                warn!(%addr, error = %e, "bootstrap dial failed");
            }
        }
        if failed > 0 {
            return Err(NodeError::Bootstrap {
                attempted: addrs.len(),
                failed,
            });
        }
        Ok(())
    }

    /// Writes `data` locally, then broadcasts it to every known peer:
    /// inline as a `Data` frame when it fits `MAX_PAYLOAD`, or as a
    /// `Store`-control frame immediately followed by the raw bytes on each
    /// peer's connection otherwise. Per-peer send failures are logged, not
    /// propagated; only the local write can fail the call.
    pub async fn store_bytes(self: &Arc<Self>, key: &str, data: Bytes) -> Result<u64, NodeError> {
        let size = self.store.write(key, &data).await?;
        metrics::BLOBS_STORED_TOTAL.inc();

        let peers = self.registry.snapshot();
        if peers.is_empty() {
            return Ok(size);
        }

        if (size as usize) <= MAX_PAYLOAD {
            let frame = Frame::data(key, data, HashMap::new());
            let sends = peers.iter().map(|peer| {
                let frame = frame.clone();
                async move {
                    if let Err(e) = peer.send_frame(frame).await {
                        warn!(peer = %peer.addr, error = %e, "failed to broadcast Data frame");
                    }
                }
            });
            futures::future::join_all(sends).await;
        } else {
            let mut args = HashMap::new();
            args.insert("key".to_string(), key.to_string());
            args.insert("size".to_string(), size.to_string());
            let control = Frame::control(ControlCommand::Store, args);
            let sends = peers.iter().map(|peer| {
                let control = control.clone();
                let data = data.clone();
                async move {
                    if let Err(e) = peer.send_frame_then_raw(control, &data).await {
                        warn!(peer = %peer.addr, error = %e, "failed to stream Store-Control frame and blob bytes");
                    }
                }
            });
            futures::future::join_all(sends).await;
        }
        Ok(size)
    }

    /// Reads a key locally; if absent and `broadcast` is set, fans a
    /// `FETCH` out to every peer and waits up to `fetch_timeout_ms` for the
    /// first positive response.
    pub async fn get(self: &Arc<Self>, key: &str, broadcast: bool) -> Result<Bytes, NodeError> {
        match self.store.read(key).await {
            Ok(data) => {
                metrics::BLOBS_FETCHED_TOTAL.inc();
                return Ok(data);
            }
            Err(NodeError::NotFound) => {}
            Err(e) => return Err(e),
        }

        if !broadcast {
            return Err(NodeError::NotFound);
        }

        let advertised = self.config.lock().await.advertised_addr();
        let fid = fetch_id(key, &advertised);
        let peers = self.registry.snapshot();
        let mut rx = self.pending.register(fid.clone(), peers.len()).await;
        metrics::PENDING_FETCHES.inc();

        let mut args = HashMap::new();
        args.insert("key".to_string(), key.to_string());
        args.insert("fetch_id".to_string(), fid.clone());
        let request = Frame::control(ControlCommand::Fetch, args);
        let sends = peers.iter().map(|peer| {
            let request = request.clone();
            async move {
                if let Err(e) = peer.send_frame(request).await {
                    warn!(peer = %peer.addr, error = %e, "failed to send FETCH");
                }
            }
        });
        futures::future::join_all(sends).await;

        let timeout_ms = self.config.lock().await.fetch_timeout_ms;
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            while let Some(result) = rx.recv().await {
                if result.file_exists
                    && let Some(data) = result.data
                {
                    return Some(data);
                }
            }
            None
        })
        .await;

        self.pending.deregister(&fid).await;
        metrics::PENDING_FETCHES.dec();

        match outcome {
            Ok(Some(data)) => {
                metrics::BLOBS_FETCHED_TOTAL.inc();
                Ok(data)
            }
            Ok(None) => Err(NodeError::NotFound),
            Err(_) => {
                metrics::FETCH_TIMEOUTS_TOTAL.inc();
                Err(NodeError::Timeout)
            }
        }
    }

    /// Deletes a key locally. Deletes are not replicated; the protocol has
    /// no delete-propagation message.
    pub async fn delete(self: &Arc<Self>, key: &str) -> Result<(), NodeError> {
        self.store.delete(key).await?;
        metrics::BLOBS_DELETED_TOTAL.inc();
        Ok(())
    }

    /// The single dispatcher task: pulls frames off the inbound channel and
    /// routes them by kind, until the channel closes or shutdown fires.
    pub async fn run_dispatch_loop(
        self: Arc<Self>,
        mut inbound_rx: mpsc::Receiver<InboundFrame>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("dispatcher received shutdown signal");
                    break;
                }
                frame = inbound_rx.recv() => {
                    match frame {
                        Some(inbound) => self.dispatch(inbound).await,
                        None => {
                            info!("inbound channel closed; dispatcher exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, inbound: InboundFrame) {
        let InboundFrame { frame, from, stream } = inbound;
        match frame {
            Frame::Data { key, data, metadata } => self.dispatch_data(key, data, metadata, from).await,
            Frame::Control { command, args } => self.dispatch_control(command, args, from, stream).await,
        }
    }

    async fn dispatch_data(
        self: &Arc<Self>,
        key: String,
        data: Bytes,
        metadata: HashMap<String, String>,
        from: SocketAddr,
    ) {
        match metadata.get("fetch_id") {
            Some(fid) => {
                let delivered = self
                    .pending
                    .deliver(
                        fid,
                        FetchResult {
                            file_exists: true,
                            data: Some(data),
                            peer_addr: from,
                        },
                    )
                    .await;
                if !delivered {
                    warn!(peer = %from, fetch_id = %fid, "no pending fetch for incoming fetch response; dropping");
                }
            }
            None => match self.store.write(&key, &data).await {
                Ok(_) => {
                    metrics::BLOBS_STORED_TOTAL.inc();
                    debug!(peer = %from, key = %key, "stored replicated blob");
                }
                Err(e) => error!(peer = %from, key = %key, error = %e, "failed to write replicated blob"),
            },
        }
    }

    async fn dispatch_control(
        self: &Arc<Self>,
        command: ControlCommand,
        args: HashMap<String, String>,
        from: SocketAddr,
        stream: Option<StreamHandoff>,
    ) {
        match command {
            ControlCommand::Store => self.handle_store_control(args, from, stream).await,
            ControlCommand::Fetch => self.handle_fetch_control(args, from).await,
            ControlCommand::FetchResponse => {
                debug!(peer = %from, args = ?args, "FETCH_RESPONSE noted; Data frame carries the payload");
            }
            ControlCommand::List => {
                debug!(peer = %from, "LIST control frame received (reserved, log-only)");
            }
            ControlCommand::Exit => {
                if self.registry.remove(&from).is_some() {
                    metrics::CONNECTED_PEERS.dec();
                }
                info!(peer = %from, "peer sent EXIT; removed from registry");
            }
            ControlCommand::Unknown => {
                warn!(peer = %from, args = ?args, "UNKNOWN control command; dropping");
            }
        }
    }

    async fn handle_store_control(
        self: &Arc<Self>,
        args: HashMap<String, String>,
        from: SocketAddr,
        stream: Option<StreamHandoff>,
    ) {
        let Some(mut handoff) = stream else {
            warn!(peer = %from, "STORE control frame arrived without a streamed payload; dropping");
            return;
        };

        let parsed = match (args.get("key"), args.get("size")) {
            (Some(key), Some(size)) => size.parse::<i64>().ok().filter(|s| *s >= 0).map(|s| (key.clone(), s as usize)),
            _ => None,
        };

        if let Some((key, size)) = parsed {
            match read_streamed_bytes(&mut handoff, size).await {
                Ok(bytes) => match self.store.write(&key, &bytes).await {
                    Ok(_) => {
                        metrics::BLOBS_STORED_TOTAL.inc();
                        debug!(peer = %from, key = %key, size, "stored streamed blob");
                    }
                    Err(e) => error!(peer = %from, key = %key, error = %e, "failed to write streamed blob"),
                },
                Err(e) => error!(peer = %from, error = %e, "failed reading streamed blob bytes"),
            }
        } else {
            warn!(peer = %from, args = ?args, "malformed STORE control args; missing key or size");
        }

        // Release the latch exactly once: `oneshot::Sender::send` consumes
        // `self`, so a second call site cannot exist for the same handoff.
        let _ = handoff.done_tx.send((handoff.prefetched, handoff.reader));
    }

    async fn handle_fetch_control(self: &Arc<Self>, args: HashMap<String, String>, from: SocketAddr) {
        let (key, fid) = match (args.get("key"), args.get("fetch_id")) {
            (Some(key), Some(fid)) => (key.clone(), fid.clone()),
            _ => {
                warn!(peer = %from, args = ?args, "malformed FETCH control args");
                return;
            }
        };
        let Some(peer) = self.registry.get(&from) else {
            warn!(peer = %from, "FETCH from an unregistered peer");
            return;
        };

        match self.store.read(&key).await {
            Ok(data) => {
                let mut resp_args = HashMap::new();
                resp_args.insert("file_exists".to_string(), "true".to_string());
                resp_args.insert("fetch_id".to_string(), fid.clone());
                let response = Frame::control(ControlCommand::FetchResponse, resp_args);

                let mut metadata = HashMap::new();
                metadata.insert("fetch_id".to_string(), fid);
                let payload = Frame::data(key, data, metadata);

                if let Err(e) = peer.send_frames(&[response, payload]).await {
                    warn!(peer = %from, error = %e, "failed to send FETCH_RESPONSE and Data frame");
                }
            }
            Err(NodeError::NotFound) => {
                let mut resp_args = HashMap::new();
                resp_args.insert("file_exists".to_string(), "false".to_string());
                resp_args.insert("fetch_id".to_string(), fid);
                if let Err(e) = peer
                    .send_frame(Frame::control(ControlCommand::FetchResponse, resp_args))
                    .await
                {
                    warn!(peer = %from, error = %e, "failed to send negative FETCH_RESPONSE");
                }
            }
            Err(e) => error!(peer = %from, key = %key, error = %e, "local read failed while handling FETCH"),
        }
    }
}

/// Reads exactly `size` bytes for a streamed STORE, draining any bytes the
/// framed reader had already buffered ahead of the control frame before
/// reading the remainder off the socket.
async fn read_streamed_bytes(handoff: &mut StreamHandoff, size: usize) -> Result<Vec<u8>, NodeError> {
    let mut out = Vec::with_capacity(size);
    let take = handoff.prefetched.len().min(size);
    if take > 0 {
        out.extend_from_slice(&handoff.prefetched.split_to(take));
    }
    let remaining = size - out.len();
    if remaining > 0 {
        let mut buf = vec![0u8; remaining];
        handoff.reader.read_exact(&mut buf).await?;
        out.extend_from_slice(&buf);
    }
    trace!(size, "consumed streamed blob bytes");
    Ok(out)
}
