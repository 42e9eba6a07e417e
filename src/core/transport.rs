// src/core/transport.rs

//! TCP listener and dialer, and the per-connection read loop. Grounded on
//! `server/connection_loop.rs`'s accept loop and `core/replication/worker.rs`'s
//! dial pattern, generalized from a single replica connection to an
//! arbitrary mesh of peers.

use crate::core::node::NodeState;
use crate::core::metrics;
use crate::core::peer::{Peer, StreamHandoff};
use crate::core::protocol::{ControlCommand, Frame, FrameCodec};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, trace, warn};

/// A frame handed from a connection's read loop to the dispatcher. `stream`
/// is present only for `Store`-control frames, carrying the raw-byte
/// handoff described in `core::peer::StreamHandoff`.
pub struct InboundFrame {
    pub frame: Frame,
    pub from: SocketAddr,
    pub stream: Option<StreamHandoff>,
}

/// Dials `addr` and spawns its connection task. Returns once the TCP
/// connection is established; the session itself runs in the background.
pub async fn dial(addr: String, state: Arc<NodeState>) -> Result<(), crate::core::errors::NodeError> {
    let stream = TcpStream::connect(&addr).await?;
    let peer_addr = stream.peer_addr()?;
    info!(peer = %peer_addr, %addr, "dialed bootstrap peer");
    spawn_connection(stream, peer_addr, true, state);
    Ok(())
}

/// Accepts inbound connections until `shutdown_rx` fires.
pub async fn accept_loop(
    listener: tokio::net::TcpListener,
    state: Arc<NodeState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!("listener received shutdown signal");
                break;
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, addr)) => {
                        info!(peer = %addr, "accepted inbound connection");
                        spawn_connection(stream, addr, false, state.clone());
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                }
            }
        }
    }
}

fn spawn_connection(stream: TcpStream, addr: SocketAddr, outbound: bool, state: Arc<NodeState>) {
    tokio::spawn(async move {
        if let Err(e) = run_connection(stream, addr, outbound, state.clone()).await {
            warn!(peer = %addr, error = %e, "connection terminated with an error");
        }
        if state.registry.remove(&addr).is_some() {
            metrics::CONNECTED_PEERS.dec();
        }
        info!(peer = %addr, "connection closed; peer removed from registry");
    });
}

async fn run_connection(
    stream: TcpStream,
    addr: SocketAddr,
    outbound: bool,
    state: Arc<NodeState>,
) -> Result<(), crate::core::errors::NodeError> {
    // Handshake hook: intentionally a no-op, no auth or confidentiality layer.
    let (read_half, write_half) = stream.into_split();
    let peer = Arc::new(Peer::new(addr, outbound, write_half));
    // On-peer hook: register into the Peer Registry.
    state.registry.insert(peer);
    metrics::CONNECTED_PEERS.inc();
    info!(peer = %addr, outbound, "peer registered");

    read_loop(read_half, addr, state).await
}

/// Repeatedly decodes one frame at a time, stamping the sender address and
/// forwarding to the shared inbound channel. `Store`-control frames trigger
/// the streaming handoff: the read loop hands its raw reader to the
/// dispatcher and waits to get it back before decoding further frames.
async fn read_loop(
    read_half: tokio::net::tcp::OwnedReadHalf,
    addr: SocketAddr,
    state: Arc<NodeState>,
) -> Result<(), crate::core::errors::NodeError> {
    let mut framed = FramedRead::new(read_half, FrameCodec);
    let mut message_count: u64 = 0;

    loop {
        match framed.next().await {
            Some(Ok(Frame::Control {
                command: ControlCommand::Store,
                args,
            })) => {
                message_count += 1;
                trace!(peer = %addr, message_count, "received message");

                let prefetched = framed.read_buffer_mut().split();
                let reader = framed.into_inner();
                let (done_tx, done_rx) = oneshot::channel();
                let inbound = InboundFrame {
                    frame: Frame::Control {
                        command: ControlCommand::Store,
                        args,
                    },
                    from: addr,
                    stream: Some(StreamHandoff {
                        prefetched,
                        reader,
                        done_tx,
                    }),
                };

                match state.inbound_tx.try_send(inbound) {
                    Ok(()) => {
                        metrics::FRAMES_RECEIVED_TOTAL.inc();
                        match done_rx.await {
                            Ok((leftover, reader)) => {
                                framed = FramedRead::new(reader, FrameCodec);
                                *framed.read_buffer_mut() = leftover;
                            }
                            Err(_) => {
                                warn!(peer = %addr, "dispatcher dropped before releasing the stream latch");
                                return Ok(());
                            }
                        }
                    }
                    Err(tokio::sync::mpsc::error::TrySendError::Full(returned))
                    | Err(tokio::sync::mpsc::error::TrySendError::Closed(returned)) => {
                        metrics::FRAMES_DROPPED_TOTAL.inc();
                        warn!(
                            peer = %addr,
                            "inbound channel full; dropping Store-Control frame without arming the stream latch"
                        );
                        if let Some(stream) = returned.stream {
                            framed = FramedRead::new(stream.reader, FrameCodec);
                            *framed.read_buffer_mut() = stream.prefetched;
                        }
                    }
                }
            }
            Some(Ok(frame)) => {
                message_count += 1;
                trace!(peer = %addr, message_count, "received message");
                let is_exit = matches!(
                    frame,
                    Frame::Control {
                        command: ControlCommand::Exit,
                        ..
                    }
                );
                let inbound = InboundFrame {
                    frame,
                    from: addr,
                    stream: None,
                };
                if state.inbound_tx.try_send(inbound).is_err() {
                    metrics::FRAMES_DROPPED_TOTAL.inc();
                    warn!(peer = %addr, "inbound channel full; dropping frame");
                } else {
                    metrics::FRAMES_RECEIVED_TOTAL.inc();
                }
                if is_exit {
                    info!(peer = %addr, message_count, "peer sent EXIT; ending read loop");
                    return Ok(());
                }
            }
            Some(Err(e)) => {
                warn!(peer = %addr, error = %e, "frame decode error; closing connection");
                return Err(e);
            }
            None => {
                debug!(peer = %addr, message_count, "connection closed by peer (EOF)");
                return Ok(());
            }
        }
    }
}
