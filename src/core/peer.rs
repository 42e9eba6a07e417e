// src/core/peer.rs

//! A live connection to another node: remote address, serialized write
//! half, and the streaming handoff mechanism used for large payloads.

use crate::core::errors::NodeError;
use crate::core::protocol::{Frame, FrameCodec};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, oneshot};
use tokio_util::codec::Encoder;

/// A chunk of the connection's read side, handed from the per-connection
/// read loop to the dispatcher so it can consume the raw bytes that follow
/// a `Store` control frame, then handed back. Armed by dispatching a
/// `StreamHandoff` on the inbound channel, waited on by the read loop
/// awaiting `done_tx`'s reply, released exactly once by the dispatcher
/// since `oneshot::Sender` can only be used once.
pub struct StreamHandoff {
    /// Bytes the read loop's framed reader had already buffered past the
    /// control frame before the handoff (must be consumed before any new
    /// socket reads).
    pub prefetched: BytesMut,
    pub reader: tokio::net::tcp::OwnedReadHalf,
    pub done_tx: oneshot::Sender<(BytesMut, tokio::net::tcp::OwnedReadHalf)>,
}

/// A peer's write side plus bookkeeping. One instance per live connection,
/// shared by `Arc` between the registry, the dispatcher (for replies), and
/// the node (for broadcasts).
pub struct Peer {
    pub addr: SocketAddr,
    pub outbound: bool,
    writer: Mutex<OwnedWriteHalf>,
}

impl Peer {
    pub fn new(addr: SocketAddr, outbound: bool, writer: OwnedWriteHalf) -> Self {
        Self {
            addr,
            outbound,
            writer: Mutex::new(writer),
        }
    }

    /// Encodes and writes a single frame, holding the write mutex for the
    /// duration of the write.
    pub async fn send_frame(&self, frame: Frame) -> Result<(), NodeError> {
        let mut buf = BytesMut::new();
        FrameCodec.encode(frame, &mut buf)?;
        let mut w = self.writer.lock().await;
        w.write_all(&buf).await?;
        Ok(())
    }

    /// Writes a `Store`-control frame immediately followed by its raw
    /// streamed payload, holding the write mutex across both writes so no
    /// other sender can interleave a frame between them. The receiver reads
    /// exactly `size` unframed bytes right after the control frame, so that
    /// pair must land on the wire back to back.
    pub async fn send_frame_then_raw(&self, frame: Frame, bytes: &[u8]) -> Result<(), NodeError> {
        let mut buf = BytesMut::new();
        FrameCodec.encode(frame, &mut buf)?;
        let mut w = self.writer.lock().await;
        w.write_all(&buf).await?;
        w.write_all(bytes).await?;
        Ok(())
    }

    /// Writes a sequence of frames back to back, holding the write mutex for
    /// all of them so no other sender can interleave a frame in between.
    pub async fn send_frames(&self, frames: &[Frame]) -> Result<(), NodeError> {
        let mut buf = BytesMut::new();
        for frame in frames {
            FrameCodec.encode(frame.clone(), &mut buf)?;
        }
        let mut w = self.writer.lock().await;
        w.write_all(&buf).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.addr)
            .field("outbound", &self.outbound)
            .finish()
    }
}
