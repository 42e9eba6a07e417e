// src/core/errors.rs

//! Defines the primary error type for the entire node.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the node.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("key not found")]
    NotFound,

    #[error("fetch timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("incomplete frame in stream")]
    IncompleteData,

    #[error("unsupported frame tag: {0:#04x}")]
    UnknownFrameTag(u8),

    #[error("bootstrap failed for {failed} of {attempted} addresses")]
    Bootstrap { attempted: usize, failed: usize },

    #[error("peer {0} not registered")]
    UnknownPeer(SocketAddr),

    #[error("internal error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for NodeError {
    fn clone(&self) -> Self {
        match self {
            NodeError::Io(e) => NodeError::Io(Arc::clone(e)),
            NodeError::NotFound => NodeError::NotFound,
            NodeError::Timeout => NodeError::Timeout,
            NodeError::Protocol(s) => NodeError::Protocol(s.clone()),
            NodeError::IncompleteData => NodeError::IncompleteData,
            NodeError::UnknownFrameTag(t) => NodeError::UnknownFrameTag(*t),
            NodeError::Bootstrap { attempted, failed } => NodeError::Bootstrap {
                attempted: *attempted,
                failed: *failed,
            },
            NodeError::UnknownPeer(a) => NodeError::UnknownPeer(*a),
            NodeError::Internal(s) => NodeError::Internal(s.clone()),
        }
    }
}

impl PartialEq for NodeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NodeError::Io(e1), NodeError::Io(e2)) => e1.to_string() == e2.to_string(),
            (NodeError::NotFound, NodeError::NotFound) => true,
            (NodeError::Timeout, NodeError::Timeout) => true,
            (NodeError::Protocol(s1), NodeError::Protocol(s2)) => s1 == s2,
            (NodeError::IncompleteData, NodeError::IncompleteData) => true,
            (NodeError::UnknownFrameTag(a), NodeError::UnknownFrameTag(b)) => a == b,
            (
                NodeError::Bootstrap {
                    attempted: a1,
                    failed: f1,
                },
                NodeError::Bootstrap {
                    attempted: a2,
                    failed: f2,
                },
            ) => a1 == a2 && f1 == f2,
            (NodeError::UnknownPeer(a), NodeError::UnknownPeer(b)) => a == b,
            (NodeError::Internal(s1), NodeError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for NodeError {
    fn from(e: bincode::error::EncodeError) -> Self {
        NodeError::Protocol(format!("payload encode error: {e}"))
    }
}

impl From<bincode::error::DecodeError> for NodeError {
    fn from(e: bincode::error::DecodeError) -> Self {
        NodeError::Protocol(format!("payload decode error: {e}"))
    }
}
