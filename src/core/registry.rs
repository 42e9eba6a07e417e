// src/core/registry.rs

//! Thread-safe membership of live peers, keyed by remote address.

use crate::core::peer::Peer;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashMap<SocketAddr, Arc<Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `peer.addr`. Reconnects overwrite
    /// the stale entry; insertion order carries no meaning.
    pub fn insert(&self, peer: Arc<Peer>) {
        self.peers.insert(peer.addr, peer);
    }

    pub fn remove(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
        self.peers.remove(addr).map(|(_, peer)| peer)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Peer>> {
        self.peers.get(addr).map(|entry| entry.value().clone())
    }

    /// A copy-out snapshot, suitable for fan-out broadcasts without holding
    /// any lock for the duration of the sends.
    pub fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.peers.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
