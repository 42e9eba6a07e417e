// src/core/pending.rs

//! Correlates in-flight `get(key, broadcast=true)` calls with the fetch
//! responses that answer them.

use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{RwLock, mpsc};

/// What a positive or negative `FETCH_RESPONSE`/`Data` pair resolves a
/// pending fetch to.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub file_exists: bool,
    pub data: Option<Bytes>,
    pub peer_addr: SocketAddr,
}

#[derive(Debug, Default)]
pub struct PendingFetchRegistry {
    inner: RwLock<HashMap<String, mpsc::Sender<FetchResult>>>,
}

impl PendingFetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending fetch under `fetch_id`, returning the
    /// receiving half the caller waits on. Invariant: at most one entry per
    /// `fetch_id`; callers derive `fetch_id` so collisions within a single
    /// node's lifetime are not expected, but a reinsertion simply replaces
    /// the prior sender, same as the peer registry's reconnect semantics.
    pub async fn register(&self, fetch_id: String, capacity: usize) -> mpsc::Receiver<FetchResult> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.inner.write().await.insert(fetch_id, tx);
        rx
    }

    /// Delivers a result to the fetch registered under `fetch_id`, if any.
    /// Non-blocking: a full or closed channel is treated as "no entry" and
    /// logged by the caller, not retried.
    pub async fn deliver(&self, fetch_id: &str, result: FetchResult) -> bool {
        let guard = self.inner.read().await;
        match guard.get(fetch_id) {
            Some(tx) => tx.try_send(result).is_ok(),
            None => false,
        }
    }

    /// Removes the entry for `fetch_id`. Always called on fetch return
    /// (success, timeout, or error) so no entry outlives its call.
    pub async fn deregister(&self, fetch_id: &str) {
        self.inner.write().await.remove(fetch_id);
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// `fetch_id = hex(SHA1(key ‖ local_listen_address))`, used to correlate a
/// fetch request with its response.
pub fn fetch_id(key: &str, local_listen_address: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(local_listen_address.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_id_is_deterministic_and_key_sensitive() {
        let a = fetch_id("k", "localhost:5001");
        let b = fetch_id("k", "localhost:5001");
        let c = fetch_id("other", "localhost:5001");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 40);
    }

    #[tokio::test]
    async fn delivery_reaches_only_the_matching_fetch_id() {
        let registry = PendingFetchRegistry::new();
        let mut rx_a = registry.register("fetch-a".to_string(), 4).await;
        let mut rx_b = registry.register("fetch-b".to_string(), 4).await;

        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert!(
            registry
                .deliver(
                    "fetch-a",
                    FetchResult {
                        file_exists: true,
                        data: Some(Bytes::from_static(b"x")),
                        peer_addr: peer,
                    }
                )
                .await
        );

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        registry.deregister("fetch-a").await;
        registry.deregister("fetch-b").await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn delivery_to_unknown_fetch_id_is_a_noop() {
        let registry = PendingFetchRegistry::new();
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let delivered = registry
            .deliver(
                "no-such-fetch",
                FetchResult {
                    file_exists: false,
                    data: None,
                    peer_addr: peer,
                },
            )
            .await;
        assert!(!delivered);
    }
}
