// tests/node_integration_test.rs

//! End-to-end scenarios over real loopback TCP connections between two
//! in-process nodes, covering the replication, streaming, and fetch
//! correlation behavior described for the control plane.

use bytes::Bytes;
use hyperstore::config::{Config, IntoMutex, PathTransformKind};
use hyperstore::core::node::NodeState;
use hyperstore::core::path::PathTransform;
use hyperstore::core::store::BlobStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

struct TestNode {
    state: Arc<NodeState>,
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    _storage_dir: TempDir,
}

async fn spawn_node(fetch_timeout_ms: u64) -> TestNode {
    let storage_dir = TempDir::new().unwrap();
    let store = BlobStore::new(
        storage_dir.path().to_path_buf(),
        PathTransform::from_kind(PathTransformKind::ContentAddressable),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = addr.port();
    config.fetch_timeout_ms = fetch_timeout_ms;
    let config = config.into_mutex();

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(32);
    let state = NodeState::new(config, store, inbound_tx);
    let (shutdown_tx, _) = broadcast::channel(4);

    let dispatch_state = state.clone();
    let dispatch_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        dispatch_state.run_dispatch_loop(inbound_rx, dispatch_shutdown).await;
    });

    let accept_state = state.clone();
    let accept_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        hyperstore::core::transport::accept_loop(listener, accept_state, accept_shutdown).await;
    });

    TestNode {
        state,
        addr,
        shutdown_tx,
        _storage_dir: storage_dir,
    }
}

async fn connect(a: &TestNode, b: &TestNode) {
    a.state.bootstrap(&[b.addr.to_string()]).await.unwrap();
    // Give the accept side time to register the peer.
    wait_until(|| async { a.state.registry.len() >= 1 }).await;
    wait_until(|| async { b.state.registry.len() >= 1 }).await;
}

async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within timeout");
}

#[tokio::test]
async fn s1_local_inline_round_trip() {
    let node = spawn_node(500).await;
    node.state
        .store_bytes("hello", Bytes::from_static(b"world"))
        .await
        .unwrap();
    let data = node.state.get("hello", false).await.unwrap();
    assert_eq!(&data[..], b"world");
    let _ = node.shutdown_tx.send(());
}

#[tokio::test]
async fn s2_two_node_inline_replication() {
    let a = spawn_node(500).await;
    let b = spawn_node(500).await;
    connect(&b, &a).await;

    a.state.store_bytes("k", Bytes::from_static(b"abc")).await.unwrap();

    wait_until(|| async { b.state.get("k", false).await.is_ok() }).await;
    let data = b.state.get("k", false).await.unwrap();
    assert_eq!(&data[..], b"abc");

    let _ = a.shutdown_tx.send(());
    let _ = b.shutdown_tx.send(());
}

#[tokio::test]
async fn s3_large_blob_streams_past_max_payload() {
    let a = spawn_node(500).await;
    let b = spawn_node(500).await;
    connect(&b, &a).await;

    let payload = Bytes::from(vec![0x41u8; 4096]);
    a.state.store_bytes("big", payload.clone()).await.unwrap();

    wait_until(|| async { b.state.get("big", false).await.is_ok() }).await;
    let data = b.state.get("big", false).await.unwrap();
    assert_eq!(data.len(), 4096);
    assert_eq!(&data[..], &payload[..]);

    let _ = a.shutdown_tx.send(());
    let _ = b.shutdown_tx.send(());
}

#[tokio::test]
async fn s4_remote_fetch_hit() {
    let a = spawn_node(500).await;
    let b = spawn_node(500).await;
    connect(&b, &a).await;

    // Written directly through A's local store, bypassing replication
    // broadcast, so B must genuinely go over the wire via FETCH.
    a.state.store.write("q", b"Q").await.unwrap();

    let data = b.state.get("q", true).await.unwrap();
    assert_eq!(&data[..], b"Q");

    let _ = a.shutdown_tx.send(());
    let _ = b.shutdown_tx.send(());
}

#[tokio::test]
async fn s5_remote_fetch_miss_times_out() {
    let a = spawn_node(150).await;
    let b = spawn_node(150).await;
    connect(&b, &a).await;

    let result = b.state.get("ghost", true).await;
    assert!(matches!(result, Err(hyperstore::core::NodeError::Timeout)));
    assert!(b.state.pending.is_empty().await);

    let _ = a.shutdown_tx.send(());
    let _ = b.shutdown_tx.send(());
}

#[tokio::test]
async fn s6_peer_disconnect_removes_it_from_registry() {
    let node = spawn_node(500).await;

    let stream = tokio::net::TcpStream::connect(node.addr).await.unwrap();
    let client_addr = stream.local_addr().unwrap();

    wait_until(|| async { node.state.registry.get(&client_addr).is_some() }).await;
    assert_eq!(node.state.registry.len(), 1);

    // Killing the peer's side of the connection should surface as EOF on
    // the node's read loop within its next read, pruning the registry.
    drop(stream);

    wait_until(|| async { node.state.registry.get(&client_addr).is_none() }).await;
    assert!(node.state.registry.snapshot().is_empty());

    // A subsequent store must not attempt to send to the now-dead peer and
    // must still succeed locally.
    node.state
        .store_bytes("after-disconnect", Bytes::from_static(b"ok"))
        .await
        .unwrap();

    let _ = node.shutdown_tx.send(());
}

#[tokio::test]
async fn fetch_ids_do_not_interfere_across_concurrent_calls() {
    let a = spawn_node(500).await;
    let b = spawn_node(500).await;
    connect(&b, &a).await;

    a.state.store.write("x", b"X").await.unwrap();
    a.state.store.write("y", b"Y").await.unwrap();

    let (x, y) = tokio::join!(b.state.get("x", true), b.state.get("y", true));
    assert_eq!(&x.unwrap()[..], b"X");
    assert_eq!(&y.unwrap()[..], b"Y");

    let _ = a.shutdown_tx.send(());
    let _ = b.shutdown_tx.send(());
}
