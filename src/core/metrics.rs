// src/core/metrics.rs

//! Defines and registers Prometheus metrics for node monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifetime.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, TextEncoder, register_counter, register_gauge,
};

lazy_static! {
    // --- Peer / transport gauges ---
    /// The number of peers currently tracked in the peer registry.
    pub static ref CONNECTED_PEERS: Gauge =
        register_gauge!("hyperstore_connected_peers", "Number of currently connected peers.").unwrap();
    /// The number of fetches awaiting a response.
    pub static ref PENDING_FETCHES: Gauge =
        register_gauge!("hyperstore_pending_fetches", "Number of in-flight fetch calls.").unwrap();

    // --- Transport counters ---
    /// The total number of inbound frames handed to the dispatcher.
    pub static ref FRAMES_RECEIVED_TOTAL: Counter =
        register_counter!("hyperstore_frames_received_total", "Total number of frames received from peers.").unwrap();
    /// The total number of inbound frames dropped because the inbound channel was full.
    pub static ref FRAMES_DROPPED_TOTAL: Counter =
        register_counter!("hyperstore_frames_dropped_total", "Total number of frames dropped due to a full inbound channel.").unwrap();
    /// The total number of bootstrap dial attempts that failed.
    pub static ref BOOTSTRAP_DIAL_FAILURES_TOTAL: Counter =
        register_counter!("hyperstore_bootstrap_dial_failures_total", "Total number of failed bootstrap dial attempts.").unwrap();

    // --- Control-plane counters ---
    /// The total number of blobs written to local storage.
    pub static ref BLOBS_STORED_TOTAL: Counter =
        register_counter!("hyperstore_blobs_stored_total", "Total number of blobs written to local storage.").unwrap();
    /// The total number of blobs served to a fetch, local or remote.
    pub static ref BLOBS_FETCHED_TOTAL: Counter =
        register_counter!("hyperstore_blobs_fetched_total", "Total number of blobs returned by get().").unwrap();
    /// The total number of blobs removed from local storage.
    pub static ref BLOBS_DELETED_TOTAL: Counter =
        register_counter!("hyperstore_blobs_deleted_total", "Total number of blobs removed from local storage.").unwrap();
    /// The total number of remote fetches that timed out.
    pub static ref FETCH_TIMEOUTS_TOTAL: Counter =
        register_counter!("hyperstore_fetch_timeouts_total", "Total number of remote fetches that timed out.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
