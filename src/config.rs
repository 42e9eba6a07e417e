// src/config.rs

//! Manages node configuration: loading from an optional TOML file, CLI flag
//! overrides, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// A simple wrapper to allow the config to be shared behind a mutex, matching
/// the way other ambient state (peer registry, pending fetches) is wrapped.
pub trait IntoMutex: Sized {
    fn into_mutex(self) -> Arc<Mutex<Self>>;
}

impl IntoMutex for Config {
    fn into_mutex(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }
}

/// Which path-transform a node uses to derive the on-disk location of a key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PathTransformKind {
    /// Stores each key directly under `<base>/<key>/<key>`. Mostly useful for tests.
    Identity,
    /// Hashes the key with SHA-1 and fans it out into a 4-level directory tree.
    #[default]
    ContentAddressable,
}

/// The node's full runtime configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Host to bind the TCP listener on.
    pub host: String,
    /// Port to bind the TCP listener on.
    pub port: u16,
    /// Peer addresses to dial at startup, in `host:port` form.
    pub bootstrap: Vec<String>,
    /// Path to the (currently unused) metadata database; accepted for future use.
    pub db_path: String,
    /// Base directory under which blobs are stored.
    pub file_storage_path: String,
    /// Which path-transform variant to use for the on-disk layout.
    pub path_transform: PathTransformKind,
    /// Log level / `RUST_LOG`-style filter string.
    pub log_level: String,
    /// Capacity of the bounded inbound-frame channel shared by all connections.
    pub inbound_channel_capacity: usize,
    /// How long `get(key, broadcast=true)` waits for a remote response.
    pub fetch_timeout_ms: u64,
    /// Port the Prometheus `/metrics` endpoint listens on. `0` disables it.
    pub metrics_port: u16,
    /// If set, the node runs a local store/get/delete self-test after startup.
    pub test_storage: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bootstrap: Vec::new(),
            db_path: default_db_path(),
            file_storage_path: String::new(),
            path_transform: PathTransformKind::default(),
            log_level: default_log_level(),
            inbound_channel_capacity: default_inbound_channel_capacity(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            metrics_port: default_metrics_port(),
            test_storage: false,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_db_path() -> String {
    "./data/metadata.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_inbound_channel_capacity() -> usize {
    32
}
fn default_fetch_timeout_ms() -> u64 {
    5000
}
fn default_metrics_port() -> u16 {
    9090
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn from_file(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port must be non-zero"));
        }
        if self.inbound_channel_capacity == 0 {
            return Err(anyhow!("inbound_channel_capacity must be non-zero"));
        }
        Ok(())
    }

    /// Applies the `--listen`, `--port`, `--bootstrap`, `--db`,
    /// `--file-storage-path`, and `--test-storage` CLI overrides on top of
    /// whatever was loaded from the config file.
    pub fn apply_cli_overrides(&mut self, args: &[String]) -> Result<()> {
        if let Some(listen) = flag_value(args, "--listen") {
            let (host, port) = parse_listen_addr(&listen)?;
            self.host = host;
            self.port = port;
        }
        if let Some(port) = flag_value(args, "--port") {
            self.port = port
                .parse()
                .with_context(|| format!("invalid --port value '{port}'"))?;
        }
        if let Some(csv) = flag_value(args, "--bootstrap") {
            self.bootstrap = csv
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(db) = flag_value(args, "--db") {
            self.db_path = db;
        }
        if let Some(path) = flag_value(args, "--file-storage-path") {
            self.file_storage_path = path;
        }
        if let Some(val) = flag_value(args, "--test-storage") {
            self.test_storage = matches!(val.as_str(), "1" | "true" | "yes");
        } else if args.iter().any(|a| a == "--test-storage") {
            self.test_storage = true;
        }

        if self.file_storage_path.is_empty() {
            self.file_storage_path = format!("node-{}-{}-storage", self.host, self.port);
        }
        Ok(())
    }

    /// The address other nodes should use to reach this one. A leading `:`
    /// in `--listen` is rewritten to `localhost:<port>` here, matching §6.
    pub fn advertised_addr(&self) -> String {
        if self.host.is_empty() || self.host == "0.0.0.0" {
            format!("localhost:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Finds `--flag value` in an argv-style slice.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Parses a `--listen` value, rewriting a bare `:port` into `localhost:port`.
fn parse_listen_addr(raw: &str) -> Result<(String, u16)> {
    let raw = if let Some(port) = raw.strip_prefix(':') {
        format!("localhost:{port}")
    } else {
        raw.to_string()
    };
    let (host, port_str) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("invalid --listen address '{raw}', expected host:port"))?;
    let port: u16 = port_str
        .parse()
        .with_context(|| format!("invalid port in --listen address '{raw}'"))?;
    Ok((host.to_string(), port))
}

/// Logs key configuration parameters at startup.
pub fn log_startup_info(config: &Config) {
    info!(
        "Node listening on {} (advertised as {})",
        config.listen_addr(),
        config.advertised_addr()
    );
    if config.bootstrap.is_empty() {
        warn!("No bootstrap peers configured; node starts isolated until dialed.");
    } else {
        info!("Bootstrap peers: {:?}", config.bootstrap);
    }
    info!(
        "Storage base directory: {} (transform: {:?})",
        config.file_storage_path, config.path_transform
    );
}
