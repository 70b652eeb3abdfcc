//! Configuration system for Mosaic.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MOSAIC_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/mosaic/config.toml
//!   3. ~/.config/mosaic/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::chunk::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::message::{Node, NodeParseError};

/// Default TCP port a node listens on.
pub const DEFAULT_PORT: u16 = 7400;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MosaicConfig {
    pub node: NodeConfig,
    pub peers: PeersConfig,
    pub storage: StorageConfig,
    pub replication: ReplicationConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address to bind and to advertise as this node's identity.
    pub host: String,
    pub port: u16,
    /// How long an inbound connection may take to deliver its request.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    /// Every node in the deployment as "host:port". May include this node;
    /// it is filtered out of every fan-out.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Chunk size in bytes. Must be identical on every node.
    pub chunk_size: usize,
    /// Files in this directory are loaded into the catalog at startup.
    /// Empty = no import.
    pub import_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Max chunk pulls in flight at once, across all peers.
    pub max_concurrent_pulls: usize,
    /// Connect + round-trip budget for one chunk pull.
    pub peer_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Connect + round-trip budget for one peer's search.
    pub peer_timeout_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            peers: PeersConfig::default(),
            storage: StorageConfig::default(),
            replication: ReplicationConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for PeersConfig {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            import_dir: PathBuf::new(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pulls: 16,
            peer_timeout_ms: 5_000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            peer_timeout_ms: 3_000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("mosaic")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid peer address: {0}")]
    InvalidPeer(#[from] NodeParseError),
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl MosaicConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            MosaicConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MOSAIC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&MosaicConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// This node's identity.
    pub fn local_node(&self) -> Node {
        Node::new(self.node.host.clone(), self.node.port)
    }

    /// Parsed peer list.
    pub fn peer_nodes(&self) -> Result<Vec<Node>, ConfigError> {
        self.peers
            .nodes
            .iter()
            .map(|s| s.parse::<Node>().map_err(ConfigError::from))
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.node.request_timeout_ms)
    }

    pub fn replication_timeout(&self) -> Duration {
        Duration::from_millis(self.replication.peer_timeout_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search.peer_timeout_ms)
    }

    /// Reject settings that would break chunking or fan-out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.chunk_size == 0 || self.storage.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid {
                field: "storage.chunk_size",
                reason: format!("must be between 1 and {MAX_CHUNK_SIZE}"),
            });
        }
        if self.replication.max_concurrent_pulls == 0 {
            return Err(ConfigError::Invalid {
                field: "replication.max_concurrent_pulls",
                reason: "must be at least 1".into(),
            });
        }
        if self.node.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "node.request_timeout_ms",
                reason: "must be non-zero".into(),
            });
        }
        if self.replication.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "replication.peer_timeout_ms",
                reason: "must be non-zero".into(),
            });
        }
        if self.search.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "search.peer_timeout_ms",
                reason: "must be non-zero".into(),
            });
        }
        self.peer_nodes()?;
        Ok(())
    }

    /// Apply MOSAIC_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MOSAIC_NODE__HOST") {
            self.node.host = v;
        }
        if let Ok(v) = std::env::var("MOSAIC_NODE__PORT") {
            if let Ok(p) = v.parse() {
                self.node.port = p;
            }
        }
        if let Ok(v) = std::env::var("MOSAIC_NODE__REQUEST_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.node.request_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("MOSAIC_PEERS__NODES") {
            self.peers.nodes = split_list(&v);
        }
        if let Ok(v) = std::env::var("MOSAIC_STORAGE__CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.storage.chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("MOSAIC_STORAGE__IMPORT_DIR") {
            self.storage.import_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MOSAIC_REPLICATION__MAX_CONCURRENT_PULLS") {
            if let Ok(n) = v.parse() {
                self.replication.max_concurrent_pulls = n;
            }
        }
        if let Ok(v) = std::env::var("MOSAIC_REPLICATION__PEER_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.replication.peer_timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("MOSAIC_SEARCH__PEER_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.search.peer_timeout_ms = n;
            }
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
