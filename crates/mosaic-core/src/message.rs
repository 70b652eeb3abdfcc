//! Message schema for node-to-node traffic.
//!
//! One `Message` travels in each direction per connection. The enum is
//! closed: a message's kind is its variant, so the kind and the payload
//! cannot disagree in memory. On the wire the frame header repeats the kind
//! and `wire::decode` rejects frames where the two differ.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

// ── Catalog model ─────────────────────────────────────────────────────────────

/// One chunk's position and expected content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Zero-based position within the file.
    pub index: u32,
    /// Length of the chunk in bytes.
    pub size: u32,
    /// Content hash of the chunk's raw bytes.
    pub hash: ContentHash,
}

/// File metadata. The catalog key.
///
/// `hash` is the content address of the whole file and the dedup key: two
/// `FileInfo`s with the same hash denote the same bytes whatever their names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    pub hash: ContentHash,
    pub chunks: Vec<ChunkInfo>,
}

impl FileInfo {
    /// A filename-only entry, used where a file list must echo a pattern.
    pub fn placeholder(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            hash: ContentHash::default(),
            chunks: Vec::new(),
        }
    }

    /// Sum of declared chunk sizes.
    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| u64::from(c.size)).sum()
    }
}

/// A participant process, addressed by host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    pub host: String,
    pub port: u16,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeParseError {
    #[error("node address {0:?} is not host:port")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("empty host in {0:?}")]
    EmptyHost(String),
}

impl FromStr for Node {
    type Err = NodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| NodeParseError::MissingPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(NodeParseError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| NodeParseError::InvalidPort(s.to_string()))?;
        Ok(Node::new(host, port))
    }
}

/// Outcome of an operation or of one peer's part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    /// The request itself was malformed. Detected before any I/O.
    MessageError,
    /// A peer could not be reached, timed out, or dropped the connection.
    NetworkError,
    /// A peer answered with something invalid or inconsistent.
    ProcessingError,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::MessageError => "MESSAGE_ERROR",
            Status::NetworkError => "NETWORK_ERROR",
            Status::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One peer's result for one chunk pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReplicationStatus {
    pub node: Node,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One node's contribution to a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSearchResult {
    pub node: Node,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub files: Vec<FileInfo>,
}

// ── Requests and responses ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub file_info: FileInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub node_statuses: Vec<NodeReplicationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub regex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub results: Vec<NodeSearchResult>,
}

/// Search restricted to the receiving node's own catalog. Never fanned out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSearchRequest {
    pub regex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSearchResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub files: Vec<FileInfo>,
}

/// Ask a peer for one chunk of a file it holds.
///
/// The responder recomputes chunk boundaries itself and matches by
/// `chunk_hash` when present, so both sides must share a chunk size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub file_hash: ContentHash,
    pub chunk_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_hash: Option<ContentHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub status: Status,
    /// The responding node.
    pub node: Node,
    pub chunk_index: u32,
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Wire discriminator, carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    ReplicateRequest = 1,
    ReplicateResponse = 2,
    SearchRequest = 3,
    SearchResponse = 4,
    LocalSearchRequest = 5,
    LocalSearchResponse = 6,
    ChunkRequest = 7,
    ChunkResponse = 8,
}

impl MessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ReplicateRequest),
            2 => Some(Self::ReplicateResponse),
            3 => Some(Self::SearchRequest),
            4 => Some(Self::SearchResponse),
            5 => Some(Self::LocalSearchRequest),
            6 => Some(Self::LocalSearchResponse),
            7 => Some(Self::ChunkRequest),
            8 => Some(Self::ChunkResponse),
            _ => None,
        }
    }

    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::ReplicateRequest
                | Self::SearchRequest
                | Self::LocalSearchRequest
                | Self::ChunkRequest
        )
    }
}

/// The envelope exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Message {
    ReplicateRequest(ReplicateRequest),
    ReplicateResponse(ReplicateResponse),
    SearchRequest(SearchRequest),
    SearchResponse(SearchResponse),
    LocalSearchRequest(LocalSearchRequest),
    LocalSearchResponse(LocalSearchResponse),
    ChunkRequest(ChunkRequest),
    ChunkResponse(ChunkResponse),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ReplicateRequest(_) => MessageKind::ReplicateRequest,
            Message::ReplicateResponse(_) => MessageKind::ReplicateResponse,
            Message::SearchRequest(_) => MessageKind::SearchRequest,
            Message::SearchResponse(_) => MessageKind::SearchResponse,
            Message::LocalSearchRequest(_) => MessageKind::LocalSearchRequest,
            Message::LocalSearchResponse(_) => MessageKind::LocalSearchResponse,
            Message::ChunkRequest(_) => MessageKind::ChunkRequest,
            Message::ChunkResponse(_) => MessageKind::ChunkResponse,
        }
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(inner: $variant) -> Self {
                    Message::$variant(inner)
                }
            }
        )*
    };
}

impl_from_variant!(
    ReplicateRequest,
    ReplicateResponse,
    SearchRequest,
    SearchResponse,
    LocalSearchRequest,
    LocalSearchResponse,
    ChunkRequest,
    ChunkResponse,
);

/// Chunk payloads travel as hex strings inside the JSON body.
mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Bytes::from).map_err(serde::de::Error::custom)
    }
}
