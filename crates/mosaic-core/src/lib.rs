//! mosaic-core: shared types, wire format, content hashing and config.
//! All other Mosaic crates depend on this one.

pub mod chunk;
pub mod config;
pub mod hash;
pub mod message;
pub mod wire;

pub use hash::ContentHash;
pub use message::{
    ChunkInfo, ChunkRequest, ChunkResponse, FileInfo, LocalSearchRequest, LocalSearchResponse,
    Message, MessageKind, Node, NodeReplicationStatus, NodeSearchResult, ReplicateRequest,
    ReplicateResponse, SearchRequest, SearchResponse, Status,
};
