//! Replication handler.
//!
//! A `ReplicateRequest` names a file by its `FileInfo`. If the content hash
//! is already resident the request is recorded as a duplicate and answered
//! without touching the network. Otherwise every chunk is requested from
//! every peer, accepted copies are reassembled in index order, and the
//! result is committed only if it hashes to the declared file hash.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::FutureExt;
use futures::stream::{self, StreamExt};

use mosaic_core::hash::hash;
use mosaic_core::wire::ExchangeError;
use mosaic_core::{
    ChunkInfo, ChunkRequest, ChunkResponse, ContentHash, FileInfo, Message, MessageKind, Node,
    NodeReplicationStatus, ReplicateRequest, ReplicateResponse, Status,
};

use crate::catalog::CatalogStore;
use crate::handler::{misrouted, Handler};
use crate::peers::PeerDirectory;
use crate::transport::PeerTransport;

/// Default cap on chunk pulls in flight for one replication.
pub const DEFAULT_MAX_CONCURRENT_PULLS: usize = 16;

pub struct ReplicationHandler {
    local: Node,
    catalog: CatalogStore,
    peers: PeerDirectory,
    transport: Arc<dyn PeerTransport>,
    max_concurrent_pulls: usize,
}

/// Outcome of one (chunk, peer) pull.
struct PullAttempt {
    status: NodeReplicationStatus,
    accepted: Option<(u32, Bytes)>,
}

impl PullAttempt {
    fn failed(peer: &Node, index: u32, status: Status, message: String) -> Self {
        Self {
            status: NodeReplicationStatus {
                node: peer.clone(),
                status,
                chunk_index: Some(index),
                error_message: Some(message),
            },
            accepted: None,
        }
    }

    fn accepted(peer: &Node, index: u32, data: Bytes) -> Self {
        Self {
            status: NodeReplicationStatus {
                node: peer.clone(),
                status: Status::Success,
                chunk_index: Some(index),
                error_message: None,
            },
            accepted: Some((index, data)),
        }
    }
}

impl ReplicationHandler {
    pub fn new(
        local: Node,
        catalog: CatalogStore,
        peers: PeerDirectory,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            local,
            catalog,
            peers,
            transport,
            max_concurrent_pulls: DEFAULT_MAX_CONCURRENT_PULLS,
        }
    }

    /// Cap pulls in flight. Zero is treated as one.
    pub fn with_max_concurrent_pulls(mut self, limit: usize) -> Self {
        self.max_concurrent_pulls = limit.max(1);
        self
    }

    pub async fn replicate(&self, request: ReplicateRequest) -> ReplicateResponse {
        let info = request.file_info;

        if info.filename.trim().is_empty() {
            tracing::warn!(file_hash = %info.hash.short(), "replicate rejected, empty filename");
            return ReplicateResponse {
                status: Status::MessageError,
                error_message: Some("the filename is empty".into()),
                node_statuses: Vec::new(),
            };
        }

        // Held until commit so a concurrent request for the same content
        // observes either nothing or the finished entry.
        let _guard = self.catalog.lock_hash(info.hash).await;

        if let Some(existing) = self.catalog.lookup_by_hash(&info.hash) {
            let data = self.catalog.get(&existing.hash);
            self.catalog.record_duplicate(existing, data);
            return ReplicateResponse {
                status: Status::Success,
                error_message: None,
                node_statuses: vec![NodeReplicationStatus {
                    node: self.local.clone(),
                    status: Status::Success,
                    chunk_index: None,
                    error_message: None,
                }],
            };
        }

        let peers = self.peers.peers(&self.local);
        tracing::info!(
            file_hash = %info.hash.short(),
            filename = %info.filename,
            chunks = info.chunks.len(),
            peers = peers.len(),
            "replication started"
        );

        let attempts = self.pull_all(&info, &peers).await;
        self.assemble(info, attempts)
    }

    /// Request every declared chunk from every peer, at most
    /// `max_concurrent_pulls` at a time.
    async fn pull_all(&self, info: &FileInfo, peers: &[Node]) -> Vec<PullAttempt> {
        let file_hash = info.hash;
        let jobs: Vec<(ChunkInfo, Node)> = info
            .chunks
            .iter()
            .flat_map(|chunk| peers.iter().map(move |peer| (chunk.clone(), peer.clone())))
            .collect();

        stream::iter(jobs)
            .map(|(chunk, peer)| {
                async move { self.pull_chunk(file_hash, &chunk, &peer).await }.boxed()
            })
            .buffer_unordered(self.max_concurrent_pulls)
            .collect()
            .await
    }

    async fn pull_chunk(
        &self,
        file_hash: ContentHash,
        expected: &ChunkInfo,
        peer: &Node,
    ) -> PullAttempt {
        let index = expected.index;
        let request = ChunkRequest {
            file_hash,
            chunk_index: index,
            chunk_hash: Some(expected.hash),
        };

        let response = match self.transport.exchange(peer, request.into()).await {
            Ok(Message::ChunkResponse(response)) => response,
            Ok(other) => {
                let err = ExchangeError::UnexpectedResponse {
                    expected: MessageKind::ChunkResponse,
                    got: other.kind(),
                };
                return PullAttempt::failed(peer, index, err.status(), err.to_string());
            }
            Err(err) => {
                tracing::debug!(peer = %peer, chunk = index, error = %err, "chunk pull failed");
                return PullAttempt::failed(peer, index, err.status(), err.to_string());
            }
        };

        if !response.status.is_success() {
            let message = response
                .error_message
                .unwrap_or_else(|| format!("peer answered {}", response.status));
            return PullAttempt::failed(peer, index, response.status, message);
        }

        match verify_chunk(expected, &response) {
            Ok(()) => PullAttempt::accepted(peer, index, response.data),
            Err(reason) => {
                tracing::warn!(peer = %peer, chunk = index, %reason, "chunk rejected");
                PullAttempt::failed(peer, index, Status::ProcessingError, reason)
            }
        }
    }

    /// Reassemble accepted chunks in index order and commit if the result
    /// hashes to the declared file hash.
    fn assemble(&self, info: FileInfo, attempts: Vec<PullAttempt>) -> ReplicateResponse {
        let mut accepted: BTreeMap<u32, Bytes> = BTreeMap::new();
        let mut node_statuses = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            if let Some((index, data)) = attempt.accepted {
                accepted.entry(index).or_insert(data);
            }
            node_statuses.push(attempt.status);
        }
        node_statuses.sort_by(|a, b| {
            a.chunk_index
                .cmp(&b.chunk_index)
                .then_with(|| a.node.cmp(&b.node))
        });

        let failed = node_statuses
            .iter()
            .filter(|s| !s.status.is_success())
            .count();

        let mut data = BytesMut::with_capacity(accepted.values().map(Bytes::len).sum());
        for chunk in accepted.values() {
            data.extend_from_slice(chunk);
        }
        let data = data.freeze();

        if hash(&data) != info.hash {
            tracing::warn!(
                file_hash = %info.hash.short(),
                accepted = accepted.len(),
                declared = info.chunks.len(),
                failed_pulls = failed,
                "replication failed verification"
            );
            return ReplicateResponse {
                status: Status::ProcessingError,
                error_message: Some(format!(
                    "received chunks do not add up to the declared file ({} of {} chunks, {} of {} bytes)",
                    accepted.len(),
                    info.chunks.len(),
                    data.len(),
                    info.total_size(),
                )),
                node_statuses,
            };
        }

        tracing::info!(
            file_hash = %info.hash.short(),
            filename = %info.filename,
            bytes = data.len(),
            failed_pulls = failed,
            "replication committed"
        );
        self.catalog.put(info, data);

        ReplicateResponse {
            status: Status::Success,
            error_message: (failed > 0)
                .then(|| format!("{failed} of {} chunk pulls failed", node_statuses.len())),
            node_statuses,
        }
    }
}

/// A received chunk must match its declaration in size and hash.
fn verify_chunk(expected: &ChunkInfo, response: &ChunkResponse) -> Result<(), String> {
    if response.chunk_index != expected.index {
        return Err(format!(
            "asked for chunk {}, received chunk {}",
            expected.index, response.chunk_index
        ));
    }
    if response.data.len() != expected.size as usize {
        return Err(format!(
            "chunk {} is {} bytes, declared {}",
            expected.index,
            response.data.len(),
            expected.size
        ));
    }
    let actual = hash(&response.data);
    if actual != expected.hash {
        return Err(format!(
            "chunk {} hashes to {}, declared {}",
            expected.index, actual, expected.hash
        ));
    }
    Ok(())
}

#[async_trait]
impl Handler for ReplicationHandler {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::ReplicateRequest]
    }

    async fn handle(&self, request: Message) -> Result<Message> {
        match request {
            Message::ReplicateRequest(request) => Ok(self.replicate(request).await.into()),
            other => Err(misrouted("replication", &other)),
        }
    }
}
