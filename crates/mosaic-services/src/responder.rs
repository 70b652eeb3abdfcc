//! Serves chunk requests from resident files.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use mosaic_core::chunk::{chunk_at, find_chunk};
use mosaic_core::{ChunkRequest, ChunkResponse, Message, MessageKind, Node, Status};

use crate::catalog::CatalogStore;
use crate::handler::{misrouted, Handler};

pub struct ChunkResponder {
    local: Node,
    catalog: CatalogStore,
    chunk_size: usize,
}

impl ChunkResponder {
    pub fn new(local: Node, catalog: CatalogStore, chunk_size: usize) -> Self {
        Self {
            local,
            catalog,
            chunk_size,
        }
    }

    /// Look the chunk up by hash when the requester names one, otherwise by
    /// position. Bytes are sliced from the resident copy, not copied.
    pub fn answer(&self, request: &ChunkRequest) -> ChunkResponse {
        let Some(data) = self.catalog.get(&request.file_hash) else {
            return self.failure(
                request,
                format!("file {} is not resident on {}", request.file_hash, self.local),
            );
        };

        let slice = match &request.chunk_hash {
            Some(chunk_hash) => find_chunk(&data, self.chunk_size, chunk_hash),
            None => chunk_at(&data, self.chunk_size, request.chunk_index),
        };

        match slice {
            Some(slice) => {
                tracing::trace!(
                    file_hash = %request.file_hash.short(),
                    chunk = request.chunk_index,
                    bytes = slice.len(),
                    "serving chunk"
                );
                ChunkResponse {
                    status: Status::Success,
                    node: self.local.clone(),
                    chunk_index: request.chunk_index,
                    data: data.slice_ref(slice),
                    error_message: None,
                }
            }
            None => self.failure(
                request,
                format!(
                    "chunk {} of {} not found",
                    request.chunk_index, request.file_hash
                ),
            ),
        }
    }

    fn failure(&self, request: &ChunkRequest, message: String) -> ChunkResponse {
        tracing::debug!(
            file_hash = %request.file_hash.short(),
            chunk = request.chunk_index,
            %message,
            "chunk request unanswered"
        );
        ChunkResponse {
            status: Status::ProcessingError,
            node: self.local.clone(),
            chunk_index: request.chunk_index,
            data: Bytes::new(),
            error_message: Some(message),
        }
    }
}

#[async_trait]
impl Handler for ChunkResponder {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::ChunkRequest]
    }

    async fn handle(&self, request: Message) -> Result<Message> {
        match request {
            Message::ChunkRequest(request) => Ok(self.answer(&request).into()),
            other => Err(misrouted("chunk", &other)),
        }
    }
}
