//! Distributed filename search.
//!
//! A `SearchRequest` is answered from the local catalog and from every peer
//! (via `LocalSearchRequest`), queried concurrently. One result per node is
//! returned, local first, then peers in directory order. A peer that cannot
//! be reached still gets a result entry carrying its failure status.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;

use mosaic_core::wire::ExchangeError;
use mosaic_core::{
    FileInfo, LocalSearchRequest, LocalSearchResponse, Message, MessageKind, Node,
    NodeSearchResult, SearchRequest, SearchResponse, Status,
};

use crate::catalog::LocalSearch;
use crate::handler::{misrouted, Handler};
use crate::peers::PeerDirectory;
use crate::transport::PeerTransport;

/// Compile a user pattern. Blank patterns are rejected before the regex
/// engine sees them.
pub fn compile_pattern(pattern: &str) -> Result<Regex, String> {
    if pattern.trim().is_empty() {
        return Err("the search pattern is empty".into());
    }
    Regex::new(pattern).map_err(|e| format!("invalid search pattern: {e}"))
}

pub struct SearchHandler {
    local: Node,
    catalog: Arc<dyn LocalSearch>,
    peers: PeerDirectory,
    transport: Arc<dyn PeerTransport>,
}

impl SearchHandler {
    pub fn new(
        local: Node,
        catalog: Arc<dyn LocalSearch>,
        peers: PeerDirectory,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            local,
            catalog,
            peers,
            transport,
        }
    }

    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        let pattern = match compile_pattern(&request.regex) {
            Ok(pattern) => pattern,
            Err(reason) => {
                tracing::debug!(pattern = %request.regex, %reason, "search rejected");
                return SearchResponse {
                    status: Status::MessageError,
                    error_message: Some(reason.clone()),
                    results: vec![NodeSearchResult {
                        node: self.local.clone(),
                        status: Status::MessageError,
                        error_message: Some(reason),
                        files: vec![FileInfo::placeholder(request.regex)],
                    }],
                };
            }
        };

        let peers = self.peers.peers(&self.local);
        let remote = join_all(peers.iter().map(|peer| self.search_peer(peer, &request.regex)));
        let local = NodeSearchResult {
            node: self.local.clone(),
            status: Status::Success,
            error_message: None,
            files: self.catalog.search_local(&pattern),
        };

        let mut results = Vec::with_capacity(peers.len() + 1);
        results.push(local);
        results.extend(remote.await);

        let failed = results.iter().filter(|r| !r.status.is_success()).count();
        tracing::debug!(
            pattern = %request.regex,
            nodes = results.len(),
            failed,
            matches = results.iter().map(|r| r.files.len()).sum::<usize>(),
            "search answered"
        );

        SearchResponse {
            status: Status::Success,
            error_message: None,
            results,
        }
    }

    async fn search_peer(&self, peer: &Node, pattern: &str) -> NodeSearchResult {
        let request = LocalSearchRequest {
            regex: pattern.to_string(),
        };
        let outcome = match self.transport.exchange(peer, request.into()).await {
            Ok(Message::LocalSearchResponse(response)) => Ok(response),
            Ok(other) => Err(ExchangeError::UnexpectedResponse {
                expected: MessageKind::LocalSearchResponse,
                got: other.kind(),
            }),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(response) => NodeSearchResult {
                node: peer.clone(),
                status: response.status,
                error_message: response.error_message,
                files: response.files,
            },
            Err(err) => {
                tracing::debug!(peer = %peer, error = %err, "peer search failed");
                NodeSearchResult {
                    node: peer.clone(),
                    status: err.status(),
                    error_message: Some(err.to_string()),
                    files: vec![FileInfo::placeholder(pattern)],
                }
            }
        }
    }
}

#[async_trait]
impl Handler for SearchHandler {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::SearchRequest]
    }

    async fn handle(&self, request: Message) -> Result<Message> {
        match request {
            Message::SearchRequest(request) => Ok(self.search(request).await.into()),
            other => Err(misrouted("search", &other)),
        }
    }
}

/// Answers `LocalSearchRequest` from this node's catalog only.
pub struct LocalSearchResponder {
    catalog: Arc<dyn LocalSearch>,
}

impl LocalSearchResponder {
    pub fn new(catalog: Arc<dyn LocalSearch>) -> Self {
        Self { catalog }
    }

    pub fn answer(&self, request: &LocalSearchRequest) -> LocalSearchResponse {
        match compile_pattern(&request.regex) {
            Ok(pattern) => LocalSearchResponse {
                status: Status::Success,
                error_message: None,
                files: self.catalog.search_local(&pattern),
            },
            Err(reason) => LocalSearchResponse {
                status: Status::MessageError,
                error_message: Some(reason),
                files: vec![FileInfo::placeholder(request.regex.as_str())],
            },
        }
    }
}

#[async_trait]
impl Handler for LocalSearchResponder {
    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::LocalSearchRequest]
    }

    async fn handle(&self, request: Message) -> Result<Message> {
        match request {
            Message::LocalSearchRequest(request) => Ok(self.answer(&request).into()),
            other => Err(misrouted("local search", &other)),
        }
    }
}
