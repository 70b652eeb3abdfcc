//! Mosaic integration test harness.
//!
//! Every test runs real nodes on loopback TCP inside the test process.
//! Nodes bind port 0, so tests can run in parallel without coordination.
//! Misbehaving peers are scripted listeners that speak the wire format
//! directly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use mosaic_core::chunk::chunk_at;
use mosaic_core::wire::{read_message, write_message};
use mosaic_core::{ChunkResponse, Message, Node, Status};
use mosaic_services::{MosaicNode, NodeSettings, PeerTransport, TcpTransport};

mod faults;
mod replication;
mod search;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Deterministic test payload.
pub fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i * 13 % 241) as u8).collect::<Vec<u8>>())
}

pub async fn bind() -> Result<(TcpListener, Node)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    Ok((listener, Node::new("127.0.0.1", port)))
}

/// An address nothing listens on.
pub async fn dead_address() -> Result<Node> {
    let (listener, node) = bind().await?;
    drop(listener);
    Ok(node)
}

/// A set of nodes that all list each other (and any extra peers) as peers.
pub struct Cluster {
    pub nodes: Vec<Arc<MosaicNode>>,
    shutdown: broadcast::Sender<()>,
}

impl Cluster {
    pub async fn start(size: usize) -> Result<Self> {
        Self::start_with(size, Vec::new(), |_| {}).await
    }

    pub async fn start_with(
        size: usize,
        extra_peers: Vec<Node>,
        tweak: impl Fn(&mut NodeSettings),
    ) -> Result<Self> {
        let mut bound = Vec::with_capacity(size);
        for _ in 0..size {
            bound.push(bind().await?);
        }
        let mut directory: Vec<Node> = bound.iter().map(|(_, node)| node.clone()).collect();
        directory.extend(extra_peers);

        let (shutdown, _) = broadcast::channel(1);
        let mut nodes = Vec::with_capacity(size);
        for (listener, local) in bound {
            let mut settings = NodeSettings::new(local, directory.clone());
            settings.replication_timeout = Duration::from_secs(2);
            settings.search_timeout = Duration::from_secs(2);
            tweak(&mut settings);

            let node = Arc::new(MosaicNode::new(settings));
            let serving = node.clone();
            let rx = shutdown.subscribe();
            tokio::spawn(async move { serving.serve(listener, rx).await });
            nodes.push(node);
        }
        Ok(Self { nodes, shutdown })
    }

    pub fn node(&self, index: usize) -> &MosaicNode {
        &self.nodes[index]
    }

    pub fn address(&self, index: usize) -> Node {
        self.nodes[index].local().clone()
    }

    /// Send one request to a node the way an external client would.
    pub async fn request(&self, index: usize, request: impl Into<Message>) -> Result<Message> {
        let reply = TcpTransport::new(Duration::from_secs(10))
            .exchange(&self.address(index), request.into())
            .await
            .context("client exchange failed")?;
        Ok(reply)
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

/// How a scripted peer treats each connection.
#[derive(Clone)]
pub enum FakePeer {
    /// Accept, read the request, never answer.
    Hang,
    /// Accept, read the request, close without answering.
    Close,
    /// Answer chunk requests for `file` with one byte flipped.
    Corrupt { file: Bytes, chunk_size: usize },
    /// Answer with bytes that are not a frame.
    Garbage,
}

/// Start a scripted peer. The task runs until the test runtime ends.
pub async fn spawn_fake_peer(behaviour: FakePeer) -> Result<(Node, JoinHandle<()>)> {
    let (listener, node) = bind().await?;
    let identity = node.clone();
    let task = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let behaviour = behaviour.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                let Ok(Some(request)) = read_message(&mut socket).await else {
                    return;
                };
                match behaviour {
                    FakePeer::Hang => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    FakePeer::Close => {}
                    FakePeer::Garbage => {
                        use tokio::io::AsyncWriteExt;
                        let _ = socket.write_all(b"not a mosaic frame at all").await;
                    }
                    FakePeer::Corrupt { file, chunk_size } => {
                        let Message::ChunkRequest(request) = request else {
                            return;
                        };
                        let mut data = chunk_at(&file, chunk_size, request.chunk_index)
                            .unwrap_or_default()
                            .to_vec();
                        if let Some(last) = data.last_mut() {
                            *last = last.wrapping_add(1);
                        }
                        let reply = ChunkResponse {
                            status: Status::Success,
                            node: identity,
                            chunk_index: request.chunk_index,
                            data: Bytes::from(data),
                            error_message: None,
                        };
                        let _ = write_message(&mut socket, &reply.into()).await;
                    }
                }
            });
        }
    });
    Ok((node, task))
}

pub fn expect_replicate(reply: Message) -> Result<mosaic_core::ReplicateResponse> {
    match reply {
        Message::ReplicateResponse(r) => Ok(r),
        other => bail!("expected a replicate response, got {:?}", other.kind()),
    }
}

pub fn expect_search(reply: Message) -> Result<mosaic_core::SearchResponse> {
    match reply {
        Message::SearchResponse(r) => Ok(r),
        other => bail!("expected a search response, got {:?}", other.kind()),
    }
}
