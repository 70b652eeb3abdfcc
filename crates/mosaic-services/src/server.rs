//! A running node: shared state, handlers, and the TCP accept loop.
//!
//! Each accepted connection carries one request and at most one reply, and
//! is served in its own task so a slow fan-out never blocks other callers.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

use mosaic_core::chunk::DEFAULT_CHUNK_SIZE;
use mosaic_core::config::{ConfigError, MosaicConfig};
use mosaic_core::wire::{read_message, write_message};
use mosaic_core::Node;

use crate::catalog::CatalogStore;
use crate::dispatch::Dispatcher;
use crate::peers::PeerDirectory;
use crate::replicate::{ReplicationHandler, DEFAULT_MAX_CONCURRENT_PULLS};
use crate::responder::ChunkResponder;
use crate::search::{LocalSearchResponder, SearchHandler};
use crate::transport::{PeerTransport, TcpTransport};

/// Everything a node needs to know about itself and the deployment.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub local: Node,
    pub peers: Vec<Node>,
    pub chunk_size: usize,
    pub max_concurrent_pulls: usize,
    /// Deadline for an inbound connection to deliver its request.
    pub request_timeout: Duration,
    pub replication_timeout: Duration,
    pub search_timeout: Duration,
}

impl NodeSettings {
    pub fn new(local: Node, peers: Vec<Node>) -> Self {
        Self {
            local,
            peers,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_pulls: DEFAULT_MAX_CONCURRENT_PULLS,
            request_timeout: Duration::from_secs(10),
            replication_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(3),
        }
    }

    pub fn from_config(config: &MosaicConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            local: config.local_node(),
            peers: config.peer_nodes()?,
            chunk_size: config.storage.chunk_size,
            max_concurrent_pulls: config.replication.max_concurrent_pulls,
            request_timeout: config.request_timeout(),
            replication_timeout: config.replication_timeout(),
            search_timeout: config.search_timeout(),
        })
    }
}

pub struct MosaicNode {
    settings: NodeSettings,
    catalog: CatalogStore,
    peers: PeerDirectory,
    dispatcher: Arc<Dispatcher>,
}

impl MosaicNode {
    /// Build a node that reaches peers over TCP.
    pub fn new(settings: NodeSettings) -> Self {
        let replication = Arc::new(TcpTransport::new(settings.replication_timeout));
        let search = Arc::new(TcpTransport::new(settings.search_timeout));
        Self::with_transports(settings, replication, search)
    }

    /// Build a node with explicit outbound transports for replication and
    /// search fan-out.
    pub fn with_transports(
        settings: NodeSettings,
        replication: Arc<dyn PeerTransport>,
        search: Arc<dyn PeerTransport>,
    ) -> Self {
        let catalog = CatalogStore::new();
        let peers = PeerDirectory::from_nodes(settings.peers.iter().cloned());
        let local = settings.local.clone();

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(
            ReplicationHandler::new(local.clone(), catalog.clone(), peers.clone(), replication)
                .with_max_concurrent_pulls(settings.max_concurrent_pulls),
        ));
        dispatcher.register(Arc::new(SearchHandler::new(
            local.clone(),
            Arc::new(catalog.clone()),
            peers.clone(),
            search,
        )));
        dispatcher.register(Arc::new(LocalSearchResponder::new(Arc::new(
            catalog.clone(),
        ))));
        dispatcher.register(Arc::new(ChunkResponder::new(
            local,
            catalog.clone(),
            settings.chunk_size,
        )));

        Self {
            settings,
            catalog,
            peers,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn local(&self) -> &Node {
        &self.settings.local
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Add one file to the catalog under `filename`.
    pub async fn import(
        &self,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> mosaic_core::FileInfo {
        self.catalog
            .import(filename, data.into(), self.settings.chunk_size)
            .await
    }

    /// Import every regular file directly inside `dir`. Returns how many
    /// were read; unreadable entries are logged and skipped.
    pub async fn import_dir(&self, dir: &Path) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("reading import dir {}", dir.display()))?;

        let mut imported = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => {}
                _ => continue,
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!(path = %path.display(), "skipping non-UTF-8 filename");
                continue;
            };
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    let info = self.import(name, data).await;
                    tracing::info!(
                        filename = %info.filename,
                        file_hash = %info.hash.short(),
                        chunks = info.chunks.len(),
                        "imported"
                    );
                    imported += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "import failed");
                }
            }
        }
        Ok(imported)
    }

    /// Accept connections until `shutdown` fires.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, node = %self.settings.local, peers = self.peers.len(), "listening");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(%addr, "listener shutting down");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let dispatcher = self.dispatcher.clone();
                    let request_timeout = self.settings.request_timeout;
                    tokio::spawn(async move {
                        if let Err(e) =
                            serve_connection(stream, remote, &dispatcher, request_timeout).await
                        {
                            tracing::debug!(%remote, error = %e, "connection ended with error");
                        }
                    });
                }
            }
        }
    }
}

/// Read one request, answer it, close. A caller that has not delivered a
/// full request within `request_timeout` is dropped.
async fn serve_connection(
    mut stream: TcpStream,
    remote: SocketAddr,
    dispatcher: &Dispatcher,
    request_timeout: Duration,
) -> Result<()> {
    stream.set_nodelay(true).ok();

    let received = timeout(request_timeout, read_message(&mut stream))
        .await
        .context("timeout waiting for request")?;
    let Some(request) = received? else {
        tracing::trace!(%remote, "connection closed before a request");
        return Ok(());
    };
    if !request.kind().is_request() {
        anyhow::bail!("expected a request, got {:?}", request.kind());
    }
    tracing::debug!(%remote, kind = ?request.kind(), "request received");

    if let Some(reply) = dispatcher.dispatch(request).await {
        write_message(&mut stream, &reply).await?;
    }
    Ok(())
}
