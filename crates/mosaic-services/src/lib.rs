//! mosaic-services: node state and the request handlers built on it.

pub mod catalog;
pub mod dispatch;
pub mod handler;
pub mod peers;
pub mod replicate;
pub mod responder;
pub mod search;
pub mod server;
pub mod transport;

pub use catalog::{CatalogEntry, CatalogStore, Duplicate, HashGuard, LocalSearch};
pub use dispatch::Dispatcher;
pub use handler::Handler;
pub use peers::PeerDirectory;
pub use replicate::{ReplicationHandler, DEFAULT_MAX_CONCURRENT_PULLS};
pub use responder::ChunkResponder;
pub use search::{compile_pattern, LocalSearchResponder, SearchHandler};
pub use server::{MosaicNode, NodeSettings};
pub use transport::{PeerTransport, TcpTransport};
