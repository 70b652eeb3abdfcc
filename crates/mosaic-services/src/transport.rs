//! Outbound exchanges: one request, one response, one connection.
//!
//! Handlers talk to peers only through `PeerTransport`, so fan-out logic can
//! be driven by an in-memory transport in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use mosaic_core::wire::{read_message, write_message, ExchangeError};
use mosaic_core::{Message, Node};

/// Sends one message to a peer and waits for its single reply.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn exchange(&self, node: &Node, request: Message) -> Result<Message, ExchangeError>;
}

/// TCP transport. The whole exchange (connect, write, read) shares one deadline.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn exchange(&self, node: &Node, request: Message) -> Result<Message, ExchangeError> {
        let round_trip = async {
            let mut stream = TcpStream::connect((node.host.as_str(), node.port))
                .await
                .map_err(|source| ExchangeError::Connect {
                    node: node.clone(),
                    source,
                })?;
            stream.set_nodelay(true).ok();

            write_message(&mut stream, &request).await?;
            let reply = read_message(&mut stream)
                .await?
                .ok_or(ExchangeError::Closed)?;
            Ok::<_, ExchangeError>(reply)
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(peer = %node, timeout = ?self.timeout, "exchange timed out");
                Err(ExchangeError::Timeout(self.timeout))
            }
        }
    }
}
