//! Handler trait for request/response services.
//!
//! Every inbound connection carries exactly one request. The dispatcher
//! picks the handler registered for the request's kind and writes back
//! whatever it returns.

use anyhow::Result;
use async_trait::async_trait;
use mosaic_core::{Message, MessageKind};

/// A service that answers one or more request kinds.
///
/// Failures that the requester should learn about are expressed as a
/// `Status` in the reply. An `Err` means the request could not be answered
/// at all and the connection is closed without a reply.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Request kinds this handler answers.
    fn kinds(&self) -> &'static [MessageKind];

    /// Answer one request.
    async fn handle(&self, request: Message) -> Result<Message>;
}

/// Error for a request routed to a handler that does not own its kind.
pub(crate) fn misrouted(handler: &str, request: &Message) -> anyhow::Error {
    anyhow::anyhow!("{handler} cannot answer {:?}", request.kind())
}
