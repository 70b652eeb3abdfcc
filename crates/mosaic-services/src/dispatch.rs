//! Routes inbound requests to the handler registered for their kind.

use std::collections::HashMap;
use std::sync::Arc;

use mosaic_core::{Message, MessageKind};

use crate::handler::Handler;

#[derive(Default)]
pub struct Dispatcher {
    /// request kind -> handler. One handler may own several kinds.
    handlers: HashMap<MessageKind, Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under every kind it declares. A later registration
    /// for the same kind replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        for kind in handler.kinds() {
            if self.handlers.insert(*kind, handler.clone()).is_some() {
                tracing::warn!(kind = ?kind, "handler replaced");
            }
        }
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Answer one request. Returns `None` if nothing handles its kind or the
    /// handler failed; the caller then closes the connection without a reply.
    pub async fn dispatch(&self, request: Message) -> Option<Message> {
        let kind = request.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            tracing::warn!(kind = ?kind, "no handler for request kind");
            return None;
        };
        match handler.handle(request).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(kind = ?kind, error = %e, "request handling failed");
                None
            }
        }
    }
}
