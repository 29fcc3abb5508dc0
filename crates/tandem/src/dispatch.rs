//! Routes each inbound message to exactly one handler by type.

use std::collections::HashMap;

use tandem_protocol::{Message, MessageKind};
use tracing::debug;

use crate::NetError;

type Handler<S> = Box<dyn FnMut(&mut S, &Message) + Send>;

/// A table of one handler per [`MessageKind`], all operating on a shared
/// state `S`.
///
/// Handlers run synchronously, so each message is fully applied before the
/// next is dispatched.
pub struct Dispatcher<S> {
    handlers: HashMap<MessageKind, Handler<S>>,
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `kind`.
    ///
    /// # Errors
    /// [`NetError::DuplicateHandler`] if `kind` already has one; the existing
    /// handler stays in place.
    pub fn register<F>(&mut self, kind: MessageKind, handler: F) -> Result<(), NetError>
    where
        F: FnMut(&mut S, &Message) + Send + 'static,
    {
        if self.handlers.contains_key(&kind) {
            return Err(NetError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, Box::new(handler));
        Ok(())
    }

    /// Register one handler for several kinds.
    pub fn register_all<F>(&mut self, kinds: &[MessageKind], handler: F) -> Result<(), NetError>
    where
        F: FnMut(&mut S, &Message) + Clone + Send + 'static,
    {
        for &kind in kinds {
            self.register(kind, handler.clone())?;
        }
        Ok(())
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run the handler for `msg`. Returns `false` (and logs) when nobody
    /// handles its kind.
    pub fn dispatch(&mut self, state: &mut S, msg: &Message) -> bool {
        match self.handlers.get_mut(&msg.kind()) {
            Some(handler) => {
                handler(state, msg);
                true
            }
            None => {
                debug!(kind = %msg.kind(), sender = ?msg.sender, "no handler, dropping message");
                false
            }
        }
    }
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}
