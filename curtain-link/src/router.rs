use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::message::{DeviceMessage, MessageKind};

pub type Handler = dyn Fn(&DeviceMessage) -> anyhow::Result<()> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    NoHandler,
    /// The handler returned an error or panicked. Already logged.
    Failed,
}

/// At most one handler per [`MessageKind`]; the last registration wins.
#[derive(Default)]
pub struct CallbackRouter {
    handlers: RwLock<HashMap<MessageKind, Arc<Handler>>>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an earlier handler was replaced.
    pub fn register<F>(&self, kind: MessageKind, handler: F) -> bool
    where
        F: Fn(&DeviceMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        tracing::debug!("registered callback for {}", kind);

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(handler))
            .is_some()
    }

    pub fn unregister(&self, kind: &MessageKind) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(kind)
            .is_some()
    }

    pub fn has_handler(&self, kind: &MessageKind) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    /// Runs the handler on the caller's thread. Failures never propagate.
    pub fn dispatch(&self, message: &DeviceMessage) -> Dispatch {
        let kind = message.kind();

        // Cloned out so a handler may re-register without deadlocking.
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned();

        let Some(handler) = handler else {
            return Dispatch::NoHandler;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => Dispatch::Handled,
            Ok(Err(e)) => {
                tracing::error!("{} handler failed: {:#}", kind, e);
                Dispatch::Failed
            }
            Err(_) => {
                tracing::error!("{} handler panicked", kind);
                Dispatch::Failed
            }
        }
    }
}
