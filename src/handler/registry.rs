//! Event registry for dispatching server events to application handlers.
//!
//! Handlers are keyed by [`ServerEventId`] and invoked in registration order.
//! A second list holds error handlers. Every call is isolated: an `Err` or a
//! panic from one handler is logged and counted, and the remaining handlers
//! still run.
//!
//! # Example
//!
//! ```
//! use dialog_client::handler::EventRegistry;
//! use dialog_client::protocol::ServerEventId;
//!
//! let registry = EventRegistry::new();
//! let sub = registry.on(ServerEventId::ChatResponse, |event| {
//!     if let Some(chat) = event.chat() {
//!         println!("bot: {}", chat.content);
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(registry.handler_count(ServerEventId::ChatResponse), 1);
//! assert!(registry.off(&sub));
//! assert_eq!(registry.handler_count(ServerEventId::ChatResponse), 0);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use super::InboundEvent;
use crate::error::{DialogError, Result};
use crate::protocol::ServerEventId;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Shared event handler.
pub type EventHandler = Arc<dyn Fn(&InboundEvent) -> HandlerResult + Send + Sync>;

/// Shared error handler.
pub type ErrorHandler = Arc<dyn Fn(&DialogError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Target {
    Event(ServerEventId),
    Error,
}

/// Token returned by registration; pass it to [`EventRegistry::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    target: Target,
}

impl Subscription {
    /// Event this subscription listens to, `None` for error handlers.
    pub fn event(&self) -> Option<ServerEventId> {
        match self.target {
            Target::Event(id) => Some(id),
            Target::Error => None,
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers called.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

struct Entry<H> {
    id: u64,
    handler: H,
}

/// Registry mapping server event ids to handlers.
pub struct EventRegistry {
    handlers: RwLock<HashMap<ServerEventId, Vec<Entry<EventHandler>>>>,
    error_handlers: RwLock<Vec<Entry<ErrorHandler>>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            error_handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a handler for an event.
    pub fn on<F>(&self, event: ServerEventId, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_shared(event, Arc::new(handler))
    }

    /// Register a handler the caller keeps a clone of.
    pub fn on_shared(&self, event: ServerEventId, handler: EventHandler) -> Subscription {
        let id = self.next_id();
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event)
            .or_default()
            .push(Entry { id, handler });
        Subscription {
            id,
            target: Target::Event(event),
        }
    }

    /// Register an error handler.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DialogError) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.error_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                id,
                handler: Arc::new(handler),
            });
        Subscription {
            id,
            target: Target::Error,
        }
    }

    /// Remove the handler a subscription refers to.
    ///
    /// Returns `false` if it was already removed.
    pub fn off(&self, subscription: &Subscription) -> bool {
        match subscription.target {
            Target::Event(event) => {
                let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
                let Some(list) = handlers.get_mut(&event) else {
                    return false;
                };
                let before = list.len();
                list.retain(|entry| entry.id != subscription.id);
                let removed = list.len() != before;
                if list.is_empty() {
                    handlers.remove(&event);
                }
                removed
            }
            Target::Error => {
                let mut list = self
                    .error_handlers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                let before = list.len();
                list.retain(|entry| entry.id != subscription.id);
                list.len() != before
            }
        }
    }

    /// Number of handlers registered for an event.
    pub fn handler_count(&self, event: ServerEventId) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event)
            .map_or(0, Vec::len)
    }

    /// Number of error handlers.
    pub fn error_handler_count(&self) -> usize {
        self.error_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every handler for the event, in registration order.
    pub fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        // Snapshot so handlers may call on/off.
        let snapshot: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.id)
            .map(|list| list.iter().map(|entry| Arc::clone(&entry.handler)).collect())
            .unwrap_or_default();

        let mut report = DispatchReport::default();
        for handler in snapshot {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(event = %event.id, error = %e, "Event handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        event = %event.id,
                        panic = panic_message(panic.as_ref()),
                        "Event handler panicked"
                    );
                }
            }
        }
        report
    }

    /// Invoke every error handler. Returns how many were called.
    pub fn report_error(&self, error: &DialogError) -> usize {
        let snapshot: Vec<ErrorHandler> = self
            .error_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        if snapshot.is_empty() {
            warn!(error = %error, "Unhandled client error");
        }

        for handler in &snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(error))) {
                warn!(panic = panic_message(panic.as_ref()), "Error handler panicked");
            }
        }
        snapshot.len()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic"
    }
}
