//! Handler module - event subscription and dispatch.
//!
//! Provides:
//! - [`EventRegistry`] - maps server event ids to handlers, plus error handlers
//! - [`InboundEvent`] - the typed event handed to each handler

mod context;
mod registry;

pub use context::InboundEvent;
pub use registry::{
    DispatchReport, ErrorHandler, EventHandler, EventRegistry, HandlerResult, Subscription,
};
