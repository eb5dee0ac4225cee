//! Transport module - message-oriented byte channels to the service.
//!
//! A transport carries whole binary messages, one frame per message. The
//! client only sees a boxed [`FrameSink`] and [`FrameStream`]; a
//! [`Connector`] opens them from [`Handshake`] metadata.
//!
//! - [`WebSocketConnector`] - `tokio-tungstenite` over TLS
//! - [`MemoryConnector`] - in-process channels, used by tests

mod memory;
mod websocket;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Sink, Stream};

use crate::error::{DialogError, Result};

pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WebSocketConnector;

/// Boxed future returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half: accepts encoded frames.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = DialogError> + Send>>;

/// Inbound half: yields encoded frames. Ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Both halves of an open transport.
pub struct TransportPair {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Handshake header names.
pub mod headers {
    pub const APP_ID: &str = "X-Api-App-ID";
    pub const ACCESS_KEY: &str = "X-Api-Access-Key";
    pub const RESOURCE_ID: &str = "X-Api-Resource-Id";
    pub const APP_KEY: &str = "X-Api-App-Key";
    pub const CONNECT_ID: &str = "X-Api-Connect-Id";
}

/// Metadata sent when opening the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Handshake {
    pub endpoint: String,
    pub app_id: String,
    pub access_key: String,
    pub resource_id: String,
    pub app_key: String,
    pub connect_id: String,
}

impl Handshake {
    /// Header name/value pairs, in the order they are sent.
    pub fn headers(&self) -> [(&'static str, &str); 5] {
        [
            (headers::APP_ID, self.app_id.as_str()),
            (headers::ACCESS_KEY, self.access_key.as_str()),
            (headers::RESOURCE_ID, self.resource_id.as_str()),
            (headers::APP_KEY, self.app_key.as_str()),
            (headers::CONNECT_ID, self.connect_id.as_str()),
        ]
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("access_key", &"<redacted>")
            .field("resource_id", &self.resource_id)
            .field("app_key", &self.app_key)
            .field("connect_id", &self.connect_id)
            .finish()
    }
}

/// Opens transports.
pub trait Connector: Send + Sync + 'static {
    /// Open a transport with the given handshake.
    fn connect<'a>(&'a self, handshake: &'a Handshake) -> BoxFuture<'a, Result<TransportPair>>;
}
