//! # dialog-client
//!
//! Rust client for the realtime voice dialogue service.
//!
//! The service speaks a binary-framed protocol over one persistent
//! WebSocket: control events, session lifecycle, streamed audio and text
//! travel in both directions as [`Frame`](protocol::Frame)s.
//!
//! ## Architecture
//!
//! - **Frame codec** ([`protocol`]): 4-byte header, optional sequence /
//!   error code / event id / session id fields, length-prefixed payload
//! - **State machines** ([`state`]): connection and session lifecycles
//! - **Writer task** ([`writer`]): one bounded queue to the transport, with
//!   backpressure
//! - **Event registry** ([`handler`]): typed server events fanned out to
//!   application handlers
//!
//! ## Example
//!
//! ```no_run
//! use dialog_client::{DialogClient, ServerEventId, SessionConfig};
//!
//! # async fn run() -> dialog_client::Result<()> {
//! let client = DialogClient::builder("app-id", "access-key")
//!     .on(ServerEventId::AsrResponse, |event| {
//!         println!("{:?}", event.event);
//!         Ok(())
//!     })
//!     .build()?;
//!
//! client.connect().await?;
//! client.start_session(SessionConfig::new("Bot")).await?;
//! client.send_audio(vec![0u8; 640]).await?;
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod payload;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod writer;

mod backpressure;
mod client;

pub use backpressure::BackpressureController;
pub use client::{ClientBuilder, DialogClient};
pub use config::{AckMode, ClientConfig};
pub use error::{DialogError, FrameError, Result};
pub use handler::{EventRegistry, InboundEvent, Subscription};
pub use payload::{ServerEvent, SessionConfig, TtsConfig};
pub use protocol::{Frame, ServerEventId};
pub use state::{ConnectionState, SessionState};
