//! Protocol module - wire format, framing, event ids and request builders.
//!
//! This module implements the binary protocol of the dialogue service:
//! - 4-byte header encoding/decoding
//! - Frame struct with encode/decode of the optional fields
//! - Client and server event ids
//! - Builders for every client request

mod event_id;
mod frame;
pub mod messages;
mod wire_format;

pub use event_id::{carries_id_slot, ClientEvent, ServerEventId};
pub use frame::{DecodeOptions, Frame};
pub use wire_format::{
    flags, Compression, Header, MessageType, Serialization, HEADER_SIZE, HEADER_SIZE_WORDS,
    MIN_FRAME_SIZE, PROTOCOL_VERSION, SESSION_ID_LEN_LIMIT,
};
