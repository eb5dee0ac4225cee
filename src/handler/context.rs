//! Inbound event passed to handlers.
//!
//! Wraps the typed payload together with the frame metadata handlers need
//! to correlate it (session id, or connect id on connection events).

use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::payload::{ChatResponse, ServerEvent};
use crate::protocol::{Frame, ServerEventId};

/// Event delivered to registry handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Server event id.
    pub id: ServerEventId,
    /// Id slot of the frame: the session id, or the connect id on
    /// connection-level events.
    pub session_id: Option<String>,
    /// Sequence number, when the server sent one.
    pub sequence: Option<i32>,
    /// Typed payload.
    pub event: ServerEvent,
}

impl InboundEvent {
    /// Interpret a decoded non-error frame.
    ///
    /// Returns `Ok(None)` for frames without an event id or with an id this
    /// client does not know; those are skipped.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>> {
        let Some(raw_id) = frame.event_id else {
            debug!(message_type = ?frame.message_type, "Frame without event id skipped");
            return Ok(None);
        };
        let Some(id) = ServerEventId::from_u32(raw_id) else {
            debug!(event_id = raw_id, "Unknown server event skipped");
            return Ok(None);
        };

        Ok(Some(Self {
            id,
            session_id: frame.session_id.clone(),
            sequence: frame.sequence,
            event: ServerEvent::decode(id, frame)?,
        }))
    }

    /// Raw audio, if the frame was an audio-only response.
    pub fn audio(&self) -> Option<&Bytes> {
        match &self.event {
            ServerEvent::TtsResponse(audio) | ServerEvent::Audio { data: audio, .. } => Some(audio),
            _ => None,
        }
    }

    /// Reply text, if this is a ChatResponse.
    pub fn chat(&self) -> Option<&ChatResponse> {
        match &self.event {
            ServerEvent::ChatResponse(chat) => Some(chat),
            _ => None,
        }
    }
}
