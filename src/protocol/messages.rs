//! Outbound message builders.
//!
//! One function per client request kind; each returns the single frame
//! shape that request maps to.

use bytes::Bytes;

use super::event_id::ClientEvent;
use super::frame::Frame;
use super::wire_format::{MessageType, Serialization};
use crate::codec::JsonCodec;
use crate::error::Result;
use crate::payload::{ChatTtsTextRequest, HelloRequest, SessionConfig};

fn control(event: ClientEvent) -> Frame {
    Frame::new(MessageType::FullClientRequest, Serialization::Json).with_event(event.as_u32())
}

fn session_control(event: ClientEvent, session_id: &str) -> Frame {
    control(event).with_session_id(session_id)
}

/// StartConnection (event 1), no session id and an empty payload.
pub fn start_connection() -> Frame {
    control(ClientEvent::StartConnection)
}

/// FinishConnection (event 2), no session id and an empty payload.
pub fn finish_connection() -> Frame {
    control(ClientEvent::FinishConnection)
}

/// StartSession (event 100) carrying the bot configuration.
pub fn start_session(session_id: &str, config: &SessionConfig) -> Result<Frame> {
    let body = JsonCodec::encode(&config.request_body())?;
    Ok(session_control(ClientEvent::StartSession, session_id).with_payload(body))
}

/// FinishSession (event 102), empty payload.
pub fn finish_session(session_id: &str) -> Frame {
    session_control(ClientEvent::FinishSession, session_id)
}

/// Audio chunk (event 200). The bytes go out untouched.
pub fn task_request(session_id: &str, audio: Bytes) -> Frame {
    Frame::new(MessageType::AudioOnlyRequest, Serialization::Raw)
        .with_event(ClientEvent::TaskRequest.as_u32())
        .with_session_id(session_id)
        .with_payload(audio)
}

/// SayHello (event 300).
pub fn say_hello(session_id: &str, content: &str) -> Result<Frame> {
    let body = JsonCodec::encode(&HelloRequest {
        content: content.to_owned(),
    })?;
    Ok(session_control(ClientEvent::SayHello, session_id).with_payload(body))
}

/// ChatTTSText (event 500).
pub fn chat_tts_text(session_id: &str, content: &str, start: bool, end: bool) -> Result<Frame> {
    let body = JsonCodec::encode(&ChatTtsTextRequest {
        start,
        content: content.to_owned(),
        end,
    })?;
    Ok(session_control(ClientEvent::ChatTtsText, session_id).with_payload(body))
}
