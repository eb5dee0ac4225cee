//! Event identifiers carried in the event id field.
//!
//! Client events are written by this crate; server events are the closed set
//! the event registry can subscribe to.

use std::fmt;

/// Events sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ClientEvent {
    /// Open the logical connection.
    StartConnection = 1,
    /// Close the logical connection.
    FinishConnection = 2,
    /// Open a dialogue session.
    StartSession = 100,
    /// Close the dialogue session.
    FinishSession = 102,
    /// Upstream audio chunk.
    TaskRequest = 200,
    /// Ask the bot to speak a greeting.
    SayHello = 300,
    /// Text for the bot to synthesize.
    ChatTtsText = 500,
}

impl ClientEvent {
    /// Numeric id on the wire.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether frames for this event carry a session id.
    #[inline]
    pub fn is_session_scoped(self) -> bool {
        !matches!(self, ClientEvent::StartConnection | ClientEvent::FinishConnection)
    }
}

/// Check whether a frame with this event id carries the id slot
/// (session id, or connect id on server connection events).
///
/// Only the client connection events go without it.
#[inline]
pub fn carries_id_slot(event_id: u32) -> bool {
    event_id != ClientEvent::StartConnection.as_u32()
        && event_id != ClientEvent::FinishConnection.as_u32()
}

/// Events sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ServerEventId {
    /// Connection accepted.
    ConnectionStarted = 50,
    /// Connection refused.
    ConnectionFailed = 51,
    /// Connection closed by the server.
    ConnectionFinished = 52,
    /// Session accepted.
    SessionStarted = 150,
    /// Session closed.
    SessionFinished = 152,
    /// Session refused or aborted.
    SessionFailed = 153,
    /// A synthesized sentence begins.
    TtsSentenceStart = 350,
    /// A synthesized sentence ends.
    TtsSentenceEnd = 351,
    /// Synthesized audio chunk.
    TtsResponse = 352,
    /// Synthesis of the current reply finished.
    TtsEnded = 359,
    /// The user started speaking.
    AsrInfo = 450,
    /// Recognition result.
    AsrResponse = 451,
    /// The user stopped speaking.
    AsrEnded = 459,
    /// Streamed reply text.
    ChatResponse = 550,
    /// Reply text finished.
    ChatEnded = 559,
}

impl ServerEventId {
    /// All server events, in id order.
    pub const ALL: [ServerEventId; 15] = [
        ServerEventId::ConnectionStarted,
        ServerEventId::ConnectionFailed,
        ServerEventId::ConnectionFinished,
        ServerEventId::SessionStarted,
        ServerEventId::SessionFinished,
        ServerEventId::SessionFailed,
        ServerEventId::TtsSentenceStart,
        ServerEventId::TtsSentenceEnd,
        ServerEventId::TtsResponse,
        ServerEventId::TtsEnded,
        ServerEventId::AsrInfo,
        ServerEventId::AsrResponse,
        ServerEventId::AsrEnded,
        ServerEventId::ChatResponse,
        ServerEventId::ChatEnded,
    ];

    /// Numeric id on the wire.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look up a server event by its wire id.
    pub fn from_u32(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|event| event.as_u32() == id)
    }

    /// Protocol name of the event.
    pub fn name(self) -> &'static str {
        match self {
            ServerEventId::ConnectionStarted => "ConnectionStarted",
            ServerEventId::ConnectionFailed => "ConnectionFailed",
            ServerEventId::ConnectionFinished => "ConnectionFinished",
            ServerEventId::SessionStarted => "SessionStarted",
            ServerEventId::SessionFinished => "SessionFinished",
            ServerEventId::SessionFailed => "SessionFailed",
            ServerEventId::TtsSentenceStart => "TTSSentenceStart",
            ServerEventId::TtsSentenceEnd => "TTSSentenceEnd",
            ServerEventId::TtsResponse => "TTSResponse",
            ServerEventId::TtsEnded => "TTSEnded",
            ServerEventId::AsrInfo => "ASRInfo",
            ServerEventId::AsrResponse => "ASRResponse",
            ServerEventId::AsrEnded => "ASREnded",
            ServerEventId::ChatResponse => "ChatResponse",
            ServerEventId::ChatEnded => "ChatEnded",
        }
    }
}

impl fmt::Display for ServerEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u32())
    }
}
