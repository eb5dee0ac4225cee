//! JSON bodies carried by control frames.
//!
//! Outbound: [`SessionConfig`] (StartSession), [`HelloRequest`],
//! [`ChatTtsTextRequest`]. Inbound: [`ServerEvent`], one typed schema per
//! server event id.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::protocol::{Frame, MessageType, ServerEventId};

/// Default bot display name.
pub const DEFAULT_BOT_NAME: &str = "豆包";

/// Audio output format requested from the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Container/encoding, e.g. `pcm` or `ogg_opus`.
    pub format: String,
    /// Samples per second.
    pub sample_rate: u32,
    /// Channel count.
    pub channel: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: "pcm".to_string(),
            sample_rate: 24_000,
            channel: 1,
        }
    }
}

/// Synthesizer overrides for a session (the `ttsConfig` block of StartSession).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Voice to synthesize with; the server picks one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Output audio format.
    pub audio_config: AudioConfig,
}

/// Bot configuration sent with StartSession.
///
/// ```
/// use dialog_client::SessionConfig;
///
/// let config = SessionConfig::new("Bot").with_dialog_id("d-42");
/// let body = serde_json::to_value(config.request_body()).unwrap();
/// assert_eq!(body["dialog"]["bot_name"], "Bot");
/// assert_eq!(body["dialog"]["extra"]["strict_audit"], false);
/// assert!(body.get("ttsConfig").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Name the bot introduces itself with.
    pub bot_name: String,
    /// Opaque dialog id; pass the last one to resume dialogue context.
    /// Empty starts a fresh dialogue.
    pub dialog_id: String,
    /// Ask the server for strict content auditing.
    pub strict_audit: bool,
    /// Persona prompt, omitted from the body when `None`.
    pub system_role: Option<String>,
    /// Speaking style prompt, omitted from the body when `None`.
    pub speaking_style: Option<String>,
    /// Synthesizer overrides, sent as `ttsConfig` when set.
    pub tts: Option<TtsConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BOT_NAME)
    }
}

impl SessionConfig {
    /// Configuration with the given bot name and everything else default.
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            dialog_id: String::new(),
            strict_audit: false,
            system_role: None,
            speaking_style: None,
            tts: None,
        }
    }

    /// Resume the dialogue with this id.
    pub fn with_dialog_id(mut self, dialog_id: impl Into<String>) -> Self {
        self.dialog_id = dialog_id.into();
        self
    }

    /// Set strict auditing.
    pub fn with_strict_audit(mut self, strict_audit: bool) -> Self {
        self.strict_audit = strict_audit;
        self
    }

    /// Set the persona prompt.
    pub fn with_system_role(mut self, role: impl Into<String>) -> Self {
        self.system_role = Some(role.into());
        self
    }

    /// Set the speaking style prompt.
    pub fn with_speaking_style(mut self, style: impl Into<String>) -> Self {
        self.speaking_style = Some(style.into());
        self
    }

    /// Override the synthesizer settings.
    pub fn with_tts(mut self, tts: TtsConfig) -> Self {
        self.tts = Some(tts);
        self
    }

    /// Borrowed view with the StartSession wire layout.
    pub fn request_body(&self) -> StartSessionRequest<'_> {
        StartSessionRequest {
            dialog: DialogBlock {
                bot_name: &self.bot_name,
                dialog_id: &self.dialog_id,
                extra: ExtraBlock {
                    strict_audit: self.strict_audit,
                },
                system_role: self.system_role.as_deref(),
                speaking_style: self.speaking_style.as_deref(),
            },
            tts: self.tts.as_ref(),
        }
    }
}

/// StartSession body.
#[derive(Debug, Serialize)]
pub struct StartSessionRequest<'a> {
    dialog: DialogBlock<'a>,
    #[serde(rename = "ttsConfig", skip_serializing_if = "Option::is_none")]
    tts: Option<&'a TtsConfig>,
}

#[derive(Debug, Serialize)]
struct DialogBlock<'a> {
    bot_name: &'a str,
    dialog_id: &'a str,
    extra: ExtraBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaking_style: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ExtraBlock {
    strict_audit: bool,
}

/// SayHello body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub content: String,
}

/// ChatTTSText body. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTtsTextRequest {
    pub start: bool,
    pub content: String,
    pub end: bool,
}

/// `{error}` body of ConnectionFailed, SessionFailed and ERROR_INFORMATION.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionStarted {
    pub dialog_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TtsSentenceStart {
    pub tts_type: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AsrInfo {
    pub question_id: Option<String>,
}

/// One recognition hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AsrResult {
    #[serde(default)]
    pub text: String,
    /// `true` while the utterance may still change.
    #[serde(default)]
    pub is_interim: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AsrResponse {
    #[serde(default)]
    pub results: Vec<AsrResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub content: String,
    pub question_id: Option<String>,
    pub reply_id: Option<String>,
}

/// A decoded server event with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ConnectionStarted(Value),
    ConnectionFailed(ErrorPayload),
    ConnectionFinished(Value),
    SessionStarted(SessionStarted),
    SessionFinished(Value),
    SessionFailed(ErrorPayload),
    TtsSentenceStart(TtsSentenceStart),
    TtsSentenceEnd(Value),
    /// Synthesized audio, verbatim.
    TtsResponse(Bytes),
    /// Audio-only frame under any other event id, verbatim.
    Audio { id: ServerEventId, data: Bytes },
    /// JSON body under an event whose payload is normally audio.
    Json { id: ServerEventId, body: Value },
    TtsEnded(Value),
    AsrInfo(AsrInfo),
    AsrResponse(AsrResponse),
    AsrEnded(Value),
    ChatResponse(ChatResponse),
    ChatEnded(Value),
}

impl ServerEvent {
    /// Interpret a frame's payload.
    ///
    /// Audio-only responses are handed over verbatim whatever their event
    /// id. Every other frame is decoded as the JSON schema of its event id.
    ///
    /// # Errors
    ///
    /// Fails when a JSON payload does not match the event's schema.
    pub fn decode(id: ServerEventId, frame: &Frame) -> Result<Self> {
        let body = frame.decompressed_payload()?;
        if frame.message_type == MessageType::AudioOnlyResponse {
            return Ok(match id {
                ServerEventId::TtsResponse => ServerEvent::TtsResponse(body),
                id => ServerEvent::Audio { id, data: body },
            });
        }

        let event = match id {
            ServerEventId::TtsResponse => ServerEvent::Json {
                id,
                body: JsonCodec::decode_value(&body)?,
            },
            ServerEventId::ConnectionStarted => {
                ServerEvent::ConnectionStarted(JsonCodec::decode_value(&body)?)
            }
            ServerEventId::ConnectionFailed => ServerEvent::ConnectionFailed(JsonCodec::decode(&body)?),
            ServerEventId::ConnectionFinished => {
                ServerEvent::ConnectionFinished(JsonCodec::decode_value(&body)?)
            }
            ServerEventId::SessionStarted => ServerEvent::SessionStarted(JsonCodec::decode(&body)?),
            ServerEventId::SessionFinished => {
                ServerEvent::SessionFinished(JsonCodec::decode_value(&body)?)
            }
            ServerEventId::SessionFailed => ServerEvent::SessionFailed(JsonCodec::decode(&body)?),
            ServerEventId::TtsSentenceStart => {
                ServerEvent::TtsSentenceStart(JsonCodec::decode(&body)?)
            }
            ServerEventId::TtsSentenceEnd => {
                ServerEvent::TtsSentenceEnd(JsonCodec::decode_value(&body)?)
            }
            ServerEventId::TtsEnded => ServerEvent::TtsEnded(JsonCodec::decode_value(&body)?),
            ServerEventId::AsrInfo => ServerEvent::AsrInfo(JsonCodec::decode(&body)?),
            ServerEventId::AsrResponse => ServerEvent::AsrResponse(JsonCodec::decode(&body)?),
            ServerEventId::AsrEnded => ServerEvent::AsrEnded(JsonCodec::decode_value(&body)?),
            ServerEventId::ChatResponse => ServerEvent::ChatResponse(JsonCodec::decode(&body)?),
            ServerEventId::ChatEnded => ServerEvent::ChatEnded(JsonCodec::decode_value(&body)?),
        };
        Ok(event)
    }

    /// Event id this payload belongs to.
    pub fn id(&self) -> ServerEventId {
        match self {
            ServerEvent::ConnectionStarted(_) => ServerEventId::ConnectionStarted,
            ServerEvent::ConnectionFailed(_) => ServerEventId::ConnectionFailed,
            ServerEvent::ConnectionFinished(_) => ServerEventId::ConnectionFinished,
            ServerEvent::SessionStarted(_) => ServerEventId::SessionStarted,
            ServerEvent::SessionFinished(_) => ServerEventId::SessionFinished,
            ServerEvent::SessionFailed(_) => ServerEventId::SessionFailed,
            ServerEvent::TtsSentenceStart(_) => ServerEventId::TtsSentenceStart,
            ServerEvent::TtsSentenceEnd(_) => ServerEventId::TtsSentenceEnd,
            ServerEvent::TtsResponse(_) => ServerEventId::TtsResponse,
            ServerEvent::Audio { id, .. } | ServerEvent::Json { id, .. } => *id,
            ServerEvent::TtsEnded(_) => ServerEventId::TtsEnded,
            ServerEvent::AsrInfo(_) => ServerEventId::AsrInfo,
            ServerEvent::AsrResponse(_) => ServerEventId::AsrResponse,
            ServerEvent::AsrEnded(_) => ServerEventId::AsrEnded,
            ServerEvent::ChatResponse(_) => ServerEventId::ChatResponse,
            ServerEvent::ChatEnded(_) => ServerEventId::ChatEnded,
        }
    }
}
