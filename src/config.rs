//! Client configuration.
//!
//! Credentials, endpoint, acknowledgement behaviour and writer limits.
//! [`ClientConfig::from_env`] reads the credentials the demo uses.

use std::fmt;
use std::time::Duration;

use crate::error::{DialogError, Result};
use crate::writer::WriterConfig;

/// Default dialogue endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://openspeech.bytedance.com/api/v3/realtime/dialogue";

/// Resource id of the dialogue product.
pub const DEFAULT_RESOURCE_ID: &str = "volc.speech.dialog";

/// Fixed application key sent with every handshake.
pub const DEFAULT_APP_KEY: &str = "PlgvMymc7f3tQnJ6";

/// Default wait for ConnectionStarted / SessionStarted.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the goodbye frames on disconnect.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable names read by [`ClientConfig::from_env`].
pub mod env {
    pub const APP_ID: &str = "DIALOG_APP_ID";
    pub const ACCESS_KEY: &str = "DIALOG_ACCESS_KEY";
    pub const ENDPOINT: &str = "DIALOG_ENDPOINT";
}

/// When `connect` and `start_session` consider themselves done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// As soon as the request frame is queued.
    Optimistic,
    /// When the server's ConnectionStarted / SessionStarted arrives.
    #[default]
    AwaitAck,
}

/// Configuration for a [`DialogClient`](crate::DialogClient).
#[derive(Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the dialogue service.
    pub endpoint: String,
    /// Application id (`X-Api-App-ID`).
    pub app_id: String,
    /// Access key (`X-Api-Access-Key`). Never logged.
    pub access_key: String,
    /// Resource id (`X-Api-Resource-Id`).
    pub resource_id: String,
    /// Application key (`X-Api-App-Key`).
    pub app_key: String,
    /// When connect and start_session complete.
    pub ack_mode: AckMode,
    /// Wait for ConnectionStarted / SessionStarted in [`AckMode::AwaitAck`].
    pub ack_timeout: Duration,
    /// Wait for the goodbye frames to be written on disconnect.
    pub close_timeout: Duration,
    /// ERROR_INFORMATION frames from the server carry a u32 error code
    /// before the event id. Off by default.
    pub error_code_slot: bool,
    /// Outbound queue limits.
    pub writer: WriterConfig,
}

impl ClientConfig {
    /// Config with default endpoint and timeouts.
    pub fn new(app_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            app_id: app_id.into(),
            access_key: access_key.into(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            app_key: DEFAULT_APP_KEY.to_string(),
            ack_mode: AckMode::default(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            error_code_slot: false,
            writer: WriterConfig::default(),
        }
    }

    /// Read `DIALOG_APP_ID`, `DIALOG_ACCESS_KEY` and optional `DIALOG_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DialogError::Config(format!("{key} is not set")))
        };
        let mut config = Self::new(required(env::APP_ID)?, required(env::ACCESS_KEY)?);
        if let Some(endpoint) = lookup(env::ENDPOINT).filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject empty credentials and non-WebSocket endpoints.
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(DialogError::Config("app id is empty".to_string()));
        }
        if self.access_key.trim().is_empty() {
            return Err(DialogError::Config("access key is empty".to_string()));
        }
        if !(self.endpoint.starts_with("wss://") || self.endpoint.starts_with("ws://")) {
            return Err(DialogError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint
            )));
        }
        if self.writer.max_pending_frames == 0 || self.writer.channel_capacity == 0 {
            return Err(DialogError::Config(
                "writer limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("access_key", &"<redacted>")
            .field("resource_id", &self.resource_id)
            .field("app_key", &self.app_key)
            .field("ack_mode", &self.ack_mode)
            .field("ack_timeout", &self.ack_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("error_code_slot", &self.error_code_slot)
            .field("writer", &self.writer)
            .finish()
    }
}
