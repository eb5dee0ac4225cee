//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the client and
//! registering handlers. The [`DialogClient`] manages the lifecycle:
//! 1. Open the transport with the handshake headers
//! 2. Spawn the writer task and the read loop
//! 3. Send StartConnection and, depending on [`AckMode`], wait for
//!    ConnectionStarted
//! 4. Run sessions: StartSession, audio and text, FinishSession
//! 5. Drop unwritten frames, send FinishConnection and close
//!
//! # Example
//!
//! ```no_run
//! use dialog_client::{DialogClient, ServerEventId, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> dialog_client::Result<()> {
//!     let client = DialogClient::builder("app-id", "access-key")
//!         .on(ServerEventId::ChatResponse, |event| {
//!             if let Some(chat) = event.chat() {
//!                 print!("{}", chat.content);
//!             }
//!             Ok(())
//!         })
//!         .on_error(|err| eprintln!("dialog error: {err}"))
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.start_session(SessionConfig::new("Bot")).await?;
//!     client.send_chat_tts_text("你好", true, true).await?;
//!     client.finish_session().await?;
//!     client.disconnect().await
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::codec::JsonCodec;
use crate::config::{AckMode, ClientConfig};
use crate::error::{DialogError, Result};
use crate::handler::{EventRegistry, HandlerResult, InboundEvent, Subscription};
use crate::payload::{ErrorPayload, ServerEvent, SessionConfig};
use crate::protocol::{messages, DecodeOptions, Frame, ServerEventId};
use crate::state::{AckReceiver, ConnectionState, Lifecycle, SessionState};
use crate::transport::{Connector, FrameStream, Handshake, WebSocketConnector};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Builder for configuring and creating a [`DialogClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    registry: EventRegistry,
}

impl ClientBuilder {
    /// Create a builder with the given credentials and default settings.
    pub fn new(app_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(app_id, access_key))
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            registry: EventRegistry::new(),
        }
    }

    /// Set the WebSocket endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set when connect/start_session complete.
    ///
    /// Default: [`AckMode::AwaitAck`]
    pub fn ack_mode(mut self, mode: AckMode) -> Self {
        self.config.ack_mode = mode;
        self
    }

    /// Set how long to wait for ConnectionStarted / SessionStarted.
    ///
    /// Default: 10 seconds
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Set how long disconnect waits for the goodbye frames to be written.
    ///
    /// Default: 5 seconds
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.writer.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.writer.backpressure_timeout = timeout;
        self
    }

    /// Expect a u32 error code ahead of the body of error frames.
    ///
    /// Default: false
    pub fn error_code_slot(mut self, enabled: bool) -> Self {
        self.config.error_code_slot = enabled;
        self
    }

    /// Use a custom transport. Default: [`WebSocketConnector`].
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Register an event handler.
    pub fn on<F>(self, event: ServerEventId, handler: F) -> Self
    where
        F: Fn(&InboundEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.on(event, handler);
        self
    }

    /// Register an error handler.
    pub fn on_error<F>(self, handler: F) -> Self
    where
        F: Fn(&DialogError) + Send + Sync + 'static,
    {
        self.registry.on_error(handler);
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> Result<DialogClient> {
        self.config.validate()?;
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));
        Ok(DialogClient {
            shared: Arc::new(Shared {
                config: self.config,
                connector,
                registry: self.registry,
                inner: Mutex::new(Inner::default()),
            }),
        })
    }
}

/// Per-connection runtime state.
#[derive(Default)]
struct Inner {
    lifecycle: Lifecycle,
    writer: Option<WriterHandle>,
    writer_task: Option<JoinHandle<Result<()>>>,
    reader_task: Option<JoinHandle<()>>,
    /// Bumped on every connect and disconnect so stale tasks stand down.
    generation: u64,
}

struct Shared {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    registry: EventRegistry,
    inner: Mutex<Inner>,
}

/// Client for the realtime voice dialogue service.
///
/// One connection and at most one session at a time. All methods take
/// `&self`; the client can be shared behind an `Arc`.
pub struct DialogClient {
    shared: Arc<Shared>,
}

impl DialogClient {
    /// Create a new client builder.
    pub fn builder(app_id: impl Into<String>, access_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(app_id, access_key)
    }

    /// Client over WebSocket with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::from_config(config).build()
    }

    /// Open the connection.
    ///
    /// Fails with `InvalidState` unless disconnected. In
    /// [`AckMode::AwaitAck`] this waits for ConnectionStarted.
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        let connect_id = Uuid::new_v4().to_string();
        let generation = {
            let mut inner = shared.lock();
            inner.lifecycle.begin_connect(connect_id.clone())?;
            inner.generation += 1;
            inner.generation
        };

        let handshake = Handshake {
            endpoint: shared.config.endpoint.clone(),
            app_id: shared.config.app_id.clone(),
            access_key: shared.config.access_key.clone(),
            resource_id: shared.config.resource_id.clone(),
            app_key: shared.config.app_key.clone(),
            connect_id,
        };

        let pair = match shared.connector.connect(&handshake).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(endpoint = %handshake.endpoint, error = %e, "Failed to open transport");
                shared.close_local(generation, || DialogError::ConnectionClosed);
                shared.registry.report_error(&e);
                return Err(e);
            }
        };

        let (writer, writer_task) = spawn_writer_task(pair.sink, &shared.config.writer);
        let ack = {
            let mut inner = shared.lock();
            if inner.generation != generation
                || inner.lifecycle.connection() != ConnectionState::Connecting
            {
                // disconnect() ran while the transport was opening
                return Err(DialogError::ConnectionClosed);
            }
            inner.writer = Some(writer.clone());
            inner.writer_task = Some(writer_task);
            let ack = match shared.config.ack_mode {
                AckMode::AwaitAck => Some(inner.lifecycle.await_connect_ack()),
                AckMode::Optimistic => None,
            };
            inner.reader_task = Some(tokio::spawn(read_loop(
                Arc::clone(shared),
                pair.stream,
                generation,
            )));
            ack
        };

        let queued = match OutboundFrame::encode(&messages::start_connection()) {
            Ok(frame) => writer.send(frame).await,
            Err(e) => Err(e),
        };
        drop(writer);
        if let Err(e) = queued {
            error!(error = %e, "Failed to queue StartConnection");
            shared.close_local(generation, || DialogError::ConnectionClosed);
            shared.registry.report_error(&e);
            return Err(e);
        }

        match ack {
            None => {
                let mut inner = shared.lock();
                if inner.generation == generation {
                    inner.lifecycle.mark_connected();
                }
                Ok(())
            }
            Some(ack) => {
                let result = wait_for_ack(ack, shared.config.ack_timeout, "connection").await;
                if result.is_err() {
                    shared.close_local(generation, || DialogError::ConnectionClosed);
                }
                result
            }
        }
    }

    /// Close the connection.
    ///
    /// Frames queued but not yet written are discarded. FinishSession (when
    /// a session is active) and FinishConnection are then written, reading
    /// stops, and the writer gets up to the close timeout to hand them to
    /// the transport. Calling this while disconnected does nothing.
    ///
    /// Local state is always reset. The first failure along the way is
    /// returned after that.
    pub async fn disconnect(&self) -> Result<()> {
        let shared = &self.shared;
        let (writer, finish_session) = {
            let mut inner = shared.lock();
            if inner.lifecycle.connection() == ConnectionState::Disconnected {
                return Ok(());
            }
            let finish_session = if inner.lifecycle.session() == SessionState::Active {
                inner.lifecycle.begin_finish_session().ok()
            } else {
                None
            };
            (inner.writer.clone(), finish_session)
        };

        let mut failure: Option<DialogError> = None;
        if let Some(writer) = &writer {
            let farewell = goodbye_frames(finish_session.as_deref());
            if finish_session.is_some() {
                shared.lock().lifecycle.finish_session_done();
            }
            let sent = farewell.and_then(|frames| writer.shutdown(frames));
            if let Err(e) = sent {
                warn!(error = %e, "Failed to send goodbye frames on disconnect");
                failure.get_or_insert(e);
            }
        }
        drop(writer);

        let (writer_task, reader_task) = {
            let mut inner = shared.lock();
            inner.generation += 1;
            inner.lifecycle.reset(|| DialogError::ConnectionClosed);
            inner.writer = None;
            (inner.writer_task.take(), inner.reader_task.take())
        };

        if let Some(reader) = reader_task {
            reader.abort();
        }

        if let Some(mut task) = writer_task {
            let outcome = match tokio::time::timeout(shared.config.close_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {
                    debug!("Writer closed");
                    Ok(())
                }
                Ok(Ok(Err(e))) => {
                    warn!(error = %e, "Writer ended with error");
                    Err(e)
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Writer task failed");
                    Err(DialogError::Transport(format!("writer task failed: {e}")))
                }
                Err(_) => {
                    warn!("Goodbye frames not written before close timeout");
                    task.abort();
                    Err(DialogError::Transport(
                        "goodbye frames not written before close timeout".into(),
                    ))
                }
            };
            if let Err(e) = outcome {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start a dialogue session. Returns the new session id.
    ///
    /// Requires a connection and no active session. In
    /// [`AckMode::AwaitAck`] this waits for SessionStarted.
    pub async fn start_session(&self, config: SessionConfig) -> Result<String> {
        let shared = &self.shared;
        let session_id = Uuid::new_v4().to_string();
        let frame = OutboundFrame::encode(&messages::start_session(&session_id, &config)?)?;

        let (writer, ack, generation) = {
            let mut inner = shared.lock();
            inner.lifecycle.begin_session(session_id.clone())?;
            let Some(writer) = inner.writer.clone() else {
                inner.lifecycle.abort_session_start();
                return Err(DialogError::ConnectionClosed);
            };
            let ack = match shared.config.ack_mode {
                AckMode::AwaitAck => Some(inner.lifecycle.await_session_ack()),
                AckMode::Optimistic => None,
            };
            (writer, ack, inner.generation)
        };

        if let Err(e) = writer.send(frame).await {
            shared.abort_session_start(generation, &session_id);
            return Err(e);
        }
        drop(writer);

        match ack {
            None => {
                let mut inner = shared.lock();
                if inner.generation == generation
                    && inner.lifecycle.session_id() == Some(session_id.as_str())
                {
                    inner.lifecycle.mark_session_active(None);
                }
            }
            Some(ack) => {
                if let Err(e) = wait_for_ack(ack, shared.config.ack_timeout, "session").await {
                    shared.abort_session_start(generation, &session_id);
                    return Err(e);
                }
            }
        }
        Ok(session_id)
    }

    /// Finish the active session.
    pub async fn finish_session(&self) -> Result<()> {
        let shared = &self.shared;
        let (writer, session_id) = {
            let mut inner = shared.lock();
            let session_id = inner.lifecycle.begin_finish_session()?;
            (inner.writer.clone(), session_id)
        };

        let result = match writer {
            Some(writer) => queue(&writer, &messages::finish_session(&session_id)).await,
            None => Err(DialogError::ConnectionClosed),
        };
        shared.lock().lifecycle.finish_session_done();
        result
    }

    /// Send a chunk of audio. The bytes go out as given.
    pub async fn send_audio(&self, audio: impl Into<Bytes>) -> Result<()> {
        let audio = audio.into();
        self.send_in_session("send audio", |sid| Ok(messages::task_request(sid, audio)))
            .await
    }

    /// Ask the bot to say a greeting.
    pub async fn send_hello(&self, content: &str) -> Result<()> {
        self.send_in_session("send hello", |sid| messages::say_hello(sid, content))
            .await
    }

    /// Send text for the bot to speak. `start`/`end` mark the first and last
    /// piece of a streamed utterance.
    pub async fn send_chat_tts_text(&self, content: &str, start: bool, end: bool) -> Result<()> {
        self.send_in_session("send chat text", |sid| {
            messages::chat_tts_text(sid, content, start, end)
        })
        .await
    }

    async fn send_in_session(
        &self,
        operation: &'static str,
        build: impl FnOnce(&str) -> Result<Frame>,
    ) -> Result<()> {
        let (writer, session_id) = {
            let inner = self.shared.lock();
            let session_id = inner.lifecycle.require_active(operation)?;
            let writer = inner.writer.clone().ok_or(DialogError::ConnectionClosed)?;
            (writer, session_id)
        };
        queue(&writer, &build(&session_id)?).await
    }

    /// Register an event handler.
    pub fn on<F>(&self, event: ServerEventId, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.shared.registry.on(event, handler)
    }

    /// Remove a handler registered with [`on`](Self::on) or
    /// [`on_error`](Self::on_error).
    pub fn off(&self, subscription: &Subscription) -> bool {
        self.shared.registry.off(subscription)
    }

    /// Register an error handler.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DialogError) + Send + Sync + 'static,
    {
        self.shared.registry.on_error(handler)
    }

    /// The handler registry.
    pub fn registry(&self) -> &EventRegistry {
        &self.shared.registry
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Whether the connection is established and acknowledged.
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Whether a session is active.
    pub fn is_session_active(&self) -> bool {
        self.session_state() == SessionState::Active
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().lifecycle.connection()
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.shared.lock().lifecycle.session()
    }

    /// Id of the session being started, active or finishing.
    pub fn current_session_id(&self) -> Option<String> {
        self.shared.lock().lifecycle.session_id().map(str::to_owned)
    }

    /// Connect id of the current connection, sent in the handshake headers.
    pub fn connect_id(&self) -> Option<String> {
        self.shared.lock().lifecycle.connect_id().map(str::to_owned)
    }

    /// Dialog id from the last SessionStarted; pass it to the next
    /// [`SessionConfig`] to resume context.
    pub fn last_dialog_id(&self) -> Option<String> {
        self.shared.lock().lifecycle.last_dialog_id().map(str::to_owned)
    }

    /// Frames queued but not yet written.
    pub fn pending_frames(&self) -> usize {
        self.shared
            .lock()
            .writer
            .as_ref()
            .map_or(0, WriterHandle::pending_count)
    }

    /// Get the current backpressure status.
    pub fn is_backpressure_active(&self) -> bool {
        self.shared
            .lock()
            .writer
            .as_ref()
            .is_some_and(WriterHandle::is_backpressure_active)
    }
}

impl Drop for DialogClient {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        inner.writer = None;
        if let Some(reader) = inner.reader_task.take() {
            reader.abort();
        }
        inner.lifecycle.reset(|| DialogError::ConnectionClosed);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the connection without goodbye frames.
    ///
    /// Releases the writer so it drains and closes the transport. Returns
    /// `false` if `generation` is stale or the client was already
    /// disconnected.
    fn close_local(&self, generation: u64, reason: impl Fn() -> DialogError) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.generation += 1;
        let previous = inner.lifecycle.reset(reason);
        inner.writer = None;
        inner.writer_task = None;
        // may be the calling task; it stops at its next await
        if let Some(reader) = inner.reader_task.take() {
            reader.abort();
        }
        previous != ConnectionState::Disconnected
    }

    fn abort_session_start(&self, generation: u64, session_id: &str) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.lifecycle.session_id() == Some(session_id) {
            inner.lifecycle.abort_session_start();
        }
    }

    /// Handle one inbound message. Returns `false` to stop reading.
    fn handle_message(&self, generation: u64, bytes: &Bytes) -> bool {
        let options = DecodeOptions {
            error_code_slot: self.config.error_code_slot,
        };
        let frame = match Frame::decode_bytes_with(bytes, options) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Dropping undecodable frame");
                self.registry.report_error(&DialogError::Frame(e));
                return true;
            }
        };

        if frame.is_error() {
            self.handle_error_frame(generation, &frame);
            return true;
        }

        let event = match InboundEvent::from_frame(&frame) {
            Ok(Some(event)) => event,
            Ok(None) => return true,
            Err(e) => {
                warn!(event_id = ?frame.event_id, error = %e, "Dropping malformed event");
                self.registry.report_error(&e);
                return true;
            }
        };

        let keep_reading = self.apply_lifecycle(generation, &event);
        let report = self.registry.dispatch(&event);
        debug!(
            event = %event.id,
            handlers = report.invoked,
            failed = report.failed,
            "Dispatched event"
        );
        keep_reading
    }

    fn handle_error_frame(&self, generation: u64, frame: &Frame) {
        let body = frame.decompressed_payload().unwrap_or_else(|_| frame.payload.clone());
        let message = JsonCodec::decode::<ErrorPayload>(&body)
            .ok()
            .map(|p| p.error)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned());
        let error = DialogError::Server {
            code: frame.error_code,
            message,
        };
        warn!(code = ?frame.error_code, error = %error, "Server reported an error");

        {
            let mut inner = self.lock();
            if inner.generation == generation {
                inner.lifecycle.reject_pending(|| error.duplicate());
            }
        }
        self.registry.report_error(&error);
    }

    /// Apply lifecycle events to the state machines before dispatch.
    fn apply_lifecycle(&self, generation: u64, event: &InboundEvent) -> bool {
        match &event.event {
            ServerEvent::ConnectionStarted(_) => {
                let mut inner = self.lock();
                if inner.generation == generation {
                    inner.lifecycle.mark_connected();
                }
                true
            }
            ServerEvent::ConnectionFailed(payload) => {
                warn!(error = %payload.error, "Server refused the connection");
                let message = payload.error.clone();
                self.close_local(generation, || DialogError::ConnectionFailed(message.clone()));
                false
            }
            ServerEvent::ConnectionFinished(_) => {
                debug!("Server finished the connection");
                self.close_local(generation, || DialogError::ConnectionClosed);
                false
            }
            ServerEvent::SessionStarted(started) => {
                let mut inner = self.lock();
                if inner.generation == generation && is_current(&inner, event) {
                    inner.lifecycle.mark_session_active(started.dialog_id.clone());
                }
                true
            }
            ServerEvent::SessionFinished(_) => {
                let mut inner = self.lock();
                if inner.generation == generation && is_current(&inner, event) {
                    inner.lifecycle.end_session_remote(None);
                }
                true
            }
            ServerEvent::SessionFailed(payload) => {
                warn!(error = %payload.error, "Server failed the session");
                let mut inner = self.lock();
                if inner.generation == generation && is_current(&inner, event) {
                    inner
                        .lifecycle
                        .end_session_remote(Some(DialogError::SessionFailed(payload.error.clone())));
                }
                true
            }
            _ => true,
        }
    }
}

/// Whether a session event refers to the session in progress.
fn is_current(inner: &Inner, event: &InboundEvent) -> bool {
    match (event.session_id.as_deref(), inner.lifecycle.session_id()) {
        (Some(theirs), Some(ours)) => theirs == ours,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

fn goodbye_frames(finish_session: Option<&str>) -> Result<Vec<OutboundFrame>> {
    let mut frames = Vec::with_capacity(2);
    if let Some(session_id) = finish_session {
        frames.push(OutboundFrame::encode(&messages::finish_session(session_id))?);
    }
    frames.push(OutboundFrame::encode(&messages::finish_connection())?);
    Ok(frames)
}

async fn queue(writer: &WriterHandle, frame: &Frame) -> Result<()> {
    writer.send(OutboundFrame::encode(frame)?).await
}

async fn wait_for_ack(ack: AckReceiver, timeout: Duration, what: &'static str) -> Result<()> {
    match tokio::time::timeout(timeout, ack).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(DialogError::ConnectionClosed),
        Err(_) => {
            warn!(?timeout, what, "No acknowledgement");
            Err(DialogError::AckTimeout(what))
        }
    }
}

/// Main read loop - decodes inbound messages and dispatches them.
async fn read_loop(shared: Arc<Shared>, mut stream: FrameStream, generation: u64) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(bytes) => {
                if !shared.handle_message(generation, &bytes) {
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "Transport error");
                shared.close_local(generation, || e.duplicate());
                shared.registry.report_error(&e);
                return;
            }
        }
    }

    debug!("Transport closed by peer");
    if shared.close_local(generation, || DialogError::ConnectionClosed) {
        shared.registry.report_error(&DialogError::ConnectionClosed);
    }
}
