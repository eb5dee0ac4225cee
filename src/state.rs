//! Connection and session state machines.
//!
//! [`Lifecycle`] owns both machines plus the identifiers and acknowledgement
//! waiters tied to them. Every transition is a method that checks its
//! precondition and returns `InvalidState` instead of silently doing nothing.
//!
//! ```text
//! connection: Disconnected ─► Connecting ─► Connected ─► Disconnected
//! session:    Inactive ─► Starting ─► Active ─► Finishing ─► Inactive
//! ```
//!
//! The session machine only leaves `Inactive` while the connection is
//! `Connected`, and any reset of the connection resets the session too.

use std::fmt;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{DialogError, Result};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Inactive,
    Starting,
    Active,
    Finishing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Inactive => "inactive",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Finishing => "finishing",
        })
    }
}

/// Receiver side of an acknowledgement wait.
pub type AckReceiver = oneshot::Receiver<Result<()>>;

/// Both state machines and their per-connection data.
#[derive(Debug, Default)]
pub struct Lifecycle {
    connection: ConnectionState,
    session: SessionState,
    connect_id: Option<String>,
    session_id: Option<String>,
    last_dialog_id: Option<String>,
    connect_waiter: Option<oneshot::Sender<Result<()>>>,
    session_waiter: Option<oneshot::Sender<Result<()>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    #[inline]
    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn connect_id(&self) -> Option<&str> {
        self.connect_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Dialog id from the last SessionStarted, kept across sessions.
    pub fn last_dialog_id(&self) -> Option<&str> {
        self.last_dialog_id.as_deref()
    }

    fn describe(&self) -> String {
        if self.connection == ConnectionState::Connected {
            format!("session {}", self.session)
        } else {
            self.connection.to_string()
        }
    }

    fn invalid(&self, operation: &'static str) -> DialogError {
        DialogError::InvalidState {
            operation,
            state: self.describe(),
        }
    }

    // --- connection ---

    /// Disconnected → Connecting.
    pub fn begin_connect(&mut self, connect_id: String) -> Result<()> {
        if self.connection != ConnectionState::Disconnected {
            return Err(self.invalid("connect"));
        }
        debug!(%connect_id, "Connecting");
        self.connection = ConnectionState::Connecting;
        self.connect_id = Some(connect_id);
        Ok(())
    }

    /// Register a wait for the connection acknowledgement.
    pub fn await_connect_ack(&mut self) -> AckReceiver {
        let (tx, rx) = oneshot::channel();
        self.connect_waiter = Some(tx);
        rx
    }

    /// Connecting → Connected. Returns `false` if not connecting.
    pub fn mark_connected(&mut self) -> bool {
        if self.connection != ConnectionState::Connecting {
            return false;
        }
        debug!(connect_id = ?self.connect_id, "Connected");
        self.connection = ConnectionState::Connected;
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Ok(()));
        }
        true
    }

    /// Whether a connect is waiting on an acknowledgement.
    pub fn is_connect_pending(&self) -> bool {
        self.connect_waiter.is_some()
    }

    /// Any state → Disconnected, clearing all per-connection data.
    ///
    /// Pending waiters are rejected with errors built by `reason`. Returns
    /// the state the connection was in.
    pub fn reset(&mut self, reason: impl Fn() -> DialogError) -> ConnectionState {
        let previous = self.connection;
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Err(reason()));
        }
        if let Some(waiter) = self.session_waiter.take() {
            let _ = waiter.send(Err(reason()));
        }
        if previous != ConnectionState::Disconnected {
            debug!(connect_id = ?self.connect_id, "Disconnected");
        }
        self.connection = ConnectionState::Disconnected;
        self.session = SessionState::Inactive;
        self.connect_id = None;
        self.session_id = None;
        previous
    }

    // --- session ---

    /// Inactive → Starting. Requires Connected.
    pub fn begin_session(&mut self, session_id: String) -> Result<()> {
        if self.connection != ConnectionState::Connected || self.session != SessionState::Inactive {
            return Err(self.invalid("start a session"));
        }
        debug!(%session_id, "Starting session");
        self.session = SessionState::Starting;
        self.session_id = Some(session_id);
        Ok(())
    }

    /// Register a wait for the session acknowledgement.
    pub fn await_session_ack(&mut self) -> AckReceiver {
        let (tx, rx) = oneshot::channel();
        self.session_waiter = Some(tx);
        rx
    }

    /// Starting → Active. Records the dialog id when given.
    pub fn mark_session_active(&mut self, dialog_id: Option<String>) -> bool {
        if let Some(dialog_id) = dialog_id.filter(|id| !id.is_empty()) {
            self.last_dialog_id = Some(dialog_id);
        }
        if self.session != SessionState::Starting {
            return false;
        }
        debug!(session_id = ?self.session_id, "Session active");
        self.session = SessionState::Active;
        if let Some(waiter) = self.session_waiter.take() {
            let _ = waiter.send(Ok(()));
        }
        true
    }

    /// Session refused or ended by the server: back to Inactive.
    ///
    /// A pending start is rejected with `error`. Returns the previous state.
    pub fn end_session_remote(&mut self, error: Option<DialogError>) -> SessionState {
        let previous = self.session;
        if let Some(waiter) = self.session_waiter.take() {
            let _ = waiter.send(Err(error.unwrap_or(DialogError::ConnectionClosed)));
        }
        if previous != SessionState::Inactive {
            debug!(session_id = ?self.session_id, from = %previous, "Session ended by server");
        }
        self.session = SessionState::Inactive;
        self.session_id = None;
        previous
    }

    /// Reject whatever is waiting on an acknowledgement.
    ///
    /// A pending connect is rejected but left Connecting for the caller to
    /// tear down; a Starting session goes back to Inactive.
    pub fn reject_pending(&mut self, reason: impl Fn() -> DialogError) -> bool {
        let mut rejected = false;
        if let Some(waiter) = self.connect_waiter.take() {
            let _ = waiter.send(Err(reason()));
            rejected = true;
        }
        if self.session == SessionState::Starting {
            self.end_session_remote(Some(reason()));
            rejected = true;
        }
        rejected
    }

    /// Starting → Inactive after a local failure (send error, timeout).
    pub fn abort_session_start(&mut self) {
        if self.session == SessionState::Starting {
            self.session_waiter = None;
            self.session = SessionState::Inactive;
            self.session_id = None;
        }
    }

    /// Active → Finishing. Returns the session id to scope the finish to.
    pub fn begin_finish_session(&mut self) -> Result<String> {
        if self.connection != ConnectionState::Connected || self.session != SessionState::Active {
            return Err(self.invalid("finish a session"));
        }
        self.session = SessionState::Finishing;
        self.active_id("finish a session")
    }

    /// Finishing → Inactive.
    pub fn finish_session_done(&mut self) {
        if self.session == SessionState::Finishing {
            debug!(session_id = ?self.session_id, "Session finished");
            self.session = SessionState::Inactive;
            self.session_id = None;
        }
    }

    /// Session id if Active, for session-scoped sends.
    pub fn require_active(&self, operation: &'static str) -> Result<String> {
        if self.connection != ConnectionState::Connected || self.session != SessionState::Active {
            return Err(self.invalid(operation));
        }
        self.active_id(operation)
    }

    fn active_id(&self, operation: &'static str) -> Result<String> {
        self.session_id.clone().ok_or_else(|| self.invalid(operation))
    }
}
