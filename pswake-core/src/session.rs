//! Protocol state tracking for one session connection
//!
//! Tracks where a connection is in the handshake:
//! - Connection state (validated transitions)
//! - Connection generation (bumped on every connect, to spot stale work)

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No socket
    Disconnected,

    /// TCP connect in progress
    Connecting,

    /// Client hello sent, waiting for the server hello
    AwaitingHello,

    /// Handshake done, not logged in
    AwaitingLogin,

    /// Logged in and ready for commands
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting-hello",
            Self::AwaitingLogin => "awaiting-login",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Protocol state tracker
///
/// Thread-safe and can be cloned cheaply (Arc internally).
#[derive(Debug, Clone)]
pub struct ProtocolState {
    inner: Arc<ProtocolStateInner>,
}

#[derive(Debug)]
struct ProtocolStateInner {
    /// Incremented by every `begin_connect`
    generation: AtomicU64,

    /// Current session state
    state: parking_lot::RwLock<SessionState>,
}

impl ProtocolState {
    /// Create a new disconnected tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ProtocolStateInner {
                generation: AtomicU64::new(0),
                state: parking_lot::RwLock::new(SessionState::Disconnected),
            }),
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Get current connection generation
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Check if a socket exists or is being opened
    pub fn is_connected(&self) -> bool {
        !matches!(self.state(), SessionState::Disconnected)
    }

    /// Check if the handshake finished (logged in or not)
    pub fn is_handshaken(&self) -> bool {
        matches!(self.state(), SessionState::AwaitingLogin | SessionState::Ready)
    }

    /// Check if logged in
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), SessionState::Ready)
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<()> {
        let mut state = self.inner.state.write();

        if *state != from {
            return Err(Error::InvalidSessionState(format!(
                "Cannot move to {} from state: {}",
                to, *state
            )));
        }

        *state = to;
        Ok(())
    }

    /// Start a new connection; returns its generation
    ///
    /// Fails unless the previous connection has fully closed.
    pub fn begin_connect(&self) -> Result<u64> {
        self.transition(SessionState::Disconnected, SessionState::Connecting)?;
        Ok(self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// TCP connected and client hello sent
    pub fn connected(&self) -> Result<()> {
        self.transition(SessionState::Connecting, SessionState::AwaitingHello)
    }

    /// Server hello accepted and handshake sent
    pub fn hello_received(&self) -> Result<()> {
        self.transition(SessionState::AwaitingHello, SessionState::AwaitingLogin)
    }

    /// Login succeeded
    pub fn logged_in(&self) -> Result<()> {
        self.transition(SessionState::AwaitingLogin, SessionState::Ready)
    }

    /// Logout acknowledged
    pub fn logged_out(&self) -> Result<()> {
        self.transition(SessionState::Ready, SessionState::AwaitingLogin)
    }

    /// Close from any state
    ///
    /// Returns `false` if already disconnected.
    pub fn close(&self) -> bool {
        let mut state = self.inner.state.write();
        let was_open = *state != SessionState::Disconnected;
        *state = SessionState::Disconnected;
        was_open
    }
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::new()
    }
}
