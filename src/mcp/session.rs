//! Per-connection handshake state.
//!
//! One [`Session`] exists per logical connection: the whole process for
//! stdio, one TCP connection for HTTP. It is owned by the task serving that
//! connection; nothing here is shared.

use super::types::{ClientInfo, ServerCapabilities};
use crate::error::McpError;

/// Handshake progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No handshake has happened yet.
    #[default]
    Uninitialized,
    /// An `initialize` request is being answered.
    Initializing,
    /// The handshake completed; all methods are accepted.
    Ready,
    /// The transport was torn down.
    Closed,
}

/// State tracked for one connection.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
    client_info: Option<ClientInfo>,
    protocol_version: Option<String>,
    capabilities: ServerCapabilities,
}

impl Session {
    /// Creates a session in the `Uninitialized` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` once the handshake has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Client identity from the handshake.
    #[must_use]
    pub const fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.as_ref()
    }

    /// Protocol version the client asked for.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Capabilities advertised at handshake time.
    #[must_use]
    pub const fn capabilities(&self) -> ServerCapabilities {
        self.capabilities
    }

    /// `Uninitialized -> Initializing`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` from any other state; the state is left
    /// unchanged.
    pub fn begin_handshake(&mut self) -> Result<(), McpError> {
        match self.state {
            SessionState::Uninitialized => {
                self.state = SessionState::Initializing;
                Ok(())
            }
            _ => Err(McpError::already_initialized()),
        }
    }

    /// `Initializing -> Ready`, recording the capability snapshot.
    ///
    /// # Errors
    ///
    /// Returns `InitializationFailed` if no handshake is in progress.
    pub fn complete_handshake(
        &mut self,
        capabilities: ServerCapabilities,
        client_info: ClientInfo,
        protocol_version: String,
    ) -> Result<(), McpError> {
        if self.state != SessionState::Initializing {
            return Err(McpError::initialization_failed("no handshake in progress"));
        }
        self.capabilities = capabilities;
        self.client_info = Some(client_info);
        self.protocol_version = Some(protocol_version);
        self.state = SessionState::Ready;
        Ok(())
    }

    /// `Initializing -> Uninitialized` after a failed handshake.
    pub fn abort_handshake(&mut self) {
        if self.state == SessionState::Initializing {
            self.state = SessionState::Uninitialized;
        }
    }

    /// Gate for every method except `initialize`.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` unless the session is `Ready`.
    pub fn require_ready(&self) -> Result<(), McpError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(McpError::not_initialized())
        }
    }

    /// Moves to `Closed`. Reachable from every state.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}
