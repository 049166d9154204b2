//! stdio MCP server.
//!
//! This module implements the server lifecycle over a line transport:
//!
//! 1. **Initialisation**: the first `initialize` request moves the single
//!    session to `Ready`, after which an unsolicited
//!    `notifications/initialized` is written
//! 2. **Operation**: each line is dispatched and answered before the next
//!    line is read
//! 3. **Shutdown**: EOF on input, SIGINT or SIGTERM
//!
//! One process serves exactly one session.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::McpError;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcResponse};
use crate::mcp::registry::Registry;
use crate::mcp::session::Session;
use crate::mcp::transport::{LineTransport, StdioTransport};

/// Default server name reported in `serverInfo`.
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

/// Default server version reported in `serverInfo`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// An MCP server speaking newline-delimited JSON-RPC.
#[derive(Debug, Clone)]
pub struct McpServer {
    /// Handlers to serve; shared with the dispatcher once serving starts.
    registry: Arc<Registry>,
    /// Name reported in `serverInfo`.
    name: String,
    /// Version reported in `serverInfo`.
    version: String,
}

impl McpServer {
    /// Creates a server over the given registry.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
        }
    }

    /// Sets the identity reported in `serverInfo`.
    pub fn set_server_info(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.name = name.into();
        self.version = version.into();
    }

    /// The registry being served.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable access for registration before serving.
    pub fn registry_mut(&mut self) -> &mut Registry {
        Arc::make_mut(&mut self.registry)
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.registry), &self.name, &self.version)
    }

    /// Serves stdin/stdout until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` / `WriteError` if transport I/O fails, or
    /// `InternalError` if signal handlers cannot be installed.
    pub async fn run(&self) -> Result<(), McpError> {
        let mut transport = StdioTransport::stdio();
        self.run_with_shutdown(&mut transport).await
    }

    /// Serves the given transport until EOF.
    ///
    /// # Errors
    ///
    /// Returns `ReadError` / `WriteError` if transport I/O fails.
    pub async fn serve<R, W>(&self, transport: &mut LineTransport<R, W>) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let dispatcher = self.dispatcher();
        let mut session = Session::new();

        loop {
            let line = transport.read_line().await;
            if Self::handle_transport_result(&dispatcher, &mut session, transport, line).await? {
                return Ok(());
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown<R, W>(
        &self,
        transport: &mut LineTransport<R, W>,
    ) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint =
            signal(SignalKind::interrupt()).map_err(|e| McpError::internal_error(e.to_string()))?;
        let mut sigterm =
            signal(SignalKind::terminate()).map_err(|e| McpError::internal_error(e.to_string()))?;

        let dispatcher = self.dispatcher();
        let mut session = Session::new();

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    session.close();
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    session.close();
                    return Ok(());
                }

                line = transport.read_line() => {
                    if Self::handle_transport_result(&dispatcher, &mut session, transport, line).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown<R, W>(
        &self,
        transport: &mut LineTransport<R, W>,
    ) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let dispatcher = self.dispatcher();
        let mut session = Session::new();

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    session.close();
                    return Ok(());
                }

                line = transport.read_line() => {
                    if Self::handle_transport_result(&dispatcher, &mut session, transport, line).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from a transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result<R, W>(
        dispatcher: &Dispatcher,
        session: &mut Session,
        transport: &mut LineTransport<R, W>,
        line: std::io::Result<Option<String>>,
    ) -> Result<bool, McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                let err = McpError::parse_error(format!("line is not UTF-8: {e}"));
                tracing::warn!(error = %err, "Rejecting undecodable line");
                transport
                    .write_message(&JsonRpcResponse::failure(0, &err))
                    .await
                    .map_err(|e| McpError::write_error(e.to_string()))?;
                return Ok(false);
            }
            Err(e) => return Err(McpError::read_error(e.to_string())),
        };
        let Some(line) = line else {
            tracing::info!("Input closed, shutting down");
            session.close();
            return Ok(true);
        };

        if line.trim().is_empty() {
            tracing::warn!(error = %McpError::invalid_message("Empty message"), "Skipping blank line");
            return Ok(false);
        }

        let was_ready = session.is_ready();

        if let Some(response) = dispatcher.handle(session, &line).await {
            transport
                .write_message(&response)
                .await
                .map_err(|e| McpError::write_error(e.to_string()))?;
        }

        if !was_ready && session.is_ready() {
            transport
                .write_message(&JsonRpcNotification::initialized())
                .await
                .map_err(|e| McpError::write_error(e.to_string()))?;
        }

        Ok(false)
    }
}
