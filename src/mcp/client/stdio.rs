//! Client channel over newline-delimited JSON.

use std::ffi::OsStr;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::{parse_reply, Channel};
use crate::config::ClientConfig;
use crate::error::McpError;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::transport::LineTransport;

/// How long a child gets to exit after its stdin is closed.
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(5);

/// A channel over a child process's pipes.
pub type ChildChannel = StdioChannel<ChildStdout, ChildStdin>;

/// A request/response channel over a line-framed stream pair.
///
/// The first line after a request that carries an `id` is taken as its
/// response. Lines without an `id` are server notifications and are
/// skipped.
pub struct StdioChannel<R, W> {
    transport: LineTransport<R, W>,
    /// Kept so the child is reaped on close and killed on drop.
    child: Option<Child>,
    request_timeout: Duration,
}

impl<R, W> std::fmt::Debug for StdioChannel<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioChannel")
            .field("child", &self.child.as_ref().and_then(Child::id))
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl StdioChannel<tokio::io::Stdin, tokio::io::Stdout> {
    /// A channel over this process's own stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl ChildChannel {
    /// Spawns `program` and talks to it over its stdin/stdout.
    ///
    /// The child's stderr is inherited so its logs stay visible.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the process cannot be started.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self, McpError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                McpError::connection_failed(format!("{}: {e}", program.to_string_lossy()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::connection_failed("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::connection_failed("child stdout unavailable"))?;

        tracing::debug!(pid = ?child.id(), program = %program.to_string_lossy(), "Spawned server");

        let mut channel = Self::new(stdout, stdin);
        channel.child = Some(child);
        Ok(channel)
    }
}

impl<R, W> StdioChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a channel over the given streams with the default timeout.
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            transport: LineTransport::new(reader, writer),
            child: None,
            request_timeout: ClientConfig::default().request_timeout(),
        }
    }

    /// Bounds each request/response cycle.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn exchange(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        self.transport
            .write_message(request)
            .await
            .map_err(write_failure)?;

        loop {
            let line = self
                .transport
                .read_line()
                .await
                .map_err(read_failure)?
                .ok_or_else(|| McpError::connection_closed("server closed its output"))?;

            if line.trim().is_empty() {
                return Err(McpError::invalid_message("Empty message"));
            }

            let envelope = parse_reply(&line)?;

            if envelope.is_notification() {
                tracing::debug!(method = ?envelope.method(), "Skipping server notification");
                continue;
            }

            let response = envelope.into_response()?;
            if Some(response.id) != request.id {
                tracing::warn!(
                    expected = ?request.id,
                    received = response.id,
                    "Response id does not match request"
                );
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl<R, W> Channel for StdioChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let timeout = self.request_timeout;
        tokio::time::timeout(timeout, self.exchange(request))
            .await
            .unwrap_or_else(|_| {
                Err(McpError::connection_timeout(format!(
                    "no response to '{}' within {timeout:?}",
                    request.method
                )))
            })
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError> {
        self.transport
            .write_message(notification)
            .await
            .map_err(write_failure)
    }

    async fn close(&mut self) -> Result<(), McpError> {
        let shutdown = self.transport.shutdown().await;

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "Server exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for server"),
                Err(_) => {
                    tracing::warn!("Server did not exit, killing it");
                    child
                        .kill()
                        .await
                        .map_err(|e| McpError::internal_error(e.to_string()))?;
                }
            }
        }

        match shutdown {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(McpError::write_error(e.to_string())),
        }
    }
}

fn read_failure(e: io::Error) -> McpError {
    if e.kind() == io::ErrorKind::InvalidData {
        McpError::parse_error(format!("reply is not UTF-8: {e}"))
    } else {
        McpError::read_error(e.to_string())
    }
}

fn write_failure(e: io::Error) -> McpError {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
            McpError::connection_closed(e.to_string())
        }
        _ => McpError::write_error(e.to_string()),
    }
}
