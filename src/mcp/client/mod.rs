//! MCP client.
//!
//! [`McpClient`] owns the request-id counter and the client half of the
//! handshake, and exposes typed operations for every method in the MCP
//! method table. How bytes reach the server is left to a [`Channel`]:
//!
//! - [`StdioChannel`]: newline-delimited JSON over a stream pair or a child
//!   process, matching the next response-shaped line to the pending call
//! - [`HttpChannel`]: one HTTP request/response cycle per call, with
//!   keep-alive and transparent reconnection
//!
//! One client instance has at most one call in flight; independent
//! instances share nothing.

mod http;
mod stdio;

pub use self::http::HttpChannel;
pub use self::stdio::{ChildChannel, StdioChannel};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use serde_json::{json, Value};

use crate::error::{McpError, McpErrorKind};
use crate::mcp::protocol::{
    methods, to_raw, Envelope, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    MCP_PROTOCOL_VERSION,
};
use crate::mcp::types::{
    ClientInfo, InitializeParams, InitializeResult, Prompt, Resource, ServerCapabilities,
    ServerInfo, Tool, ToolCallResult,
};

/// Moves JSON-RPC messages between a client and a server.
#[async_trait]
pub trait Channel: Send {
    /// Sends a request and returns the response paired with it.
    ///
    /// # Errors
    ///
    /// Connection kinds for transport failures and timeouts, `ParseError`
    /// or `InvalidMessage` for an uninterpretable reply.
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Sends a notification; nothing is read back.
    ///
    /// # Errors
    ///
    /// Connection kinds for transport failures.
    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError>;

    /// Releases the underlying transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be shut down cleanly.
    async fn close(&mut self) -> Result<(), McpError>;
}

/// Client over a stdio channel.
pub type StdioClient<R, W> = McpClient<StdioChannel<R, W>>;

/// Client over an HTTP channel.
pub type HttpClient = McpClient<HttpChannel>;

/// A client session with one MCP server.
#[derive(Debug)]
pub struct McpClient<C> {
    channel: C,
    next_id: i64,
    initialized: bool,
    server_info: Option<ServerInfo>,
    capabilities: ServerCapabilities,
}

impl<C: Channel> McpClient<C> {
    /// Wraps a channel. No traffic is sent until [`McpClient::initialize`].
    #[must_use]
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            next_id: 1,
            initialized: false,
            server_info: None,
            capabilities: ServerCapabilities::default(),
        }
    }

    /// The underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns `true` after a successful handshake.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Server identity from the handshake.
    #[must_use]
    pub const fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Capabilities advertised by the server at handshake time.
    #[must_use]
    pub const fn server_capabilities(&self) -> ServerCapabilities {
        self.capabilities
    }

    /// Sends one request and returns its raw result.
    ///
    /// Ids start at 1 and are never reused by this client.
    ///
    /// # Errors
    ///
    /// Returns the channel's error, or the [`McpError`] decoded from a
    /// JSON-RPC error response.
    pub async fn send_request(
        &mut self,
        method: &str,
        params: Option<Box<RawValue>>,
    ) -> Result<Box<RawValue>, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = JsonRpcRequest::new(id, method, params);
        tracing::debug!(id, method, "Sending request");

        let response = self.channel.request(&request).await?;
        response.into_result()
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns the channel's error.
    pub async fn send_notification(
        &mut self,
        method: &str,
        params: Option<Box<RawValue>>,
    ) -> Result<(), McpError> {
        tracing::debug!(method, "Sending notification");
        self.channel
            .notify(&JsonRpcNotification::new(method, params))
            .await
    }

    /// Performs the handshake and sends `notifications/initialized`.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` if called twice (no traffic is sent)
    /// - `InitializationFailed` if the result cannot be decoded
    /// - any error from the exchange itself
    pub async fn initialize(
        &mut self,
        client_name: &str,
        client_version: &str,
    ) -> Result<InitializeResult, McpError> {
        if self.initialized {
            return Err(McpError::already_initialized());
        }

        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo {
                name: client_name.to_string(),
                version: client_version.to_string(),
            },
            capabilities: json!({}),
        };

        let raw = self
            .send_request(methods::INITIALIZE, Some(to_raw(&params)?))
            .await?;
        let result: InitializeResult = serde_json::from_str(raw.get())
            .map_err(|e| McpError::initialization_failed(e.to_string()))?;

        self.channel
            .notify(&JsonRpcNotification::initialized())
            .await?;

        tracing::info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "Connected to MCP server"
        );
        self.server_info = Some(result.server_info.clone());
        self.capabilities = result.capabilities;
        self.initialized = true;

        Ok(result)
    }

    /// Lists the server's tools.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake; otherwise as [`McpClient::send_request`].
    pub async fn list_tools(&mut self) -> Result<Vec<Tool>, McpError> {
        self.list(methods::TOOLS_LIST, "tools").await
    }

    /// Calls a tool and returns the JSON carried by its first text item.
    ///
    /// Empty content, or a first item that is not text, yields `{}`.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before the handshake
    /// - `ToolExecutionFailed` if the tool flagged `isError`
    /// - `ParseError` if the text is not JSON
    /// - otherwise as [`McpClient::send_request`]
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value, McpError> {
        self.require_initialized()?;

        let params = to_raw(&json!({ "name": name, "arguments": arguments }))?;
        let raw = self.send_request(methods::TOOLS_CALL, Some(params)).await?;
        let result: ToolCallResult = decode(methods::TOOLS_CALL, &raw)?;

        if result.is_error {
            return Err(McpError::tool_execution_failed("Tool returned error"));
        }

        match result.content.first().and_then(|c| c.as_text()) {
            Some(text) => {
                serde_json::from_str(text).map_err(|e| McpError::parse_error(e.to_string()))
            }
            None => Ok(json!({})),
        }
    }

    /// Lists the server's resources.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake; otherwise as [`McpClient::send_request`].
    pub async fn list_resources(&mut self) -> Result<Vec<Resource>, McpError> {
        self.list(methods::RESOURCES_LIST, "resources").await
    }

    /// Reads a resource and returns the text of its first content item,
    /// or an empty string if there is none.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake; otherwise as [`McpClient::send_request`].
    pub async fn read_resource(&mut self, uri: &str) -> Result<String, McpError> {
        self.require_initialized()?;

        let params = to_raw(&json!({ "uri": uri }))?;
        let raw = self.send_request(methods::RESOURCES_READ, Some(params)).await?;
        let value: Value = decode(methods::RESOURCES_READ, &raw)?;

        Ok(value["contents"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    /// Lists the server's prompts.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake; otherwise as [`McpClient::send_request`].
    pub async fn list_prompts(&mut self) -> Result<Vec<Prompt>, McpError> {
        self.list(methods::PROMPTS_LIST, "prompts").await
    }

    /// Fetches a prompt; the server's result is returned verbatim.
    ///
    /// A `null` `arguments` is omitted from the request.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake; otherwise as [`McpClient::send_request`].
    pub async fn get_prompt(&mut self, name: &str, arguments: Value) -> Result<Value, McpError> {
        self.require_initialized()?;

        let params = if arguments.is_null() {
            json!({ "name": name })
        } else {
            json!({ "name": name, "arguments": arguments })
        };
        let raw = self
            .send_request(methods::PROMPTS_GET, Some(to_raw(&params)?))
            .await?;
        decode(methods::PROMPTS_GET, &raw)
    }

    /// Checks liveness.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake; otherwise as [`McpClient::send_request`].
    pub async fn ping(&mut self) -> Result<(), McpError> {
        self.require_initialized()?;
        self.send_request(methods::PING, None).await.map(|_| ())
    }

    /// Closes the channel and forgets the handshake.
    ///
    /// # Errors
    ///
    /// Returns the channel's close error; the client is reset regardless.
    pub async fn disconnect(&mut self) -> Result<(), McpError> {
        self.initialized = false;
        self.server_info = None;
        self.capabilities = ServerCapabilities::default();
        self.channel.close().await
    }

    async fn list<T: DeserializeOwned>(
        &mut self,
        method: &str,
        key: &str,
    ) -> Result<Vec<T>, McpError> {
        self.require_initialized()?;

        let raw = self.send_request(method, None).await?;
        let mut value: Value = decode(method, &raw)?;
        match value.get_mut(key).map(Value::take) {
            Some(items) => serde_json::from_value(items)
                .map_err(|e| McpError::invalid_message(format!("{method}: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn require_initialized(&self) -> Result<(), McpError> {
        if self.initialized {
            Ok(())
        } else {
            Err(McpError::not_initialized())
        }
    }
}

/// Parses one server message. JSON that is not an object is `InvalidMessage`
/// here, since the server is the one at fault.
fn parse_reply(text: &str) -> Result<Envelope<'_>, McpError> {
    Envelope::parse(text).map_err(|e| match e.kind() {
        McpErrorKind::InvalidRequest => {
            McpError::invalid_message(e.detail().unwrap_or_default().to_string())
        }
        _ => e,
    })
}

fn decode<T: DeserializeOwned>(method: &str, raw: &RawValue) -> Result<T, McpError> {
    serde_json::from_str(raw.get()).map_err(|e| McpError::invalid_message(format!("{method}: {e}")))
}
