//! JSON-RPC 2.0 wire model.
//!
//! This module defines the four message shapes exchanged by both bindings
//! and a borrowed [`Envelope`] view used to classify incoming text before
//! committing to a shape.
//!
//! # Message Types
//!
//! - **Request**: a message carrying an integer `id`, answered by exactly one response
//! - **Notification**: a request without `id`, never answered
//! - **Response**: carries the request's `id` and exactly one of `result` / `error`
//! - **Error**: the `{code, message, data}` object inside an error response
//!
//! `params`, `result` and `error.data` are kept as [`RawValue`] sub-trees:
//! they are forwarded verbatim and only decoded by whoever needs their contents.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::error::McpError;

/// The MCP protocol version this implementation speaks.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// The JSON-RPC version tag emitted on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names of the MCP method table.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake-complete notification.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness check.
    pub const PING: &str = "ping";
    /// List registered tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool.
    pub const TOOLS_CALL: &str = "tools/call";
    /// List registered resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Read a resource.
    pub const RESOURCES_READ: &str = "resources/read";
    /// List registered prompts.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Fetch a prompt.
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Serialises a value into an owned raw sub-tree.
///
/// # Errors
///
/// Returns `InternalError` if the value cannot be serialised.
pub fn to_raw<T: Serialize + ?Sized>(value: &T) -> Result<Box<RawValue>, McpError> {
    serde_json::value::to_raw_value(value).map_err(|e| McpError::internal_error(e.to_string()))
}

/// Returns an owned raw `{}`.
#[must_use]
pub fn empty_object() -> Box<RawValue> {
    RawValue::from_string("{}".to_string()).unwrap_or_else(|_| unreachable!("{{}} is valid JSON"))
}

/// A JSON-RPC 2.0 request or notification.
///
/// A request without `id` is a notification.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always "2.0" when produced by this crate.
    pub jsonrpc: String,

    /// Request identifier; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters, kept as raw JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl JsonRpcRequest {
    /// Creates a request carrying an `id`.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Returns `true` if this request has no `id`.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Parses a request or notification from text.
    ///
    /// # Errors
    ///
    /// - `ParseError` if the text is not JSON
    /// - `InvalidRequest` if it is not an object, the version tag is wrong,
    ///   `method` is missing or not a string, or `id` is not an integer
    pub fn parse(text: &str) -> Result<Self, McpError> {
        Envelope::parse(text)?.into_request()
    }

    /// Serialises this request to a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if serialisation fails.
    pub fn to_json(&self) -> Result<String, McpError> {
        serde_json::to_string(self).map_err(|e| McpError::internal_error(e.to_string()))
    }
}

/// An outgoing JSON-RPC 2.0 notification.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<RawValue>>,
}

impl JsonRpcNotification {
    /// Creates a new notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    /// The `notifications/initialized` notification with empty params.
    #[must_use]
    pub fn initialized() -> Self {
        Self::new(methods::INITIALIZED, Some(empty_object()))
    }

    /// Serialises this notification to a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if serialisation fails.
    pub fn to_json(&self) -> Result<String, McpError> {
        serde_json::to_string(self).map_err(|e| McpError::internal_error(e.to_string()))
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

/// A JSON-RPC 2.0 response.
///
/// Exactly one of `result` / `error` is populated by the constructors.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0" when produced by this crate.
    pub jsonrpc: String,

    /// The request ID this response corresponds to.
    pub id: i64,

    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,

    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: i64, result: Box<RawValue>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response from a classified error.
    #[must_use]
    pub fn failure(id: i64, error: &McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.to_json_rpc_error()),
        }
    }

    /// Returns `true` if this is an error response.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Converts into the raw result, or the decoded error.
    ///
    /// A response with neither field yields `{}`.
    ///
    /// # Errors
    ///
    /// Returns the [`McpError`] decoded from the error envelope.
    pub fn into_result(self) -> Result<Box<RawValue>, McpError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(McpError::from_json_rpc_error(&error)),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(empty_object()),
        }
    }

    /// Parses a response from text.
    ///
    /// # Errors
    ///
    /// - `ParseError` if the text is not JSON
    /// - `InvalidMessage` if it is not an object or `id` is missing / not an integer
    pub fn parse(text: &str) -> Result<Self, McpError> {
        Envelope::parse(text)?.into_response()
    }

    /// Serialises this response to a single line of JSON.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if serialisation fails.
    pub fn to_json(&self) -> Result<String, McpError> {
        serde_json::to_string(self).map_err(|e| McpError::internal_error(e.to_string()))
    }
}

/// A read-only view over one parsed JSON-RPC object.
///
/// Every member is borrowed from the input text; nothing is decoded until a
/// caller asks for it.
#[derive(Debug, Deserialize)]
pub struct Envelope<'a> {
    #[serde(borrow, default)]
    jsonrpc: Option<&'a RawValue>,
    #[serde(borrow, default, deserialize_with = "present")]
    id: Option<&'a RawValue>,
    #[serde(borrow, default)]
    method: Option<&'a RawValue>,
    #[serde(borrow, default)]
    params: Option<&'a RawValue>,
    #[serde(borrow, default)]
    result: Option<&'a RawValue>,
    #[serde(borrow, default)]
    error: Option<&'a RawValue>,
}

/// Keeps an explicit `null` as `Some`, so only an absent member reads as `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<&'de RawValue>, D::Error>
where
    D: Deserializer<'de>,
{
    <&'de RawValue>::deserialize(deserializer).map(Some)
}

impl<'a> Envelope<'a> {
    /// Parses text into an envelope.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the text is not JSON and `InvalidRequest` if
    /// it is JSON but not an object.
    pub fn parse(text: &'a str) -> Result<Self, McpError> {
        let raw: &RawValue =
            serde_json::from_str(text).map_err(|e| McpError::parse_error(e.to_string()))?;

        if !raw.get().trim_start().starts_with('{') {
            return Err(McpError::invalid_request("message is not a JSON object"));
        }

        serde_json::from_str(raw.get()).map_err(|e| McpError::invalid_request(e.to_string()))
    }

    /// Returns `true` if the object has no `id` member.
    ///
    /// `"id": null` is not a notification; it fails [`Envelope::id`].
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Decodes the `id` member.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `id` is present but not an integer.
    pub fn id(&self) -> Result<Option<i64>, McpError> {
        self.id
            .map(|raw| {
                serde_json::from_str::<i64>(raw.get())
                    .map_err(|_| McpError::invalid_request(format!("id must be an integer, got {}", raw.get())))
            })
            .transpose()
    }

    /// Decodes the `method` member, if it is a string.
    #[must_use]
    pub fn method(&self) -> Option<String> {
        self.method
            .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
    }

    /// Raw `params`, if present.
    #[must_use]
    pub const fn params(&self) -> Option<&'a RawValue> {
        self.params
    }

    /// Converts into a request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a wrong version tag, a missing or
    /// non-string `method`, or a non-integer `id`.
    pub fn into_request(self) -> Result<JsonRpcRequest, McpError> {
        let version = self
            .jsonrpc
            .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok());
        if version.as_deref() != Some(JSONRPC_VERSION) {
            return Err(McpError::invalid_request("jsonrpc field must be \"2.0\""));
        }

        let id = self.id()?;
        let method = self
            .method()
            .ok_or_else(|| McpError::invalid_request("method must be a string"))?;

        Ok(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params: self.params.map(RawValue::to_owned),
        })
    }

    /// Converts into a response.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` if `id` is missing or not an integer, or if
    /// the `error` member is not a valid error object.
    pub fn into_response(self) -> Result<JsonRpcResponse, McpError> {
        let id = match self.id {
            Some(raw) => serde_json::from_str::<i64>(raw.get()).map_err(|_| {
                McpError::invalid_message(format!("response id must be an integer, got {}", raw.get()))
            })?,
            None => return Err(McpError::invalid_message("response has no id")),
        };

        let error = self
            .error
            .map(|raw| serde_json::from_str::<JsonRpcError>(raw.get()))
            .transpose()
            .map_err(|e| McpError::invalid_message(format!("malformed error object: {e}")))?;

        Ok(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: self.result.map(RawValue::to_owned),
            error,
        })
    }
}
