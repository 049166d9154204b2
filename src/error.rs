//! Error types for mcp-engine.
//!
//! Two families live here:
//!
//! - [`McpError`]: the protocol-level taxonomy shared by the server dispatcher,
//!   both transport bindings, and the client correlator. Every failure that
//!   crosses a public API is classified into one [`McpErrorKind`].
//! - [`ConfigError`]: failures while loading the configuration file.

use std::fmt;
use std::path::PathBuf;

use serde_json::value::RawValue;
use thiserror::Error;

use crate::mcp::protocol::{error_codes, JsonRpcError};

/// The closed set of error kinds.
///
/// The kinds are grouped the same way on every surface: connection,
/// protocol, reserved JSON-RPC, domain (tool / resource / prompt), session,
/// transport I/O, and a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpErrorKind {
    /// Could not establish a connection.
    ConnectionFailed,
    /// The peer closed the connection.
    ConnectionClosed,
    /// A connect or request/response cycle exceeded its bound.
    ConnectionTimeout,
    /// Generic protocol violation.
    ProtocolError,
    /// A message that cannot be interpreted (empty line, bad response shape).
    InvalidMessage,
    /// Method name rejected by the protocol layer.
    InvalidMethod,
    /// Method parameters are missing or have the wrong shape.
    InvalidParams,
    /// Text is not valid JSON.
    ParseError,
    /// JSON is valid but not a valid JSON-RPC request.
    InvalidRequest,
    /// The method is not part of the method table.
    MethodNotFound,
    /// Unexpected failure inside the engine.
    InternalError,
    /// `tools/call` named a tool that is not registered.
    ToolNotFound,
    /// A tool handler failed.
    ToolExecutionFailed,
    /// `resources/read` named a URI that is not registered.
    ResourceNotFound,
    /// A resource reader refused access.
    ResourceAccessDenied,
    /// `prompts/get` named a prompt that is not registered.
    PromptNotFound,
    /// The handshake failed.
    InitializationFailed,
    /// A second handshake was attempted on the same session.
    AlreadyInitialized,
    /// A request other than `initialize` arrived before the handshake.
    NotInitialized,
    /// Reading from the transport failed.
    ReadError,
    /// Writing to the transport failed.
    WriteError,
    /// Anything else.
    Unknown,
}

impl McpErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 22] = [
        Self::ConnectionFailed,
        Self::ConnectionClosed,
        Self::ConnectionTimeout,
        Self::ProtocolError,
        Self::InvalidMessage,
        Self::InvalidMethod,
        Self::InvalidParams,
        Self::ParseError,
        Self::InvalidRequest,
        Self::MethodNotFound,
        Self::InternalError,
        Self::ToolNotFound,
        Self::ToolExecutionFailed,
        Self::ResourceNotFound,
        Self::ResourceAccessDenied,
        Self::PromptNotFound,
        Self::InitializationFailed,
        Self::AlreadyInitialized,
        Self::NotInitialized,
        Self::ReadError,
        Self::WriteError,
        Self::Unknown,
    ];

    /// Returns the JSON-RPC error code this kind is reported under.
    ///
    /// Only the reserved JSON-RPC kinds (and the protocol kinds that alias
    /// them) get distinct codes; everything else collapses onto
    /// `-32603 Internal error`.
    #[must_use]
    pub const fn json_rpc_code(self) -> i32 {
        match self {
            Self::ParseError => error_codes::PARSE_ERROR,
            Self::InvalidRequest => error_codes::INVALID_REQUEST,
            Self::MethodNotFound | Self::InvalidMethod => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams => error_codes::INVALID_PARAMS,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Returns the short human message used for this kind.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "Connection failed",
            Self::ConnectionClosed => "Connection closed",
            Self::ConnectionTimeout => "Connection timeout",
            Self::ProtocolError => "Protocol error",
            Self::InvalidMessage => "Invalid message",
            Self::InvalidMethod => "Invalid method",
            Self::InvalidParams => "Invalid parameters",
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InternalError => "Internal error",
            Self::ToolNotFound => "Tool not found",
            Self::ToolExecutionFailed => "Tool execution failed",
            Self::ResourceNotFound => "Resource not found",
            Self::ResourceAccessDenied => "Resource access denied",
            Self::PromptNotFound => "Prompt not found",
            Self::InitializationFailed => "Initialization failed",
            Self::AlreadyInitialized => "Already initialized",
            Self::NotInitialized => "Not initialized",
            Self::ReadError => "Read error",
            Self::WriteError => "Write error",
            Self::Unknown => "Unknown error",
        }
    }

    /// Returns `true` for the connection group (failed, closed, timeout).
    #[must_use]
    pub const fn is_connection(self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed | Self::ConnectionClosed | Self::ConnectionTimeout
        )
    }
}

impl fmt::Display for McpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_message())
    }
}

/// A classified protocol error.
///
/// Carries a kind, a short human message, and optional free-text details
/// such as the unresolved tool name or a parser diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", render_details(.details))]
pub struct McpError {
    kind: McpErrorKind,
    message: String,
    details: Option<String>,
}

fn render_details(details: &Option<String>) -> String {
    details
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl McpError {
    /// Creates an error with an explicit message.
    #[must_use]
    pub fn new(kind: McpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an error with the kind's default message and the given details.
    #[must_use]
    pub fn with_kind(kind: McpErrorKind, details: impl Into<String>) -> Self {
        Self::new(kind, kind.default_message()).details(details)
    }

    /// Attaches details. Empty details are dropped.
    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        let details = details.into();
        self.details = (!details.is_empty()).then_some(details);
        self
    }

    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> McpErrorKind {
        self.kind
    }

    /// The short human message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional details (offending name, parser diagnostic, HTTP status, ...).
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns `true` for connection failures, closures and timeouts.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        self.kind.is_connection()
    }

    /// The JSON-RPC code this error is reported under.
    #[must_use]
    pub const fn json_rpc_code(&self) -> i32 {
        self.kind.json_rpc_code()
    }

    /// Encodes this error as a JSON-RPC error object.
    ///
    /// Details travel as a JSON string in `data`.
    #[must_use]
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.json_rpc_code(),
            message: self.message.clone(),
            data: self
                .details
                .as_deref()
                .and_then(|d| serde_json::value::to_raw_value(d).ok()),
        }
    }

    /// Decodes a JSON-RPC error envelope received from a peer.
    ///
    /// A canonical message whose kind maps to the received code recovers
    /// that kind exactly; otherwise the code alone selects the kind.
    #[must_use]
    pub fn from_json_rpc_error(error: &JsonRpcError) -> Self {
        let kind = McpErrorKind::ALL
            .into_iter()
            .find(|k| k.default_message() == error.message && k.json_rpc_code() == error.code)
            .unwrap_or(match error.code {
                error_codes::PARSE_ERROR => McpErrorKind::ParseError,
                error_codes::INVALID_REQUEST => McpErrorKind::InvalidRequest,
                error_codes::METHOD_NOT_FOUND => McpErrorKind::MethodNotFound,
                error_codes::INVALID_PARAMS => McpErrorKind::InvalidParams,
                _ => McpErrorKind::InternalError,
            });

        let err = Self::new(kind, error.message.clone());
        match error.data.as_deref() {
            Some(data) => err.details(raw_to_details(data)),
            None => err,
        }
    }

    // Constructors named after each kind.

    /// Could not establish a connection.
    #[must_use]
    pub fn connection_failed(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ConnectionFailed, details)
    }

    /// The peer closed the connection.
    #[must_use]
    pub fn connection_closed(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ConnectionClosed, details)
    }

    /// A bounded wait expired.
    #[must_use]
    pub fn connection_timeout(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ConnectionTimeout, details)
    }

    /// Generic protocol violation.
    #[must_use]
    pub fn protocol_error(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ProtocolError, details)
    }

    /// Uninterpretable message.
    #[must_use]
    pub fn invalid_message(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::InvalidMessage, details)
    }

    /// Rejected method name.
    #[must_use]
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::InvalidMethod, method)
    }

    /// Missing or malformed parameters.
    #[must_use]
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::InvalidParams, details)
    }

    /// Text is not JSON.
    #[must_use]
    pub fn parse_error(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ParseError, details)
    }

    /// Not a valid JSON-RPC request.
    #[must_use]
    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::InvalidRequest, details)
    }

    /// Unknown method; the method name is the detail.
    #[must_use]
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::MethodNotFound, method)
    }

    /// Unexpected engine failure.
    #[must_use]
    pub fn internal_error(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::InternalError, details)
    }

    /// Unknown tool; the tool name is the detail.
    #[must_use]
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ToolNotFound, name)
    }

    /// Tool handler failure.
    #[must_use]
    pub fn tool_execution_failed(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ToolExecutionFailed, details)
    }

    /// Unknown resource; the URI is the detail.
    #[must_use]
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ResourceNotFound, uri)
    }

    /// Resource reader refused access.
    #[must_use]
    pub fn resource_access_denied(uri: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ResourceAccessDenied, uri)
    }

    /// Unknown prompt; the prompt name is the detail.
    #[must_use]
    pub fn prompt_not_found(name: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::PromptNotFound, name)
    }

    /// Handshake failure.
    #[must_use]
    pub fn initialization_failed(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::InitializationFailed, details)
    }

    /// Second handshake on the same session.
    #[must_use]
    pub fn already_initialized() -> Self {
        Self::new(
            McpErrorKind::AlreadyInitialized,
            McpErrorKind::AlreadyInitialized.default_message(),
        )
    }

    /// Request before the handshake.
    #[must_use]
    pub fn not_initialized() -> Self {
        Self::new(
            McpErrorKind::NotInitialized,
            McpErrorKind::NotInitialized.default_message(),
        )
    }

    /// Transport read failure.
    #[must_use]
    pub fn read_error(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::ReadError, details)
    }

    /// Transport write failure.
    #[must_use]
    pub fn write_error(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::WriteError, details)
    }

    /// Unclassified failure.
    #[must_use]
    pub fn unknown(details: impl Into<String>) -> Self {
        Self::with_kind(McpErrorKind::Unknown, details)
    }
}

/// String data is taken verbatim, anything else as its JSON text.
fn raw_to_details(data: &RawValue) -> String {
    serde_json::from_str::<String>(data.get()).unwrap_or_else(|_| data.get().to_string())
}

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}
