//! Model Context Protocol (MCP) engine.
//!
//! This module implements both ends of MCP over JSON-RPC 2.0: a server that
//! exposes registered tools, resources and prompts, and a client that calls
//! them. Two bindings are provided, newline-delimited stdio and HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Server ─────────────────────────────┐
//! │                                                                 │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐         │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│  Registry   │         │
//! │   │ (stdio/HTTP)│    │  + Session  │    │  (handlers) │         │
//! │   └─────────────┘    └─────────────┘    └─────────────┘         │
//! │          ▲                                                      │
//! └──────────┼──────────────────────────────────────────────────────┘
//!            │ JSON-RPC messages
//! ┌──────────┼──────────── Client ──────────────────────────────────┐
//! │   ┌─────────────┐    ┌─────────────┐                            │
//! │   │   Channel   │◀───│  McpClient  │                            │
//! │   │ (stdio/HTTP)│    │ (ids, typed │                            │
//! │   └─────────────┘    │  operations)│                            │
//! │                      └─────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod client;
pub mod dispatcher;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use self::client::{Channel, HttpChannel, HttpClient, McpClient, StdioChannel, StdioClient};
pub use self::dispatcher::Dispatcher;
pub use self::http::McpHttpServer;
pub use self::protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION,
};
pub use self::registry::{PromptGetter, Registry, ResourceReader, ToolHandler};
pub use self::server::McpServer;
pub use self::session::{Session, SessionState};
pub use self::transport::{LineTransport, StdioTransport};
pub use self::types::{
    Content, Prompt, PromptArgument, Resource, ServerCapabilities, ServerInfo, Tool,
};
