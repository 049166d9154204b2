//! mcp-engine: a Model Context Protocol engine over JSON-RPC 2.0
//!
//! This library lets an application expose tools, resources and prompts to
//! MCP clients, and call them on MCP servers.
//!
//! # Architecture
//!
//! - **Registry**: named tools, resources and prompts with async handlers
//! - **Server**: a dispatcher plus one session state machine per connection,
//!   served over stdio or HTTP
//! - **Client**: request correlation and typed operations over a stdio or
//!   HTTP channel
//!
//! # Example
//!
//! ```no_run
//! use mcp_engine::mcp::{McpServer, Registry, Tool};
//! use serde_json::{json, Value};
//!
//! # async fn run() -> Result<(), mcp_engine::error::McpError> {
//! let mut registry = Registry::new();
//! registry.add_tool(
//!     Tool::new("echo", "Returns its arguments", json!({"type": "object"})),
//!     |arguments: Value| async move { Ok::<_, mcp_engine::McpError>(arguments) },
//! );
//!
//! McpServer::new(registry).run().await
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`mcp`] — MCP protocol implementation

pub mod config;
pub mod error;
pub mod mcp;

pub use error::{McpError, McpErrorKind};
