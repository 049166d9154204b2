//! mcp-engine: MCP server over stdio or HTTP
//!
//! Serves a small built-in registry (two tools, one resource, one prompt) so
//! the binary can be exercised with any MCP client.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use serde_json::{json, Value};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_engine::config::{self, Config};
use mcp_engine::error::McpError;
use mcp_engine::mcp::types::{Prompt, PromptArgument, Resource, Tool};
use mcp_engine::mcp::{McpHttpServer, McpServer, Registry};

/// Which binding to serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over `POST` to a single HTTP endpoint.
    Http,
}

/// MCP server over stdio or HTTP.
///
/// Exposes the demo tools `add` and `concat`, the resource
/// `file:///test.txt`, and the prompt `write_essay`.
#[derive(Parser, Debug)]
#[command(name = "mcp-engine")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Binding to serve
    #[arg(short, long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// HTTP listen port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber. Logs go to stderr; stdout carries
/// protocol traffic.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn number<'a>(arguments: &'a Value, field: &str) -> Result<&'a Value, McpError> {
    match arguments.get(field) {
        Some(value) if value.is_number() => Ok(value),
        Some(other) => Err(McpError::invalid_params(format!(
            "field '{field}' must be a number, got {other}"
        ))),
        None => Err(McpError::invalid_params(format!(
            "missing required field '{field}'"
        ))),
    }
}

fn string<'a>(arguments: &'a Value, field: &str) -> Result<&'a str, McpError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::invalid_params(format!("missing string field '{field}'")))
}

/// Adds two numbers, staying in integers when both operands are integers.
fn add(arguments: &Value) -> Result<Value, McpError> {
    let (a, b) = (number(arguments, "a")?, number(arguments, "b")?);

    let sum = match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => a.checked_add(b).map(Value::from),
        _ => None,
    };
    let sum = sum.unwrap_or_else(|| {
        json!(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default())
    });

    Ok(json!({ "result": sum }))
}

fn concat(arguments: &Value) -> Result<Value, McpError> {
    let joined = format!("{}{}", string(arguments, "str1")?, string(arguments, "str2")?);
    Ok(json!({ "result": joined }))
}

fn essay_prompt(arguments: &Value) -> Result<Value, McpError> {
    let topic = string(arguments, "topic")?;
    Ok(json!({
        "description": "Essay prompt",
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": format!("Write an essay about: {topic}") }
        }]
    }))
}

/// The registry served by the binary.
fn demo_registry() -> Registry {
    let mut registry = Registry::new();

    registry
        .add_tool_sync(
            Tool::new(
                "add",
                "Add two numbers",
                json!({
                    "type": "object",
                    "properties": {
                        "a": { "type": "number", "description": "First number" },
                        "b": { "type": "number", "description": "Second number" }
                    },
                    "required": ["a", "b"]
                }),
            ),
            |arguments| add(&arguments),
        )
        .add_tool_sync(
            Tool::new(
                "concat",
                "Concatenate two strings",
                json!({
                    "type": "object",
                    "properties": {
                        "str1": { "type": "string", "description": "First string" },
                        "str2": { "type": "string", "description": "Second string" }
                    },
                    "required": ["str1", "str2"]
                }),
            ),
            |arguments| concat(&arguments),
        )
        .add_resource_sync(
            Resource::new("file:///test.txt", "test.txt", "Test file", "text/plain"),
            |_uri| Ok("This is a test file content.".to_string()),
        )
        .add_prompt_sync(
            Prompt::new(
                "write_essay",
                "Generate an essay prompt",
                vec![PromptArgument::new("topic", "The topic to write about", true)],
            ),
            |_name, arguments| essay_prompt(&arguments),
        );

    registry
}

async fn serve(args: &Args, cfg: Config) -> Result<(), McpError> {
    let registry = demo_registry();

    match args.transport {
        Transport::Stdio => {
            let mut server = McpServer::new(registry);
            server.set_server_info(&cfg.server.name, &cfg.server.version);

            info!("MCP server ready, waiting for client connection...");
            server.run().await
        }
        Transport::Http => {
            let mut http = cfg.http;
            if let Some(port) = args.port {
                http.port = port;
            }

            let mut server = McpHttpServer::new(registry, http);
            server.set_server_info(&cfg.server.name, &cfg.server.version);
            server.run().await
        }
    }
}

/// Entry point for the mcp-engine server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?args.transport,
        "Starting mcp-engine server"
    );

    // stdio serves one session; HTTP serves connections concurrently.
    let runtime = match args.transport {
        Transport::Stdio => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
        Transport::Http => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&args, cfg)) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
