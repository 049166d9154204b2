//! End-to-end tests for the HTTP binding.
//!
//! Each test binds a server on `127.0.0.1:0` and talks to it either through
//! the MCP client or with raw HTTP requests when status codes and headers
//! are under test.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, ALLOW, CONNECTION, CONTENT_TYPE, HOST, SERVER};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use mcp_engine::config::{ClientConfig, HttpConfig};
use mcp_engine::error::{McpError, McpErrorKind};
use mcp_engine::mcp::protocol::methods;
use mcp_engine::mcp::types::{Resource, Tool};
use mcp_engine::mcp::{HttpChannel, HttpClient, McpClient, McpHttpServer, Registry};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"raw","version":"1"}}}"#;

// =============================================================================
// Fixtures
// =============================================================================

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .add_tool_sync(
            Tool::new("add", "Add two numbers", json!({"type": "object"})),
            |arguments| {
                let a = arguments["a"].as_i64().unwrap_or_default();
                let b = arguments["b"].as_i64().unwrap_or_default();
                Ok(json!({ "result": a + b }))
            },
        )
        .add_resource_sync(
            Resource::new("file:///t.txt", "t.txt", "Fixed text", "text/plain"),
            |_| Ok("fixed text".to_string()),
        );
    registry
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), McpError>>,
}

impl Running {
    fn url(&self) -> String {
        format!("http://{}/mcp", self.addr)
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
    }
}

async fn start(config: HttpConfig) -> Running {
    let mut server = McpHttpServer::new(registry(), config);
    server.set_server_info("http-test", "0.1.0");

    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(listener, async move {
        let _ = stopped.await;
    }));

    Running { addr, stop, task }
}

fn local(keep_alive: bool) -> HttpConfig {
    HttpConfig {
        port: 0,
        keep_alive,
        ..HttpConfig::default()
    }
}

fn client_config() -> ClientConfig {
    ClientConfig {
        connect_timeout_ms: 2_000,
        request_timeout_ms: 5_000,
    }
}

async fn connect(url: &str) -> HttpClient {
    McpClient::new(HttpChannel::connect_with(url, &client_config()).await.unwrap())
}

/// Sends one request on a fresh connection and returns the whole reply.
async fn raw(
    addr: SocketAddr,
    method: Method,
    path: &str,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, HeaderMap, String) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(connection);

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(HOST, addr.to_string());
    if let Some(content_type) = content_type {
        request = request.header(CONTENT_TYPE, content_type);
    }
    let request = request
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();

    let response = sender.send_request(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, parts.headers, String::from_utf8(body.to_vec()).unwrap())
}

async fn post_json(addr: SocketAddr, body: &str) -> (StatusCode, HeaderMap, String) {
    raw(addr, Method::POST, "/mcp", Some("application/json"), body).await
}

// =============================================================================
// Client round trips
// =============================================================================

#[tokio::test]
async fn client_round_trip() {
    let server = start(local(true)).await;
    let mut client = connect(&server.url()).await;

    let result = client.initialize("test-client", "1.0.0").await.unwrap();
    assert_eq!(result.server_info.name, "http-test");
    assert!(client.server_capabilities().tools);
    assert!(client.server_capabilities().resources);
    assert!(!client.server_capabilities().prompts);

    client.ping().await.unwrap();

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "add");

    let sum = client.call_tool("add", json!({ "a": 10, "b": 20 })).await.unwrap();
    assert_eq!(sum, json!({ "result": 30 }));

    assert_eq!(client.read_resource("file:///t.txt").await.unwrap(), "fixed text");
    let err = client.read_resource("file:///missing").await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::ResourceNotFound);
    assert_eq!(err.detail(), Some("file:///missing"));

    assert!(client.list_prompts().await.unwrap().is_empty());
    assert!(client.channel().is_connected());

    client.disconnect().await.unwrap();
    assert!(!client.channel().is_connected());
    server.stop().await;
}

#[tokio::test]
async fn sessions_are_per_connection() {
    let server = start(local(true)).await;

    let mut first = connect(&server.url()).await;
    first.initialize("first", "1").await.unwrap();

    let mut second = connect(&server.url()).await;
    let err = second.send_request(methods::PING, None).await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::NotInitialized);

    // The first session is unaffected.
    first.ping().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn connections_are_served_concurrently() {
    let server = start(local(true)).await;

    let mut a = connect(&server.url()).await;
    let mut b = connect(&server.url()).await;
    a.initialize("a", "1").await.unwrap();
    b.initialize("b", "1").await.unwrap();

    let (x, y) = tokio::join!(
        a.call_tool("add", json!({ "a": 1, "b": 2 })),
        b.call_tool("add", json!({ "a": 3, "b": 4 })),
    );
    assert_eq!(x.unwrap(), json!({ "result": 3 }));
    assert_eq!(y.unwrap(), json!({ "result": 7 }));
    server.stop().await;
}

#[tokio::test]
async fn wrong_endpoint_is_http_error() {
    let server = start(local(true)).await;
    let url = format!("http://{}/other", server.addr);
    let mut client = connect(&url).await;

    let err = client.initialize("c", "1").await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::ConnectionFailed);
    assert_eq!(err.detail(), Some("HTTP error: 404"));
    server.stop().await;
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn connection_close_forces_new_session() {
    let server = start(local(false)).await;
    let mut client = connect(&server.url()).await;

    client.initialize("c", "1").await.unwrap();
    assert!(!client.channel().is_connected());

    // The client reconnects transparently, but the new connection carries a
    // fresh session on the server.
    let err = client.ping().await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::NotInitialized);
    server.stop().await;
}

#[tokio::test]
async fn reconnects_after_server_restart() {
    let server = start(local(true)).await;
    let addr = server.addr;
    let mut client = connect(&server.url()).await;
    client.initialize("c", "1").await.unwrap();

    server.stop().await;

    let err = client.ping().await.unwrap_err();
    assert!(err.is_connection(), "{err:?}");

    let restarted = start(HttpConfig {
        port: addr.port(),
        ..local(true)
    })
    .await;

    // A server-side error proves the request made it over a new connection.
    let err = client.ping().await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::NotInitialized);
    assert!(client.channel().is_connected());
    restarted.stop().await;
}

#[tokio::test]
async fn handshake_is_rerun_after_reconnect() {
    let server = start(local(true)).await;
    let addr = server.addr;
    let mut client = connect(&server.url()).await;
    client.initialize("c", "1").await.unwrap();

    server.stop().await;
    let restarted = start(HttpConfig {
        port: addr.port(),
        ..local(true)
    })
    .await;

    let err = client.ping().await.unwrap_err();
    assert!(err.is_connection() || err.kind() == McpErrorKind::NotInitialized, "{err:?}");
    let err = client.ping().await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::NotInitialized);

    // The client still believes it is initialised until it disconnects.
    let err = client.initialize("c", "1").await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::AlreadyInitialized);

    client.disconnect().await.unwrap();
    let result = client.initialize("c", "1").await.unwrap();
    assert_eq!(result.server_info.name, "http-test");
    client.ping().await.unwrap();
    assert_eq!(
        client.call_tool("add", json!({ "a": 2, "b": 3 })).await.unwrap(),
        json!({ "result": 5 })
    );
    restarted.stop().await;
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let config = ClientConfig {
        connect_timeout_ms: 1_000,
        request_timeout_ms: 100,
    };
    let channel = HttpChannel::connect_with(&format!("http://{addr}/mcp"), &config)
        .await
        .unwrap();
    let mut client = McpClient::new(channel);

    let err = client.initialize("c", "1").await.unwrap_err();
    assert_eq!(err.kind(), McpErrorKind::ConnectionTimeout);
    assert!(!client.channel().is_connected());
}

// =============================================================================
// Raw HTTP behaviour
// =============================================================================

#[tokio::test]
async fn json_rpc_errors_are_http_200() {
    let server = start(local(true)).await;

    let (status, headers, body) =
        post_json(server.addr, r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "application/json");
    assert_eq!(headers[SERVER], "http-test/0.1.0");

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(body["error"]["message"], "Not initialized");

    let (status, _, body) = post_json(server.addr, "{not json").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["id"], 0);
    assert_eq!(body["error"]["code"], -32700);

    server.stop().await;
}

#[tokio::test]
async fn handshake_over_raw_http() {
    let server = start(local(true)).await;

    let (status, _, body) = post_json(server.addr, INIT).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["capabilities"], json!({}));
    assert_eq!(body["result"]["capabilities"], json!({ "tools": {}, "resources": {} }));

    server.stop().await;
}

#[tokio::test]
async fn notification_is_accepted_without_body() {
    let server = start(local(true)).await;

    let (status, _, body) = post_json(
        server.addr,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn non_protocol_failures_use_http_statuses() {
    let server = start(HttpConfig {
        max_body_bytes: 64,
        ..local(true)
    })
    .await;

    let (status, _, _) = raw(server.addr, Method::POST, "/elsewhere", Some("application/json"), INIT).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, headers, _) = raw(server.addr, Method::GET, "/mcp", None, "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers[ALLOW], "POST");

    let (status, _, _) = raw(server.addr, Method::POST, "/mcp", Some("text/plain"), INIT).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _, _) = raw(server.addr, Method::POST, "/mcp", None, INIT).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _, _) = post_json(server.addr, INIT).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, _, _) = raw(
        server.addr,
        Method::POST,
        "/mcp",
        Some("application/json; charset=utf-8"),
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn keep_alive_disabled_sends_connection_close() {
    let server = start(local(false)).await;

    let (status, headers, _) = post_json(server.addr, INIT).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONNECTION], "close");

    server.stop().await;
}
