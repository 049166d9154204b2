//! HTTP MCP server.
//!
//! A single endpoint accepts `POST <path>` with a JSON-RPC envelope as the
//! body and returns the JSON-RPC response as the body. Every JSON-RPC
//! outcome, including JSON-RPC errors, is HTTP 200; notifications are
//! acknowledged with 202 and an empty body. Non-protocol failures use plain
//! HTTP statuses:
//!
//! | Condition                         | Status |
//! |-----------------------------------|--------|
//! | path other than the endpoint      | 404    |
//! | method other than `POST`          | 405    |
//! | `Content-Type` not JSON           | 415    |
//! | body larger than `max_body_bytes` | 413    |
//!
//! Each accepted TCP connection owns one [`Session`]; keep-alive requests on
//! that connection are handled strictly in order, while distinct
//! connections run concurrently against the shared [`Registry`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, SERVER};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

use crate::config::HttpConfig;
use crate::error::McpError;
use crate::mcp::dispatcher::Dispatcher;
use crate::mcp::protocol::JsonRpcResponse;
use crate::mcp::registry::Registry;
use crate::mcp::server::{SERVER_NAME, SERVER_VERSION};
use crate::mcp::session::Session;

/// An MCP server bound to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct McpHttpServer {
    registry: Arc<Registry>,
    name: String,
    version: String,
    config: HttpConfig,
}

/// Per-server state shared by every connection task.
struct Shared {
    dispatcher: Dispatcher,
    path: String,
    keep_alive: bool,
    max_body_bytes: usize,
    server_header: Option<HeaderValue>,
}

impl McpHttpServer {
    /// Creates a server over the given registry.
    ///
    /// Registration must be complete before [`McpHttpServer::serve`] is
    /// called; the registry is read-only while serving.
    #[must_use]
    pub fn new(registry: Registry, config: HttpConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
            config,
        }
    }

    /// Sets the identity reported in `serverInfo` and the `Server` header.
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

    /// The HTTP settings in use.
    #[must_use]
    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Binds the configured address.
    ///
    /// Use port 0 and [`TcpListener::local_addr`] to pick a free port.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, McpError> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| McpError::connection_failed(format!("bind {address}: {e}")))?;
        Ok(listener)
    }

    /// Binds and serves until SIGINT/SIGTERM (Ctrl+C on Windows).
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` if the address cannot be bound.
    pub async fn run(self) -> Result<(), McpError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Accepts connections on `listener` until `shutdown` completes, then
    /// gracefully closes every open connection and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept failures are logged and the
    /// loop continues.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), McpError>
    where
        F: Future<Output = ()> + Send,
    {
        let shared = Arc::new(Shared {
            server_header: HeaderValue::from_str(&format!("{}/{}", self.name, self.version)).ok(),
            dispatcher: Dispatcher::new(self.registry, self.name, self.version),
            path: self.config.path,
            keep_alive: self.config.keep_alive,
            max_body_bytes: self.config.max_body_bytes,
        });

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, path = %shared.path, "HTTP server listening");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "Accepted connection");
                            connections.spawn(serve_connection(
                                Arc::clone(&shared),
                                stream,
                                peer,
                                shutdown_rx.clone(),
                            ));
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                    }
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                () = &mut shutdown => {
                    tracing::info!("Shutting down HTTP server");
                    break;
                }
            }
        }

        drop(listener);
        if shutdown_tx.send(true).is_err() {
            tracing::debug!("No open connections to notify of shutdown");
        }
        while connections.join_next().await.is_some() {}

        Ok(())
    }
}

/// Serves one TCP connection with its own session.
async fn serve_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let session = Arc::new(Mutex::new(Session::new()));
    let keep_alive = shared.keep_alive;

    let service = {
        let session = Arc::clone(&session);
        service_fn(move |request: Request<Incoming>| {
            let shared = Arc::clone(&shared);
            let session = Arc::clone(&session);
            async move { Ok::<_, Infallible>(handle_request(&shared, &session, request).await) }
        })
    };

    let connection = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.changed() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(%peer, error = %e, "Connection ended with error");
    }

    session.lock().await.close();
    tracing::debug!(%peer, "Connection closed");
}

/// Handles one HTTP request on a connection.
async fn handle_request(
    shared: &Shared,
    session: &Mutex<Session>,
    request: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if request.uri().path() != shared.path {
        return plain(shared, StatusCode::NOT_FOUND, "Not Found");
    }

    if request.method() != Method::POST {
        let mut response = plain(shared, StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("POST"));
        return response;
    }

    if !is_json(&request) {
        return plain(
            shared,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json",
        );
    }

    let declared_length = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_length.is_some_and(|len| len > shared.max_body_bytes) {
        return plain(shared, StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
    }

    let body = match Limited::new(request.into_body(), shared.max_body_bytes)
        .collect()
        .await
    {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return plain(shared, StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request body");
            return plain(shared, StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    let response = match std::str::from_utf8(&body) {
        Ok(text) => {
            let mut session = session.lock().await;
            shared.dispatcher.handle(&mut session, text).await
        }
        Err(e) => Some(JsonRpcResponse::failure(
            0,
            &McpError::parse_error(format!("body is not UTF-8: {e}")),
        )),
    };

    let Some(response) = response else {
        return build(shared, StatusCode::ACCEPTED, None, Bytes::new());
    };

    match response.to_json() {
        Ok(json) => build(
            shared,
            StatusCode::OK,
            Some(HeaderValue::from_static("application/json")),
            Bytes::from(json),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialise response");
            plain(shared, StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn is_json(request: &Request<Incoming>) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn plain(shared: &Shared, status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    build(
        shared,
        status,
        Some(HeaderValue::from_static("text/plain; charset=utf-8")),
        Bytes::from_static(body.as_bytes()),
    )
}

fn build(
    shared: &Shared,
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, content_type);
    }
    if let Some(server) = &shared.server_header {
        headers.insert(SERVER, server.clone());
    }
    if !shared.keep_alive {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }

    response
}

/// Completes on SIGINT or SIGTERM (Ctrl+C on Windows).
///
/// If the handlers cannot be installed the future never completes.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}
