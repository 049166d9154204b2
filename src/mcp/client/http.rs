//! Client channel over HTTP.
//!
//! Every call is one `POST` to the server's endpoint. The TCP connection is
//! kept open between calls; if the server closes it (`Connection: close`,
//! idle timeout, restart) the next call reconnects without the caller
//! noticing. A failure in the middle of a call is reported, not retried.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, CONNECTION, CONTENT_TYPE, HOST};
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::{parse_reply, Channel};
use crate::config::ClientConfig;
use crate::error::McpError;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// An open HTTP/1.1 connection and the task driving it.
struct Connection {
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// A request/response channel to an MCP HTTP endpoint.
pub struct HttpChannel {
    /// `host:port` to dial.
    address: String,
    /// Value of the `Host` header.
    authority: String,
    /// Endpoint path and query.
    path: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    connection: Option<Connection>,
}

impl std::fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChannel")
            .field("address", &self.address)
            .field("path", &self.path)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl HttpChannel {
    /// Connects to `url` (for example `http://127.0.0.1:8080/mcp`) with
    /// default timeouts.
    ///
    /// # Errors
    ///
    /// See [`HttpChannel::connect_with`].
    pub async fn connect(url: &str) -> Result<Self, McpError> {
        Self::connect_with(url, &ClientConfig::default()).await
    }

    /// Connects to `url` with the given timeouts.
    ///
    /// # Errors
    ///
    /// - `ConnectionFailed` for a malformed or non-`http` URL, or a refused
    ///   connection
    /// - `ConnectionTimeout` if the connection is not established in time
    pub async fn connect_with(url: &str, config: &ClientConfig) -> Result<Self, McpError> {
        let uri: Uri = url
            .parse()
            .map_err(|e| McpError::connection_failed(format!("invalid URL '{url}': {e}")))?;

        if uri.scheme_str() != Some("http") {
            return Err(McpError::connection_failed(format!(
                "unsupported URL '{url}': only http:// is supported"
            )));
        }

        let host = uri
            .host()
            .ok_or_else(|| McpError::connection_failed(format!("URL '{url}' has no host")))?;
        let port = uri.port_u16().unwrap_or(80);

        let mut channel = Self {
            address: format!("{host}:{port}"),
            authority: uri
                .authority()
                .map_or_else(|| host.to_string(), ToString::to_string),
            path: uri
                .path_and_query()
                .map_or("/", http::uri::PathAndQuery::as_str)
                .to_string(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            connection: None,
        };

        channel.connection = Some(channel.open().await?);
        Ok(channel)
    }

    /// Returns `true` while a connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| !c.sender.is_closed())
    }

    async fn open(&self) -> Result<Connection, McpError> {
        let stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(McpError::connection_failed(format!(
                        "{}: {e}",
                        self.address
                    )))
                }
                Err(_) => {
                    return Err(McpError::connection_timeout(format!(
                        "connecting to {} took longer than {:?}",
                        self.address, self.connect_timeout
                    )))
                }
            };

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| McpError::connection_failed(e.to_string()))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "HTTP connection ended");
            }
        });

        tracing::debug!(address = %self.address, "Connected");
        Ok(Connection { sender, driver })
    }

    /// POSTs one JSON body and returns the status and body of the reply.
    async fn post(&mut self, body: String) -> Result<(StatusCode, Bytes), McpError> {
        let mut connection = match self.connection.take() {
            Some(connection) if !connection.sender.is_closed() => connection,
            Some(_) => {
                tracing::debug!(address = %self.address, "Connection closed by server, reconnecting");
                self.open().await?
            }
            None => self.open().await?,
        };

        let request = Request::post(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| McpError::internal_error(e.to_string()))?;

        let exchange = async {
            connection.sender.ready().await?;
            let response = connection.sender.send_request(request).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, hyper::Error>((parts, body))
        };

        // On any failure the connection is dropped here and the next call
        // dials again.
        let (parts, body) = match tokio::time::timeout(self.request_timeout, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(transport_failure(&e)),
            Err(_) => {
                return Err(McpError::connection_timeout(format!(
                    "no reply from {} within {:?}",
                    self.address, self.request_timeout
                )))
            }
        };

        if closes(&parts.headers) {
            tracing::debug!(address = %self.address, "Server asked to close the connection");
        } else {
            self.connection = Some(connection);
        }

        Ok((parts.status, body))
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn request(&mut self, request: &JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let (status, body) = self.post(request.to_json()?).await?;
        if status != StatusCode::OK {
            return Err(http_error(status));
        }

        let text = std::str::from_utf8(&body)
            .map_err(|e| McpError::invalid_message(format!("response is not UTF-8: {e}")))?;
        let response = parse_reply(text)?.into_response()?;

        if Some(response.id) != request.id {
            tracing::warn!(
                expected = ?request.id,
                received = response.id,
                "Response id does not match request"
            );
        }
        Ok(response)
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), McpError> {
        let (status, _) = self.post(notification.to_json()?).await?;
        match status {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            other => Err(http_error(other)),
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.connection.take().is_some() {
            tracing::debug!(address = %self.address, "Disconnected");
        }
        Ok(())
    }
}

fn http_error(status: StatusCode) -> McpError {
    McpError::connection_failed(format!("HTTP error: {}", status.as_u16()))
}

fn transport_failure(e: &hyper::Error) -> McpError {
    if e.is_closed() || e.is_incomplete_message() || e.is_canceled() {
        McpError::connection_closed(e.to_string())
    } else {
        McpError::connection_failed(e.to_string())
    }
}

fn closes(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("close"))
}
