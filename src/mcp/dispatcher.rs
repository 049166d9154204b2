//! Server-side method routing.
//!
//! The [`Dispatcher`] turns one inbound message into at most one response.
//! It is transport-agnostic: the stdio loop and the HTTP binding both hand
//! it raw text plus the [`Session`] of the connection the text arrived on.
//!
//! Every failure is classified before it leaves [`Dispatcher::handle`]:
//! parse and shape errors, session violations, missing registry entries,
//! handler errors, and handler panics all become JSON-RPC error responses.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::value::RawValue;
use serde_json::{json, Map, Value};

use super::protocol::{
    empty_object, methods, to_raw, Envelope, JsonRpcRequest, JsonRpcResponse,
    MCP_PROTOCOL_VERSION,
};
use super::registry::Registry;
use super::session::Session;
use super::types::{Content, InitializeParams, InitializeResult, ServerInfo, ToolCallResult};
use crate::error::McpError;

/// Methods this server answers.
const METHOD_TABLE: [&str; 9] = [
    methods::INITIALIZE,
    methods::INITIALIZED,
    methods::PING,
    methods::TOOLS_LIST,
    methods::TOOLS_CALL,
    methods::RESOURCES_LIST,
    methods::RESOURCES_READ,
    methods::PROMPTS_LIST,
    methods::PROMPTS_GET,
];

/// Routes requests to the registry on behalf of any number of sessions.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    server_name: String,
    server_version: String,
}

impl Dispatcher {
    /// Creates a dispatcher over a shared registry.
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }

    /// The registry being served.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Server name reported in `serverInfo`.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Server version reported in `serverInfo`.
    #[must_use]
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Handles one inbound message.
    ///
    /// Returns `None` for notifications, which are never answered. Text that
    /// cannot be parsed far enough to recover an `id` is answered under id 0.
    pub async fn handle(&self, session: &mut Session, text: &str) -> Option<JsonRpcResponse> {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(error = %err, "Rejecting unparseable message");
                return Some(JsonRpcResponse::failure(0, &err));
            }
        };

        let id = match envelope.id() {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, "Rejecting message with invalid id");
                return Some(JsonRpcResponse::failure(0, &err));
            }
        };

        let request = match envelope.into_request() {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(?id, error = %err, "Rejecting invalid request");
                return id.map(|id| JsonRpcResponse::failure(id, &err));
            }
        };

        let Some(id) = request.id else {
            Self::handle_notification(&request);
            return None;
        };

        tracing::debug!(id, method = %request.method, "Handling request");

        let outcome = AssertUnwindSafe(self.route(session, &request))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(result)) => JsonRpcResponse::success(id, result),
            Ok(Err(err)) => {
                tracing::debug!(id, method = %request.method, error = %err, "Request failed");
                JsonRpcResponse::failure(id, &err)
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(id, method = %request.method, panic = %message, "Handler panicked");
                JsonRpcResponse::failure(id, &McpError::internal_error(message))
            }
        };

        Some(response)
    }

    fn handle_notification(request: &JsonRpcRequest) {
        if request.method == methods::INITIALIZED {
            tracing::debug!("Client acknowledged initialisation");
        } else {
            tracing::debug!(method = %request.method, "Ignoring notification");
        }
    }

    async fn route(
        &self,
        session: &mut Session,
        request: &JsonRpcRequest,
    ) -> Result<Box<RawValue>, McpError> {
        let method = request.method.as_str();
        let params = request.params.as_deref();

        if !METHOD_TABLE.contains(&method) {
            return Err(McpError::method_not_found(method));
        }

        match method {
            methods::INITIALIZE => return self.initialize(session, params),
            methods::INITIALIZED => {
                return Err(McpError::invalid_request(
                    "notifications/initialized must be sent as a notification",
                ))
            }
            _ => session.require_ready()?,
        }

        match method {
            methods::PING => Ok(empty_object()),
            methods::TOOLS_LIST => self.registry.list_tools(),
            methods::TOOLS_CALL => self.call_tool(params).await,
            methods::RESOURCES_LIST => self.registry.list_resources(),
            methods::RESOURCES_READ => self.read_resource(params).await,
            methods::PROMPTS_LIST => self.registry.list_prompts(),
            methods::PROMPTS_GET => self.get_prompt(params).await,
            _ => Err(McpError::method_not_found(method)),
        }
    }

    fn initialize(
        &self,
        session: &mut Session,
        params: Option<&RawValue>,
    ) -> Result<Box<RawValue>, McpError> {
        session.begin_handshake()?;

        let handshake = params
            .ok_or_else(|| McpError::invalid_params("missing initialize params"))
            .and_then(|raw| {
                serde_json::from_str::<InitializeParams>(raw.get())
                    .map_err(|e| McpError::invalid_params(format!("initialize: {e}")))
            })
            .and_then(|params| {
                let capabilities = self.registry.capabilities();
                let result = InitializeResult {
                    protocol_version: MCP_PROTOCOL_VERSION.to_string(),
                    server_info: ServerInfo {
                        name: self.server_name.clone(),
                        version: self.server_version.clone(),
                        capabilities: json!({}),
                    },
                    capabilities,
                };
                to_raw(&result).map(|raw| (params, capabilities, raw))
            });

        let (params, capabilities, raw) = match handshake {
            Ok(parts) => parts,
            Err(err) => {
                session.abort_handshake();
                return Err(err);
            }
        };

        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %params.protocol_version,
            "Session initialised"
        );
        session.complete_handshake(capabilities, params.client_info, params.protocol_version)?;

        Ok(raw)
    }

    async fn call_tool(&self, params: Option<&RawValue>) -> Result<Box<RawValue>, McpError> {
        let mut params = params_object(params, methods::TOOLS_CALL)?;
        let name = required_string(&params, "name")?;
        let arguments = optional_arguments(&mut params)?;

        let handler = self
            .registry
            .tool(&name)
            .ok_or_else(|| McpError::tool_not_found(name.as_str()))?;

        tracing::debug!(tool = %name, "Calling tool");
        let value = handler.call(arguments).await.map_err(|err| {
            tracing::warn!(tool = %name, error = %err, "Tool failed");
            err
        })?;

        to_raw(&ToolCallResult::text(value.to_string()))
    }

    async fn read_resource(&self, params: Option<&RawValue>) -> Result<Box<RawValue>, McpError> {
        let params = params_object(params, methods::RESOURCES_READ)?;
        let uri = required_string(&params, "uri")?;

        let reader = self
            .registry
            .resource(&uri)
            .ok_or_else(|| McpError::resource_not_found(uri.as_str()))?;

        tracing::debug!(uri = %uri, "Reading resource");
        let text = reader.read(&uri).await?;

        to_raw(&json!({ "contents": [Content::text(text)] }))
    }

    async fn get_prompt(&self, params: Option<&RawValue>) -> Result<Box<RawValue>, McpError> {
        let mut params = params_object(params, methods::PROMPTS_GET)?;
        let name = required_string(&params, "name")?;
        let arguments = optional_arguments(&mut params)?;

        let getter = self
            .registry
            .prompt(&name)
            .ok_or_else(|| McpError::prompt_not_found(name.as_str()))?;

        tracing::debug!(prompt = %name, "Getting prompt");
        let value = getter.get(&name, arguments).await?;

        to_raw(&value)
    }
}

/// Decodes `params` as a JSON object.
fn params_object(params: Option<&RawValue>, method: &str) -> Result<Map<String, Value>, McpError> {
    let raw = params.ok_or_else(|| McpError::invalid_params(format!("{method}: missing params")))?;
    match serde_json::from_str::<Value>(raw.get()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(McpError::invalid_params(format!(
            "{method}: params must be an object, got {}",
            type_name(&other)
        ))),
        Err(e) => Err(McpError::invalid_params(format!("{method}: {e}"))),
    }
}

fn required_string(params: &Map<String, Value>, field: &str) -> Result<String, McpError> {
    match params.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(McpError::invalid_params(format!(
            "field '{field}' must be a string, got {}",
            type_name(other)
        ))),
        None => Err(McpError::invalid_params(format!("missing required field '{field}'"))),
    }
}

/// `arguments` defaults to `{}`; when present it must be an object.
fn optional_arguments(params: &mut Map<String, Value>) -> Result<Value, McpError> {
    match params.remove("arguments") {
        None | Some(Value::Null) => Ok(json!({})),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(other) => Err(McpError::invalid_params(format!(
            "field 'arguments' must be an object, got {}",
            type_name(&other)
        ))),
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::McpErrorKind;
    use crate::mcp::session::SessionState;
    use crate::mcp::types::{Prompt, PromptArgument, Resource, Tool};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.add_tool_sync(
            Tool::new("add", "Add two numbers", json!({"type": "object"})),
            |args| {
                let a = args["a"].as_i64().ok_or_else(|| McpError::invalid_params("a"))?;
                let b = args["b"].as_i64().ok_or_else(|| McpError::invalid_params("b"))?;
                Ok(json!({ "result": a + b }))
            },
        );
        registry.add_tool_sync(Tool::new("explode", "", json!({})), |_| {
            panic!("boom");
        });
        registry.add_resource_sync(
            Resource::new("file:///t.txt", "t", "test", "text/plain"),
            |_| Ok("fixed text".to_string()),
        );
        registry.add_prompt_sync(
            Prompt::new("greet", "", vec![PromptArgument::new("who", "", true)]),
            |name, args| Ok(json!({"messages": [{"name": name, "who": args["who"]}]})),
        );
        registry
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(registry()), "test-server", "1.2.3")
    }

    const INIT: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"t","version":"1"},"capabilities":{}}}"#;

    async fn send(d: &Dispatcher, session: &mut Session, text: &str) -> Value {
        let response = d.handle(session, text).await.expect("expected a response");
        serde_json::from_str(&response.to_json().unwrap()).unwrap()
    }

    async fn ready(d: &Dispatcher) -> Session {
        let mut session = Session::new();
        let value = send(d, &mut session, INIT).await;
        assert!(value.get("error").is_none(), "{value}");
        session
    }

    fn error_kind(value: &Value) -> McpErrorKind {
        let error: crate::mcp::protocol::JsonRpcError =
            serde_json::from_str(&value["error"].to_string()).unwrap();
        McpError::from_json_rpc_error(&error).kind()
    }

    #[tokio::test]
    async fn initialize_reports_identity_and_capabilities() {
        let d = dispatcher();
        let mut session = Session::new();
        let value = send(&d, &mut session, INIT).await;

        assert_eq!(value["id"], 1);
        assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(value["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(value["result"]["serverInfo"]["version"], "1.2.3");
        assert_eq!(value["result"]["serverInfo"]["capabilities"], json!({}));
        assert_eq!(
            value["result"]["capabilities"],
            json!({"tools": {}, "resources": {}, "prompts": {}})
        );
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(&d, &mut session, INIT).await;
        assert_eq!(value["error"]["code"], -32603);
        assert_eq!(value["error"]["message"], "Already initialized");
        assert_eq!(error_kind(&value), McpErrorKind::AlreadyInitialized);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn bad_initialize_params_allow_retry() {
        let d = dispatcher();
        let mut session = Session::new();
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":7}}"#,
        )
        .await;
        assert_eq!(value["error"]["code"], -32602);
        assert_eq!(session.state(), SessionState::Uninitialized);

        send(&d, &mut session, INIT).await;
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn methods_before_handshake_are_rejected() {
        let d = dispatcher();
        for method in ["ping", "tools/list", "resources/list", "prompts/list"] {
            let mut session = Session::new();
            let text = format!(r#"{{"jsonrpc":"2.0","id":5,"method":"{method}"}}"#);
            let value = send(&d, &mut session, &text).await;
            assert_eq!(value["id"], 5);
            assert_eq!(error_kind(&value), McpErrorKind::NotInitialized, "{method}");
        }
    }

    #[tokio::test]
    async fn tool_call_before_handshake_is_not_initialized() {
        let d = dispatcher();
        let mut session = Session::new();
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add","arguments":{"a":10,"b":20}}}"#,
        )
        .await;
        assert_eq!(value["error"]["message"], "Not initialized");
    }

    #[tokio::test]
    async fn ping_returns_empty_result() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).await;
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 3, "result": {}}));
    }

    #[tokio::test]
    async fn tool_call_wraps_result_as_text() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"add","arguments":{"a":10,"b":20}}}"#,
        )
        .await;

        let content = &value["result"]["content"];
        assert_eq!(content[0]["type"], "text");
        let inner: Value = serde_json::from_str(content[0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(inner, json!({"result": 30}));
        assert!(value["result"].get("isError").is_none());
    }

    #[tokio::test]
    async fn unknown_tool_carries_name() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"mul"}}"#,
        )
        .await;
        assert_eq!(value["error"]["message"], "Tool not found");
        assert_eq!(value["error"]["data"], "mul");
        assert_eq!(error_kind(&value), McpErrorKind::ToolNotFound);
    }

    #[tokio::test]
    async fn handler_error_maps_through_taxonomy() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"add","arguments":{"a":"x"}}}"#,
        )
        .await;
        assert_eq!(value["error"]["code"], -32602);
        assert_eq!(value["error"]["data"], "a");
    }

    #[tokio::test]
    async fn handler_panic_becomes_internal_error() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"explode"}}"#,
        )
        .await;
        assert_eq!(value["id"], 8);
        assert_eq!(value["error"]["code"], -32603);
        assert_eq!(value["error"]["data"], "boom");

        // The session survives the panic.
        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#).await;
        assert_eq!(value["result"], json!({}));
    }

    #[tokio::test]
    async fn malformed_params_are_field_specific() {
        let d = dispatcher();
        let mut session = ready(&d).await;

        let cases = [
            (r#"{"jsonrpc":"2.0","id":1,"method":"tools/call"}"#, "tools/call: missing params"),
            (r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":[]}"#, "tools/call: params must be an object, got array"),
            (r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{}}"#, "missing required field 'name'"),
            (r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":3}}"#, "field 'name' must be a string, got number"),
            (r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":"x"}}"#, "field 'arguments' must be an object, got string"),
            (r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":null}}"#, "field 'uri' must be a string, got null"),
        ];
        for (text, detail) in cases {
            let value = send(&d, &mut session, text).await;
            assert_eq!(value["error"]["code"], -32602, "{text}");
            assert_eq!(value["error"]["data"], detail, "{text}");
        }
    }

    #[tokio::test]
    async fn resource_read_and_missing_resource() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":10,"method":"resources/read","params":{"uri":"file:///t.txt"}}"#,
        )
        .await;
        assert_eq!(value["result"]["contents"][0]["text"], "fixed text");

        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":11,"method":"resources/read","params":{"uri":"file:///missing"}}"#,
        )
        .await;
        assert_eq!(error_kind(&value), McpErrorKind::ResourceNotFound);
        assert_eq!(value["error"]["data"], "file:///missing");
    }

    #[tokio::test]
    async fn prompt_result_is_verbatim() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":12,"method":"prompts/get","params":{"name":"greet","arguments":{"who":"bob"}}}"#,
        )
        .await;
        assert_eq!(value["result"], json!({"messages": [{"name": "greet", "who": "bob"}]}));

        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":13,"method":"prompts/get","params":{"name":"nope"}}"#,
        )
        .await;
        assert_eq!(error_kind(&value), McpErrorKind::PromptNotFound);
    }

    #[tokio::test]
    async fn listings_come_from_registry() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":14,"method":"tools/list"}"#).await;
        let names: Vec<&str> = value["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["add", "explode"]);
        assert_eq!(value["result"]["tools"][0]["inputSchema"], json!({"type": "object"}));
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let d = dispatcher();
        let mut session = Session::new();
        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":15,"method":"unknown/method"}"#).await;
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["error"]["data"], "unknown/method");
    }

    #[tokio::test]
    async fn notifications_are_never_answered() {
        let d = dispatcher();
        let mut session = Session::new();
        for text in [
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","method":"unknown/method","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"explode"}}"#,
        ] {
            assert!(d.handle(&mut session, text).await.is_none(), "{text}");
        }
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn initialized_with_id_is_invalid_request() {
        let d = dispatcher();
        let mut session = ready(&d).await;
        let value = send(
            &d,
            &mut session,
            r#"{"jsonrpc":"2.0","id":16,"method":"notifications/initialized"}"#,
        )
        .await;
        assert_eq!(value["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn unparseable_text_is_answered_under_id_zero() {
        let d = dispatcher();
        let mut session = Session::new();

        let value = send(&d, &mut session, "{not json").await;
        assert_eq!(value["id"], 0);
        assert_eq!(value["error"]["code"], -32700);

        let value = send(&d, &mut session, r#""just a string""#).await;
        assert_eq!(value["id"], 0);
        assert_eq!(value["error"]["code"], -32600);

        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).await;
        assert_eq!(value["id"], 0);
        assert_eq!(value["error"]["code"], -32600);

        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).await;
        assert_eq!(value["id"], 0);
        assert_eq!(value["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn invalid_request_keeps_its_id() {
        let d = dispatcher();
        let mut session = Session::new();
        let value = send(&d, &mut session, r#"{"jsonrpc":"2.0","id":17,"method":42}"#).await;
        assert_eq!(value["id"], 17);
        assert_eq!(value["error"]["code"], -32600);

        let value = send(&d, &mut session, r#"{"jsonrpc":"1.0","id":18,"method":"ping"}"#).await;
        assert_eq!(value["id"], 18);
        assert_eq!(value["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn capabilities_are_a_handshake_snapshot() {
        let mut empty = Registry::new();
        let d = Dispatcher::new(Arc::new(empty.clone()), "s", "1");
        let mut session = Session::new();
        let value = send(&d, &mut session, INIT).await;
        assert_eq!(value["result"]["capabilities"], json!({}));

        empty.add_tool_sync(Tool::new("late", "", json!({})), |_| Ok(json!(null)));
        assert!(!session.capabilities().tools);
    }
}
