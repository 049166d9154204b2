//! MCP payload types.
//!
//! These are the `params` / `result` bodies carried inside the JSON-RPC
//! envelopes of [`super::protocol`]. Field names follow the MCP wire
//! format (camelCase).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item of tool output or resource content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image data.
    Image {
        /// Encoded image bytes.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A reference to a resource.
    Resource {
        /// URI of the referenced resource.
        uri: String,
    },
}

impl Content {
    /// Creates a text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text if this is a text item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A tool descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments.
    #[serde(default = "empty_object")]
    pub input_schema: Value,
}

impl Tool {
    /// Creates a tool descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A resource descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique resource URI.
    pub uri: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// MIME type of the content.
    #[serde(default)]
    pub mime_type: String,
}

impl Resource {
    /// Creates a resource descriptor.
    #[must_use]
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: description.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// One declared argument of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    /// Creates a prompt argument.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required,
        }
    }
}

/// A prompt descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique prompt name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Declared arguments, in order.
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

impl Prompt {
    /// Creates a prompt descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: Vec<PromptArgument>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments,
        }
    }
}

/// Client identity sent during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

/// Server identity returned from the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
    /// Opaque server-side capability blob (always `{}` from this server).
    #[serde(default = "empty_object")]
    pub capabilities: Value,
}

/// Capability flags advertised by the server.
///
/// On the wire a true flag is an empty object and a false flag is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// At least one tool is registered.
    #[serde(default, with = "presence", skip_serializing_if = "is_false")]
    pub tools: bool,
    /// At least one resource is registered.
    #[serde(default, with = "presence", skip_serializing_if = "is_false")]
    pub resources: bool,
    /// At least one prompt is registered.
    #[serde(default, with = "presence", skip_serializing_if = "is_false")]
    pub prompts: bool,
    /// Logging is supported.
    #[serde(default, with = "presence", skip_serializing_if = "is_false")]
    pub logging: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Present-as-object encoding for capability flags.
mod presence {
    use serde::de::IgnoredAny;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(_flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        IgnoredAny::deserialize(deserializer).map(|_| true)
    }
}

/// `initialize` request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: String,
    /// Client identity.
    pub client_info: ClientInfo,
    /// Client capabilities (opaque).
    #[serde(default = "empty_object")]
    pub capabilities: Value,
}

/// `initialize` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version spoken by the server.
    pub protocol_version: String,
    /// Server identity.
    pub server_info: ServerInfo,
    /// Capability snapshot taken at handshake time.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// `tools/call` request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallParams {
    /// Tool to invoke.
    pub name: String,
    /// Arguments passed verbatim to the handler.
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

/// `tools/call` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Output items.
    #[serde(default)]
    pub content: Vec<Content>,
    /// The tool reported its own failure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A successful result with a single text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_is_tagged_by_type() {
        let text = Content::text("hi");
        let value = serde_json::to_value(&text).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "hi"}));
        assert_eq!(serde_json::from_value::<Content>(value).unwrap(), text);

        let image = Content::Image {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let value = serde_json::to_value(&image).unwrap();
        assert_eq!(value, json!({"type": "image", "data": "aGk=", "mimeType": "image/png"}));
        assert_eq!(serde_json::from_value::<Content>(value).unwrap(), image);

        let resource = Content::Resource {
            uri: "file:///t.txt".to_string(),
        };
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value, json!({"type": "resource", "uri": "file:///t.txt"}));
        assert_eq!(serde_json::from_value::<Content>(value).unwrap(), resource);
        assert_eq!(resource.as_text(), None);
    }

    #[test]
    fn descriptors_round_trip() {
        let tool = Tool::new(
            "add",
            "Add two numbers",
            json!({"type": "object", "properties": {"a": {"type": "number"}}}),
        );
        let text = serde_json::to_string(&tool).unwrap();
        assert!(text.contains("inputSchema"));
        assert_eq!(serde_json::from_str::<Tool>(&text).unwrap(), tool);

        let resource = Resource::new("file:///t.txt", "t", "test file", "text/plain");
        let text = serde_json::to_string(&resource).unwrap();
        assert!(text.contains("mimeType"));
        assert_eq!(serde_json::from_str::<Resource>(&text).unwrap(), resource);

        let prompt = Prompt::new(
            "write_essay",
            "Write an essay",
            vec![PromptArgument::new("topic", "Essay topic", true)],
        );
        let text = serde_json::to_string(&prompt).unwrap();
        assert_eq!(serde_json::from_str::<Prompt>(&text).unwrap(), prompt);
    }

    #[test]
    fn capabilities_encode_as_presence() {
        let caps = ServerCapabilities {
            tools: true,
            resources: false,
            prompts: true,
            logging: false,
        };
        let value = serde_json::to_value(caps).unwrap();
        assert_eq!(value, json!({"tools": {}, "prompts": {}}));
        assert_eq!(serde_json::from_value::<ServerCapabilities>(value).unwrap(), caps);
    }

    #[test]
    fn capabilities_treat_any_value_as_present() {
        let caps: ServerCapabilities =
            serde_json::from_value(json!({"resources": {"subscribe": true}, "logging": null}))
                .unwrap();
        assert!(!caps.tools);
        assert!(caps.resources);
        assert!(caps.logging);
    }

    #[test]
    fn tool_call_result_omits_false_is_error() {
        let value = serde_json::to_value(ToolCallResult::text("{}")).unwrap();
        assert_eq!(value, json!({"content": [{"type": "text", "text": "{}"}]}));

        let failed: ToolCallResult =
            serde_json::from_value(json!({"content": [], "isError": true})).unwrap();
        assert!(failed.is_error);
    }

    #[test]
    fn initialize_params_default_capabilities() {
        let params: InitializeParams = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "c", "version": "1"}
        }))
        .unwrap();
        assert_eq!(params.client_info.name, "c");
        assert_eq!(params.capabilities, json!({}));
    }
}
