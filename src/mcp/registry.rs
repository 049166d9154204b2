//! Tool, resource and prompt registries.
//!
//! A [`Registry`] holds three independent name-keyed tables. Each entry pairs
//! a descriptor with a handler. Registration is the only mutator: it replaces
//! any prior entry under the same key and rebuilds that table's cached
//! listing, so `tools/list` and friends never re-walk the table while serving.
//!
//! Handlers are trait objects. Plain async closures implement the traits
//! through blanket impls, and the `*_sync` registration helpers wrap ordinary
//! closures that complete without suspending.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;

use super::protocol::to_raw;
use super::types::{Prompt, Resource, ServerCapabilities, Tool};
use crate::error::McpError;

/// Invokes a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with the caller's arguments.
    ///
    /// # Errors
    ///
    /// Any [`McpError`] is reported to the caller as a JSON-RPC error.
    async fn call(&self, arguments: Value) -> Result<Value, McpError>;
}

/// Reads the contents of a resource.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// Returns the text stored under `uri`.
    ///
    /// # Errors
    ///
    /// Any [`McpError`] is reported to the caller as a JSON-RPC error.
    async fn read(&self, uri: &str) -> Result<String, McpError>;
}

/// Renders a prompt.
#[async_trait]
pub trait PromptGetter: Send + Sync {
    /// Returns the prompt result, forwarded verbatim to the caller.
    ///
    /// # Errors
    ///
    /// Any [`McpError`] is reported to the caller as a JSON-RPC error.
    async fn get(&self, name: &str, arguments: Value) -> Result<Value, McpError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, McpError>> + Send,
{
    async fn call(&self, arguments: Value) -> Result<Value, McpError> {
        self(arguments).await
    }
}

#[async_trait]
impl<F, Fut> ResourceReader for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, McpError>> + Send,
{
    async fn read(&self, uri: &str) -> Result<String, McpError> {
        self(uri.to_string()).await
    }
}

#[async_trait]
impl<F, Fut> PromptGetter for F
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, McpError>> + Send,
{
    async fn get(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        self(name.to_string(), arguments).await
    }
}

/// One table: descriptors and handlers in registration order plus the
/// serialised listing.
struct Table<D, H: ?Sized> {
    key: &'static str,
    entries: IndexMap<String, (D, Arc<H>)>,
    listing: Option<Box<RawValue>>,
}

impl<D: Clone, H: ?Sized> Clone for Table<D, H> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            entries: self.entries.clone(),
            listing: self.listing.clone(),
        }
    }
}

impl<D: Serialize, H: ?Sized> Table<D, H> {
    fn new(key: &'static str) -> Self {
        Self {
            key,
            entries: IndexMap::new(),
            listing: None,
        }
    }

    fn insert(&mut self, name: String, descriptor: D, handler: Arc<H>) {
        self.entries.insert(name, (descriptor, handler));
        self.listing = match self.render() {
            Ok(listing) => Some(listing),
            Err(e) => {
                tracing::warn!(table = self.key, error = %e, "Failed to cache listing");
                None
            }
        };
    }

    fn render(&self) -> Result<Box<RawValue>, McpError> {
        let descriptors: Vec<&D> = self.entries.values().map(|(d, _)| d).collect();
        to_raw(&BTreeMap::from([(self.key, descriptors)]))
    }

    fn listing(&self) -> Result<Box<RawValue>, McpError> {
        match &self.listing {
            Some(cached) => Ok(cached.clone()),
            None => self.render(),
        }
    }

    fn get(&self, name: &str) -> Option<&(D, Arc<H>)> {
        self.entries.get(name)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three handler tables served by one server.
///
/// Build it before serving; once shared behind an `Arc` it is read-only.
#[derive(Clone)]
pub struct Registry {
    tools: Table<Tool, dyn ToolHandler>,
    resources: Table<Resource, dyn ResourceReader>,
    prompts: Table<Prompt, dyn PromptGetter>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tools", &self.tools.entries.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.entries.keys().collect::<Vec<_>>())
            .field("prompts", &self.prompts.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            tools: Table::new("tools"),
            resources: Table::new("resources"),
            prompts: Table::new("prompts"),
        };
        // Empty listings are cached too.
        registry.tools.listing = registry.tools.render().ok();
        registry.resources.listing = registry.resources.render().ok();
        registry.prompts.listing = registry.prompts.render().ok();
        registry
    }

    /// Registers (or replaces) a tool.
    pub fn add_tool(&mut self, tool: Tool, handler: impl ToolHandler + 'static) -> &mut Self {
        tracing::debug!(tool = %tool.name, "Registering tool");
        let name = tool.name.clone();
        self.tools.insert(name, tool, Arc::new(handler));
        self
    }

    /// Registers a tool whose handler completes without suspending.
    pub fn add_tool_sync<F>(&mut self, tool: Tool, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value, McpError> + Send + Sync + 'static,
    {
        self.add_tool(tool, move |arguments: Value| {
            std::future::ready(handler(arguments))
        })
    }

    /// Registers (or replaces) a resource.
    pub fn add_resource(
        &mut self,
        resource: Resource,
        reader: impl ResourceReader + 'static,
    ) -> &mut Self {
        tracing::debug!(uri = %resource.uri, "Registering resource");
        let uri = resource.uri.clone();
        self.resources.insert(uri, resource, Arc::new(reader));
        self
    }

    /// Registers a resource whose reader completes without suspending.
    pub fn add_resource_sync<F>(&mut self, resource: Resource, reader: F) -> &mut Self
    where
        F: Fn(&str) -> Result<String, McpError> + Send + Sync + 'static,
    {
        self.add_resource(resource, move |uri: String| {
            std::future::ready(reader(&uri))
        })
    }

    /// Registers (or replaces) a prompt.
    pub fn add_prompt(&mut self, prompt: Prompt, getter: impl PromptGetter + 'static) -> &mut Self {
        tracing::debug!(prompt = %prompt.name, "Registering prompt");
        let name = prompt.name.clone();
        self.prompts.insert(name, prompt, Arc::new(getter));
        self
    }

    /// Registers a prompt whose getter completes without suspending.
    pub fn add_prompt_sync<F>(&mut self, prompt: Prompt, getter: F) -> &mut Self
    where
        F: Fn(&str, Value) -> Result<Value, McpError> + Send + Sync + 'static,
    {
        self.add_prompt(prompt, move |name: String, arguments: Value| {
            std::future::ready(getter(&name, arguments))
        })
    }

    /// Looks up a tool handler.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|(_, h)| Arc::clone(h))
    }

    /// Looks up a resource reader.
    #[must_use]
    pub fn resource(&self, uri: &str) -> Option<Arc<dyn ResourceReader>> {
        self.resources.get(uri).map(|(_, h)| Arc::clone(h))
    }

    /// Looks up a prompt getter.
    #[must_use]
    pub fn prompt(&self, name: &str) -> Option<Arc<dyn PromptGetter>> {
        self.prompts.get(name).map(|(_, h)| Arc::clone(h))
    }

    /// The `tools/list` result: `{"tools": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the listing cannot be serialised.
    pub fn list_tools(&self) -> Result<Box<RawValue>, McpError> {
        self.tools.listing()
    }

    /// The `resources/list` result: `{"resources": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the listing cannot be serialised.
    pub fn list_resources(&self) -> Result<Box<RawValue>, McpError> {
        self.resources.listing()
    }

    /// The `prompts/list` result: `{"prompts": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the listing cannot be serialised.
    pub fn list_prompts(&self) -> Result<Box<RawValue>, McpError> {
        self.prompts.listing()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Number of registered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of registered prompts.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }

    /// Capability flags for the current contents.
    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: !self.tools.is_empty(),
            resources: !self.resources.is_empty(),
            prompts: !self.prompts.is_empty(),
            logging: false,
        }
    }
}
