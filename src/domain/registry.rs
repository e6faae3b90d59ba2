//! Tool registry and the backend calling convention
//!
//! A tool is a named operation with a declared input schema and a handler that accepts
//! keyword arguments and returns a text-convertible value or fails.

use std::{
    collections::HashMap, fmt, future::Future, marker::PhantomData, sync::Arc, sync::LazyLock,
};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub type Arguments = Map<String, Value>;
pub type ToolResult = Result<Value, ToolError>;

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]{1,64}$").expect("tool name pattern is valid")
});

/// Failure raised by a backend handler. The message is surfaced to the client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ToolError {
    message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is registered more than once")]
    DuplicateTool(String),
    #[error("tool name '{0}' must match [A-Za-z0-9_.-]{{1,64}}")]
    InvalidName(String),
}

#[async_trait]
pub trait AsyncTool: Send + Sync {
    async fn call(&self, arguments: Arguments) -> ToolResult;
}

/// Handler that blocks its calling thread. Always run on the blocking pool.
pub trait BlockingTool: Send + Sync {
    fn call(&self, arguments: Arguments) -> ToolResult;
}

impl<F> BlockingTool for F
where
    F: Fn(Arguments) -> ToolResult + Send + Sync,
{
    fn call(&self, arguments: Arguments) -> ToolResult {
        self(arguments)
    }
}

struct AsyncFn<F, Fut> {
    f: F,
    _output: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> AsyncTool for AsyncFn<F, Fut>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    async fn call(&self, arguments: Arguments) -> ToolResult {
        (self.f)(arguments).await
    }
}

#[derive(Clone)]
pub enum ToolHandler {
    Async(Arc<dyn AsyncTool>),
    Blocking(Arc<dyn BlockingTool>),
}

impl ToolHandler {
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        Self::Async(Arc::new(AsyncFn {
            f,
            _output: PhantomData,
        }))
    }

    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn(Arguments) -> ToolResult + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async(_) => f.write_str("ToolHandler::Async"),
            Self::Blocking(_) => f.write_str("ToolHandler::Blocking"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }

    pub fn info(&self) -> ToolInfo<'_> {
        ToolInfo {
            name: &self.name,
            description: &self.description,
            input_schema: &self.input_schema,
        }
    }
}

/// Listing view of a tool, serialized into `tools/list`.
#[derive(Debug, Serialize)]
pub struct ToolInfo<'a> {
    pub name: &'a str,
    pub description: &'a str,
    #[serde(rename = "inputSchema")]
    pub input_schema: &'a Value,
}

/// Object schema without properties, for tools that take no arguments.
pub fn empty_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// Completed name → tool mapping. Listing follows registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|position| &self.tools[*position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Exact-name registration table. Produces an immutable `ToolRegistry`.
#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, tool: ToolDescriptor) -> Result<Self, RegistryError> {
        if !TOOL_NAME.is_match(&tool.name) {
            return Err(RegistryError::InvalidName(tool.name));
        }
        if self.registry.contains(&tool.name) {
            return Err(RegistryError::DuplicateTool(tool.name));
        }

        let position = self.registry.tools.len();
        self.registry.index.insert(tool.name.clone(), position);
        self.registry.tools.push(tool);
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        self.registry
    }
}
