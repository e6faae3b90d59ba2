//! Tool invocation under a deadline
//!
//! Handlers run on their own task (async handlers) or on the blocking pool (blocking
//! handlers) so neither a slow tool nor a panicking one can stall or kill the read loop.
//! A handler that outlives its deadline is not cancelled; it keeps running detached.

use std::time::Duration;

use serde_json::Value;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::{
    domain::registry::{Arguments, ToolHandler, ToolRegistry, ToolResult},
    errors::AppError,
};

/// One in-flight invocation.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub tool_name: String,
    pub arguments: Arguments,
    pub deadline: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    deadline: Duration,
    timeout_is_error: bool,
}

impl Dispatcher {
    pub fn new(deadline: Duration, timeout_is_error: bool) -> Self {
        Self {
            deadline,
            timeout_is_error,
        }
    }

    pub fn pending(&self, tool_name: impl Into<String>, arguments: Arguments) -> PendingCall {
        PendingCall {
            tool_name: tool_name.into(),
            arguments,
            deadline: self.deadline,
        }
    }

    /// Looks the tool up and runs it. Returns the text to wrap as tool content.
    pub async fn execute(
        &self,
        registry: &ToolRegistry,
        call: PendingCall,
    ) -> Result<String, AppError> {
        let Some(tool) = registry.get(&call.tool_name) else {
            return Err(AppError::tool_not_found(call.tool_name));
        };

        let handler = tool.handler.clone();
        let PendingCall {
            tool_name,
            arguments,
            deadline,
        } = call;

        debug!(tool = %tool_name, deadline_ms = deadline.as_millis(), "invoking tool");
        let running = spawn_handler(handler, arguments);

        match tokio::time::timeout(deadline, running).await {
            Ok(Ok(Ok(value))) => Ok(render_text(value)),
            Ok(Ok(Err(err))) => Err(AppError::ToolFailed {
                name: tool_name,
                message: err.message().to_string(),
            }),
            Ok(Err(join_error)) => Err(AppError::ToolFailed {
                name: tool_name,
                message: describe_join_error(join_error),
            }),
            Err(_) => {
                warn!(
                    tool = %tool_name,
                    deadline_ms = deadline.as_millis(),
                    "tool exceeded its deadline, leaving it to finish in the background"
                );
                if self.timeout_is_error {
                    Err(AppError::ToolTimedOut {
                        name: tool_name,
                        deadline,
                    })
                } else {
                    Ok(format!(
                        "Tool '{tool_name}' is taking longer than expected to execute. \
                         This may be due to network latency or API response time. Please try again."
                    ))
                }
            }
        }
    }
}

fn spawn_handler(handler: ToolHandler, arguments: Arguments) -> JoinHandle<ToolResult> {
    match handler {
        ToolHandler::Async(tool) => tokio::spawn(async move { tool.call(arguments).await }),
        ToolHandler::Blocking(tool) => tokio::task::spawn_blocking(move || tool.call(arguments)),
    }
}

fn describe_join_error(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return "handler was cancelled".to_string();
    }

    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

/// Strings pass through, structured values are pretty-printed, scalars are stringified.
pub fn render_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Object(_) | Value::Array(_) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}
