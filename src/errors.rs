use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const SERVER_NOT_INITIALIZED: i32 = -32002;

/// Protocol-level failures. Each variant maps onto one JSON-RPC error code;
/// none of them ends the session.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Method '{method}' not found")]
    MethodNotFound { method: String },
    #[error("Unknown tool: {name}")]
    ToolNotFound { name: String },
    /// The tool set was still loading when the call gave up waiting.
    #[error("Unknown tool: {name}")]
    ToolsNotLoaded { name: String },
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },
    #[error("Server not initialized")]
    NotInitialized,
    #[error("Tool execution error: {message}")]
    ToolFailed { name: String, message: String },
    #[error("Tool '{name}' timed out after {}ms", deadline.as_millis())]
    ToolTimedOut { name: String, deadline: Duration },
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::MethodNotFound { .. }
            | Self::ToolNotFound { .. }
            | Self::ToolsNotLoaded { .. } => METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotInitialized => SERVER_NOT_INITIALIZED,
            Self::ToolFailed { .. } | Self::ToolTimedOut { .. } | Self::Internal { .. } => {
                INTERNAL_ERROR
            }
        }
    }

    /// Machine-readable kind carried in the error `data` member.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MethodNotFound { .. } => "method_not_found",
            Self::ToolNotFound { .. } | Self::ToolsNotLoaded { .. } => "tool_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::NotInitialized => "not_initialized",
            Self::ToolFailed { .. } => "tool_failed",
            Self::ToolTimedOut { .. } => "tool_timeout",
            Self::Internal { .. } => "internal_error",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::MethodNotFound { method } => json!({ "method": method }),
            Self::ToolNotFound { name } | Self::ToolFailed { name, .. } => json!({ "name": name }),
            Self::ToolsNotLoaded { name } => json!({ "name": name, "loading": true }),
            Self::ToolTimedOut { name, deadline } => json!({
                "name": name,
                "deadline_ms": u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }),
            Self::InvalidParams { .. } | Self::NotInitialized | Self::Internal { .. } => json!({}),
        }
    }
}
