//! The central Model Context Protocol engine
//!
//! Decodes one JSON-RPC message per input line, tracks the handshake, answers cheap
//! methods inline and hands `tools/list` / `tools/call` to spawned tasks so a slow tool
//! never holds up the read loop.

use std::time::Instant;

use rust_mcp_sdk::schema::{
    CallToolRequestParams, CallToolResult, ContentBlock, Implementation, InitializeResult,
    ServerCapabilities, ServerCapabilitiesTools, TextContent,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::watch,
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    domain::registry::ToolDescriptor,
    errors::AppError,
    logging,
    mcp::{
        rpc::{app_error_to_json_rpc, json_rpc_result},
        session::Session,
        transport::{LineReader, ReadOutcome, ResponseWriter, TransportError},
    },
    AppState,
};

/// Incoming JSON-RPC message. `jsonrpc` is tolerated when absent; a missing or `null`
/// id marks a notification.
#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    ToolsList,
    ToolsCall,
}

/// A request that may have to wait on the loader or a tool.
#[derive(Debug)]
pub struct PendingRequest {
    pub kind: PendingKind,
    pub id: Value,
    pub params: Option<Value>,
    /// Session state when the request was read, so the answer does not depend on
    /// notifications that arrive while it waits.
    pub initialized: bool,
    pub received_at: Instant,
}

#[derive(Debug)]
pub enum Routed {
    Respond(Value),
    Deferred(PendingRequest),
}

pub struct McpServer {
    state: AppState,
    session: Session,
}

impl McpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub(crate) async fn handle_line(&mut self, line: &str) -> Option<Value> {
        match self.route_line(line)? {
            Routed::Respond(response) => Some(response),
            Routed::Deferred(pending) => Some(complete(self.state.clone(), pending).await),
        }
    }

    /// Serves the session until the input closes or `shutdown` turns `true`. On EOF,
    /// requests already being processed are answered before returning, unless
    /// `shutdown` turns `true` while they are pending.
    pub async fn run<R, W>(
        mut self,
        reader: R,
        writer: W,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut lines = LineReader::new(reader);
        let writer = ResponseWriter::new(writer);
        let mut in_flight: JoinSet<Result<(), TransportError>> = JoinSet::new();
        let read_poll = self.state.config.read_poll;

        info!(
            server = %self.state.config.server_name,
            strict_init = self.state.config.policy.enforce_init_before_list,
            call_deadline_ms = self.state.config.policy.call_deadline.as_millis(),
            "mcp server reading from stdio"
        );

        loop {
            if *shutdown.borrow() {
                info!(pending = in_flight.len(), "shutdown requested, leaving read loop");
                return Ok(());
            }

            while let Some(joined) = in_flight.try_join_next() {
                settle(joined)?;
            }

            let line = match lines.next(read_poll).await? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Idle => continue,
                ReadOutcome::Closed => break,
            };

            match self.route_line(&line) {
                None => {}
                Some(Routed::Respond(response)) => writer.send(&response).await?,
                Some(Routed::Deferred(pending)) => {
                    let state = self.state.clone();
                    let writer = writer.clone();
                    in_flight.spawn(async move {
                        let response = complete(state, pending).await;
                        writer.send(&response).await
                    });
                }
            }
        }

        info!(pending = in_flight.len(), "input closed");
        let stop_requested = async {
            let stopped = shutdown.wait_for(|stop| *stop).await.is_ok();
            if !stopped {
                // sender gone, no shutdown can arrive anymore
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(stop_requested);

        loop {
            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(joined) => settle(joined)?,
                    None => return Ok(()),
                },
                () = &mut stop_requested => {
                    info!("shutdown requested, abandoning pending requests");
                    return Ok(());
                }
            }
        }
    }

    fn route_line(&mut self, line: &str) -> Option<Routed> {
        match serde_json::from_str::<Message>(line) {
            Ok(message) => self.route(message),
            Err(err) => {
                warn!(error = %err, "discarding message that is not a JSON-RPC request");
                None
            }
        }
    }

    /// Applies session rules to a message. `None` means nothing is written back.
    pub fn route(&mut self, message: Message) -> Option<Routed> {
        let received_at = Instant::now();
        let Message {
            jsonrpc,
            id,
            method,
            params,
        } = message;

        if jsonrpc.as_deref() != Some("2.0") {
            debug!(
                method = %method,
                jsonrpc = ?jsonrpc,
                "accepting message without jsonrpc 2.0 marker"
            );
        }

        let policy = &self.state.config.policy;
        if policy.is_init_notification(&method) {
            if self.session.mark_initialized() {
                info!(notification = %method, "client initialization complete");
            }
            return None;
        }

        let Some(id) = id else {
            debug!(method = %method, "ignoring notification");
            return None;
        };

        let response = match method.as_str() {
            "initialize" => self.initialize(id, params.as_ref()),
            "ping" => json_rpc_result(Some(id), json!({})),
            "tools/list" | "tools/call" => {
                let kind = if method == "tools/list" {
                    PendingKind::ToolsList
                } else {
                    PendingKind::ToolsCall
                };
                let initialized = self.session.is_initialized();

                // tools/call is gated after the lookup, unknown names win over -32002
                if kind == PendingKind::ToolsList && policy.enforce_init_before_list && !initialized
                {
                    app_error_to_json_rpc(Some(id), AppError::NotInitialized)
                } else {
                    return Some(Routed::Deferred(PendingRequest {
                        kind,
                        id,
                        params,
                        initialized,
                        received_at,
                    }));
                }
            }
            _ => app_error_to_json_rpc(Some(id), AppError::method_not_found(method.as_str())),
        };

        audit(&method, params.as_ref(), received_at, &response);
        Some(Routed::Respond(response))
    }

    fn initialize(&self, id: Value, params: Option<&Value>) -> Value {
        let config = &self.state.config;
        let protocol_version = params
            .and_then(|params| params.get("protocolVersion"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .unwrap_or(&config.protocol_version)
            .to_string();

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: config.server_name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            protocol_version,
            instructions: None,
            meta: None,
        };

        match serde_json::to_value(initialize_result) {
            Ok(result) => json_rpc_result(Some(id), result),
            Err(err) => app_error_to_json_rpc(
                Some(id),
                AppError::internal(format!("initialize result serialization: {err}")),
            ),
        }
    }
}

/// Produces the response for a deferred request.
pub async fn complete(state: AppState, pending: PendingRequest) -> Value {
    let (method, response) = match pending.kind {
        PendingKind::ToolsList => ("tools/list", list_tools(&state, pending.id.clone()).await),
        PendingKind::ToolsCall => ("tools/call", call_tool(&state, &pending).await),
    };

    audit(method, pending.params.as_ref(), pending.received_at, &response);
    response
}

async fn list_tools(state: &AppState, id: Value) -> Value {
    let registry = match state.registry.wait_ready(state.config.list_wait).await {
        Some(registry) => Some(registry),
        None => {
            warn!(
                budget_ms = state.config.list_wait.as_millis(),
                "tools not loaded within the list budget, answering with what is available"
            );
            state.registry.current()
        }
    };

    let tools = registry
        .as_deref()
        .map(|registry| registry.iter().map(ToolDescriptor::info).collect::<Vec<_>>())
        .unwrap_or_default();
    json_rpc_result(Some(id), json!({ "tools": tools }))
}

async fn call_tool(state: &AppState, pending: &PendingRequest) -> Value {
    let id = Some(pending.id.clone());

    let Some(raw_params) = pending.params.clone() else {
        return app_error_to_json_rpc(id, AppError::invalid_params("missing tool call params"));
    };
    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(tool_call) => tool_call,
        Err(err) => return app_error_to_json_rpc(id, AppError::invalid_params(err.to_string())),
    };

    let Some(registry) = state.registry.wait_ready(state.config.list_wait).await else {
        warn!(tool = %tool_call.name, "tools not loaded within the budget");
        return app_error_to_json_rpc(
            id,
            AppError::ToolsNotLoaded {
                name: tool_call.name,
            },
        );
    };
    if !registry.contains(&tool_call.name) {
        return app_error_to_json_rpc(id, AppError::tool_not_found(tool_call.name));
    }

    if state.config.policy.enforce_init_before_list && !pending.initialized {
        return app_error_to_json_rpc(id, AppError::NotInitialized);
    }

    let call = state
        .dispatcher
        .pending(tool_call.name, tool_call.arguments.unwrap_or_default());
    match state.dispatcher.execute(&registry, call).await {
        Ok(text) => tool_text_result(id, text),
        Err(err) => app_error_to_json_rpc(id, err),
    }
}

fn tool_text_result(id: Option<Value>, text: String) -> Value {
    let result = CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    };

    match serde_json::to_value(result) {
        Ok(result) => json_rpc_result(id, result),
        Err(err) => app_error_to_json_rpc(
            id,
            AppError::internal(format!("tool result serialization: {err}")),
        ),
    }
}

fn settle(joined: Result<Result<(), TransportError>, JoinError>) -> Result<(), TransportError> {
    match joined {
        Ok(written) => written,
        Err(join_error) => {
            error!(error = %join_error, "request task ended without answering");
            Ok(())
        }
    }
}

fn audit(method: &str, params: Option<&Value>, started_at: Instant, response: &Value) {
    let audit_params = redact_audit_params(params);
    logging::request_summary(method, &audit_params, started_at, response);
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization"
            | "bearer"
            | "credentials"
            | "credential"
            | "api_key"
            | "apikey"
            | "accesskeyid"
            | "access_key_id"
            | "ak"
            | "sk"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
