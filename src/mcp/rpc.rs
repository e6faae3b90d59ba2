//! JSON-RPC envelope construction
//!
//! Maps `AppError` values onto JSON-RPC error objects and echoes request ids verbatim.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Value};

use crate::errors::AppError;

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn app_error_to_json_rpc(id: Option<Value>, err: AppError) -> Value {
    let data = json!({
        "code": err.kind(),
        "details": err.details(),
    });
    json_rpc_error_with_data(id, err.code(), &err.to_string(), Some(data))
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    // ids the schema cannot represent (floats, objects) are echoed as sent
    let request_id = id.as_ref().and_then(value_to_request_id);
    if id.is_some() && request_id.is_none() {
        let mut error = json!({ "code": code, "message": message });
        if let Some(data) = data {
            error["data"] = data;
        }
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": error,
        });
    }

    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data,
            message: message.to_string(),
        },
        request_id,
    );
    serde_json::to_value(response).unwrap_or_else(|err| {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": crate::errors::INTERNAL_ERROR,
                "message": format!("Internal error: {err}"),
            },
        })
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        if let Ok(value) = serde_json::to_value(response) {
            return value;
        }
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_echoes_integer_and_string_ids() {
        let numeric = json_rpc_result(Some(json!(7)), json!({ "tools": [] }));
        assert_eq!(numeric["jsonrpc"], "2.0");
        assert_eq!(numeric["id"], 7);
        assert!(numeric["result"]["tools"].is_array());

        let text = json_rpc_result(Some(json!("req-1")), json!({}));
        assert_eq!(text["id"], "req-1");
        assert!(text["result"].is_object());
    }

    #[test]
    fn error_echoes_unusual_id_verbatim() {
        let response = json_rpc_error_with_data(Some(json!(1.5)), -32601, "Method 'x' not found", None);

        assert_eq!(response["id"], json!(1.5));
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["message"], "Method 'x' not found");
    }

    #[test]
    fn app_error_carries_kind_and_details() {
        let response = app_error_to_json_rpc(Some(json!(3)), AppError::tool_not_found("nope"));

        assert_eq!(response["id"], 3);
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["message"], "Unknown tool: nope");
        assert_eq!(response["error"]["data"]["code"], "tool_not_found");
        assert_eq!(response["error"]["data"]["details"]["name"], "nope");
        assert!(is_json_rpc_error(&response));
    }
}
