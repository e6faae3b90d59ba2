use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::mcp::rpc::is_json_rpc_error;

/// Installs the global subscriber. Output goes to stderr; stdout belongs to
/// the protocol stream.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .compact()
        .init();
}

pub fn request_summary(method: &str, params: &Value, started_at: Instant, response: &Value) {
    let elapsed_ms = started_at.elapsed().as_millis();
    let failed = is_json_rpc_error(response);

    info!(
        method = %method,
        params = %params,
        outcome = if failed { "failure" } else { "success" },
        duration_ms = elapsed_ms,
        "mcp action audited"
    );

    if failed {
        let code = response
            .get("error")
            .and_then(|error| error.get("code"))
            .and_then(Value::as_i64)
            .unwrap_or_default();
        warn!(method = %method, code, "request answered with error");
    }
}
