//! Built-in tools and the catalog provider
//!
//! `test_connection` is always available, and is the whole tool set when discovery fails.
//! `list_supported_services` reports the configured service catalog.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::{
    loader::{LoadError, ToolProvider},
    registry::{
        empty_object_schema, Arguments, RegistryError, ToolDescriptor, ToolError, ToolHandler,
        ToolRegistry, ToolRegistryBuilder, ToolResult,
    },
    services::{
        filter_services_by_name_contains, normalize_name_contains, normalize_services_limit,
        resolve_services, ServiceEntry,
    },
};

pub const TEST_CONNECTION_TOOL: &str = "test_connection";
pub const LIST_SUPPORTED_SERVICES_TOOL: &str = "list_supported_services";

#[derive(Debug, Deserialize)]
pub struct ServicesQueryParams {
    pub name_contains: Option<String>,
    pub limit: Option<u32>,
}

pub fn test_connection_tool() -> ToolDescriptor {
    ToolDescriptor::new(
        TEST_CONNECTION_TOOL,
        "Test the MCP server connection",
        empty_object_schema(),
        ToolHandler::from_async(|_arguments: Arguments| async move {
            Ok(Value::String(format!(
                "{} {} connection test successful",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )))
        }),
    )
}

pub fn list_supported_services_tool(services: Vec<ServiceEntry>) -> ToolDescriptor {
    ToolDescriptor::new(
        LIST_SUPPORTED_SERVICES_TOOL,
        "List the cloud services this server is configured for",
        json!({
            "type": "object",
            "properties": {
                "name_contains": {
                    "type": "string",
                    "description": "Case-insensitive filter on service key or name"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100
                }
            },
            "required": []
        }),
        ToolHandler::from_blocking(move |arguments| list_services(&services, arguments)),
    )
}

fn list_services(services: &[ServiceEntry], arguments: Arguments) -> ToolResult {
    let query_params: ServicesQueryParams = serde_json::from_value(Value::Object(arguments))
        .map_err(|err| ToolError::new(format!("invalid arguments: {err}")))?;

    let name_contains = normalize_name_contains(query_params.name_contains);
    let limit = normalize_services_limit(query_params.limit)?;

    let matching = filter_services_by_name_contains(services.to_vec(), name_contains.as_deref());
    let total = matching.len();
    let services = matching.into_iter().take(limit).collect::<Vec<_>>();
    let returned = services.len();

    Ok(json!({
        "services": services,
        "total": total,
        "returned": returned,
        "truncated": total > returned,
        "generated_at_utc": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Minimal tool set installed when discovery fails.
pub fn fallback_registry() -> ToolRegistry {
    ToolRegistry::builder()
        .register(test_connection_tool())
        .map(ToolRegistryBuilder::build)
        .unwrap_or_default()
}

/// Registration table for the bundled tools over the configured service catalog.
#[derive(Debug, Clone)]
pub struct CatalogProvider {
    services: Vec<ServiceEntry>,
}

impl CatalogProvider {
    pub fn new(service_keys: Option<&[String]>) -> Self {
        Self {
            services: resolve_services(service_keys),
        }
    }

    pub fn build_registry(&self) -> Result<ToolRegistry, RegistryError> {
        Ok(ToolRegistry::builder()
            .register(test_connection_tool())?
            .register(list_supported_services_tool(self.services.clone()))?
            .build())
    }
}

#[async_trait]
impl ToolProvider for CatalogProvider {
    async fn discover(&self) -> Result<ToolRegistry, LoadError> {
        Ok(self.build_registry()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_blocking(tool: &ToolDescriptor, arguments: Value) -> ToolResult {
        let ToolHandler::Blocking(handler) = &tool.handler else {
            panic!("expected blocking handler");
        };
        let Value::Object(arguments) = arguments else {
            panic!("arguments must be an object");
        };
        handler.call(arguments)
    }

    #[test]
    fn catalog_registry_lists_bundled_tools() {
        let registry = CatalogProvider::new(None)
            .build_registry()
            .expect("registry builds");

        assert_eq!(
            registry.names(),
            vec![TEST_CONNECTION_TOOL, LIST_SUPPORTED_SERVICES_TOOL]
        );
    }

    #[test]
    fn fallback_registry_holds_only_self_test() {
        assert_eq!(fallback_registry().names(), vec![TEST_CONNECTION_TOOL]);
    }

    #[tokio::test]
    async fn test_connection_reports_success() {
        let ToolHandler::Async(handler) = test_connection_tool().handler else {
            panic!("expected async handler");
        };

        let result = handler.call(Arguments::new()).await.expect("self test");
        let text = result.as_str().expect("text result");
        assert!(text.contains("connection test successful"));
    }

    #[test]
    fn list_services_filters_and_truncates() {
        let keys = vec!["ecs".to_string(), "oss".to_string(), "rds".to_string()];
        let tool = list_supported_services_tool(resolve_services(Some(keys.as_slice())));

        let result = call_blocking(&tool, json!({ "limit": 2 })).expect("listing succeeds");
        assert_eq!(result["total"], 3);
        assert_eq!(result["returned"], 2);
        assert_eq!(result["truncated"], true);
        assert_eq!(result["services"][0]["key"], "ecs");

        let result =
            call_blocking(&tool, json!({ "name_contains": "storage" })).expect("filter succeeds");
        assert_eq!(result["total"], 1);
        assert_eq!(result["services"][0]["key"], "oss");
    }

    #[test]
    fn list_services_rejects_bad_arguments() {
        let tool = list_supported_services_tool(resolve_services(None));

        let err = call_blocking(&tool, json!({ "limit": 0 })).expect_err("limit out of range");
        assert!(err.message().contains("limit"));

        let err = call_blocking(&tool, json!({ "limit": "ten" })).expect_err("wrong type");
        assert!(err.message().contains("invalid arguments"));
    }
}
