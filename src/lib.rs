use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod mcp;

use config::Config;
use domain::{
    dispatch::Dispatcher,
    loader::{spawn_loader, RegistryHandle, ToolProvider},
};
use mcp::server::McpServer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: RegistryHandle,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Config, registry: RegistryHandle) -> Self {
        let dispatcher = Dispatcher::new(
            config.policy.call_deadline,
            config.policy.timeout_is_error,
        );
        Self {
            config: Arc::new(config),
            registry,
            dispatcher,
        }
    }
}

/// Starts tool discovery in the background and returns the server that will serve
/// it. Must be called from within a tokio runtime.
pub fn build_server(config: Config, provider: Arc<dyn ToolProvider>) -> McpServer {
    let (registry, _loader) = spawn_loader(provider, config.load_timeout);
    McpServer::new(AppState::new(config, registry))
}
