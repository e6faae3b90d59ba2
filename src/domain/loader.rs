//! Background tool loading
//!
//! Discovery runs on its own task so the read loop can answer `initialize` while backends
//! are still being resolved. The completed registry is published exactly once through a
//! watch channel; readers never observe a partially built map.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info, warn};

use crate::domain::{
    registry::{RegistryError, ToolRegistry},
    tools::fallback_registry,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("backend discovery failed: {0}")]
    Discovery(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Source of the tool set. Backends (cloud SDK clients, credentials, regions) are
/// configured by the implementor before the server starts.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn discover(&self) -> Result<ToolRegistry, LoadError>;
}

/// Provider over an already-built registration table.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    registry: ToolRegistry,
}

impl StaticProvider {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolProvider for StaticProvider {
    async fn discover(&self) -> Result<ToolRegistry, LoadError> {
        Ok(self.registry.clone())
    }
}

/// Read side of the published registry.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    receiver: watch::Receiver<Option<Arc<ToolRegistry>>>,
}

impl RegistryHandle {
    /// Handle over a registry that is already loaded.
    pub fn ready(registry: ToolRegistry) -> Self {
        let (_sender, receiver) = watch::channel(Some(Arc::new(registry)));
        Self { receiver }
    }

    pub fn is_ready(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    pub fn current(&self) -> Option<Arc<ToolRegistry>> {
        self.receiver.borrow().clone()
    }

    /// Waits up to `budget` for the loader to publish. Returns `None` when the budget
    /// elapses first or the loader went away without publishing.
    pub async fn wait_ready(&self, budget: Duration) -> Option<Arc<ToolRegistry>> {
        if let Some(registry) = self.current() {
            return Some(registry);
        }

        let mut receiver = self.receiver.clone();
        let waited = tokio::time::timeout(budget, async move {
            let published = match receiver.wait_for(Option::is_some).await {
                Ok(published) => (*published).clone(),
                Err(_) => None,
            };
            published
        })
        .await;

        waited.ok().flatten()
    }
}

/// Starts discovery on a background task. If the provider fails, panics or exceeds
/// `load_budget`, the fallback registry is published instead.
pub fn spawn_loader(
    provider: Arc<dyn ToolProvider>,
    load_budget: Duration,
) -> (RegistryHandle, JoinHandle<()>) {
    let (sender, receiver) = watch::channel(None);

    let task = tokio::spawn(async move {
        let registry = load_registry(provider, load_budget).await;
        sender.send_replace(Some(Arc::new(registry)));
    });

    (RegistryHandle { receiver }, task)
}

async fn load_registry(provider: Arc<dyn ToolProvider>, load_budget: Duration) -> ToolRegistry {
    let discovery = tokio::spawn(async move { provider.discover().await });

    match tokio::time::timeout(load_budget, discovery).await {
        Ok(Ok(Ok(registry))) => {
            info!(tools = registry.len(), names = ?registry.names(), "tools loaded");
            registry
        }
        Ok(Ok(Err(err))) => {
            error!(error = %err, "tool discovery failed, installing fallback tools");
            fallback_registry()
        }
        Ok(Err(join_error)) => {
            error!(error = %join_error, "tool discovery aborted, installing fallback tools");
            fallback_registry()
        }
        Err(_) => {
            warn!(
                budget_ms = load_budget.as_millis(),
                "tool discovery exceeded its budget, installing fallback tools"
            );
            fallback_registry()
        }
    }
}
