pub mod config;
pub mod error;
pub mod host;
pub mod mcp;
pub mod middleware;
pub mod plugins;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::mcp::{McpService, SharedRegistry};
use crate::services::BridgeHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub service: Arc<McpService>,
}

impl AppState {
    /// Wires the dispatcher over a frozen registry. `shutdown` is the root
    /// token every tool call's cancellation derives from.
    pub fn new(
        config: ServerConfig,
        registry: SharedRegistry,
        bridge: BridgeHandle,
        shutdown: CancellationToken,
    ) -> Self {
        let config = Arc::new(config);
        let service = Arc::new(McpService::new(
            Arc::clone(&config),
            registry,
            bridge,
            shutdown,
        ));
        Self { config, service }
    }
}
