//! Built-in `rimbridge.core` plugin: connectivity check.

use super::{Plugin, PluginFactory};
use crate::mcp::tool::{empty_input_schema, CallContext, Tool, ToolError, ToolResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const CORE_PLUGIN_ID: &str = "rimbridge.core";
pub const PING_TOOL_NAME: &str = "rimbridge.core/ping";

#[derive(Debug, Default)]
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn id(&self) -> &str {
        CORE_PLUGIN_ID
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(PingTool)]
    }
}

/// Factory the loader always includes ahead of discovered plugins.
pub fn core_factory() -> PluginFactory {
    PluginFactory::of::<CorePlugin>(CORE_PLUGIN_ID)
}

/// Takes no arguments and answers `pong`.
#[derive(Debug, Default)]
pub struct PingTool;

#[async_trait]
impl Tool for PingTool {
    fn name(&self) -> &str {
        PING_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Connectivity test. Returns 'pong'."
    }

    fn input_schema(&self) -> Value {
        empty_input_schema()
    }

    async fn call(
        &self,
        _args: Map<String, Value>,
        _ctx: CallContext,
    ) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::text("pong"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::call_context;

    #[tokio::test]
    async fn test_ping_returns_pong() {
        let result = PingTool.call(Map::new(), call_context()).await.unwrap();
        assert_eq!(result, ToolResult::text("pong"));
    }

    #[test]
    fn test_core_plugin_exposes_ping() {
        let plugin = CorePlugin;
        let names: Vec<String> = plugin.tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec![PING_TOOL_NAME.to_string()]);
        assert_eq!(plugin.id(), CORE_PLUGIN_ID);
    }
}
