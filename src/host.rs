//! Simulated host process
//!
//! Stands in for the application the server is embedded in: a dedicated OS
//! thread that ticks a counter and, once per tick, drains the execution
//! bridge. Anything that mutates [`HostState`] runs there.
//!
//! The `rimbridge.host` plugin exposes two tools against it:
//!
//! - `rimbridge.host/get_info` - read-only snapshot, no bridge round-trip
//! - `rimbridge.host/pause` - applies the change on the host thread and
//!   waits for its confirmation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::mcp::tool::{empty_input_schema, CallContext, Tool, ToolError, ToolResult};
use crate::plugins::{Plugin, PluginApi, PluginError, PluginFactory};
use crate::services::{BridgeDrain, BridgeHandle, DrainReport};

pub const HOST_PLUGIN_ID: &str = "rimbridge.host";
pub const GET_INFO_TOOL_NAME: &str = "rimbridge.host/get_info";
pub const PAUSE_TOOL_NAME: &str = "rimbridge.host/pause";

const PAUSE_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Host-owned state. Readable from anywhere, written only on the host thread.
#[derive(Debug, Default)]
pub struct HostState {
    ticks: AtomicU64,
    paused: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub status: &'static str,
    pub ticks: u64,
    pub paused: bool,
    pub observed_at: DateTime<Utc>,
}

impl HostState {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> HostSnapshot {
        let paused = self.is_paused();
        HostSnapshot {
            status: if paused { "paused" } else { "running" },
            ticks: self.ticks(),
            paused,
            observed_at: Utc::now(),
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    fn advance(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }
}

/// The host loop. Owns the single [`BridgeDrain`].
pub struct SimulatedHost {
    state: Arc<HostState>,
    drain: BridgeDrain,
    tick_interval: Duration,
}

impl SimulatedHost {
    pub fn new(drain: BridgeDrain, tick_interval: Duration) -> Self {
        Self {
            state: Arc::new(HostState::default()),
            drain,
            tick_interval,
        }
    }

    pub fn state(&self) -> Arc<HostState> {
        Arc::clone(&self.state)
    }

    /// One host frame: advance the clock unless paused, then drain.
    pub fn tick(&mut self) -> DrainReport {
        if !self.state.is_paused() {
            self.state.advance();
        }
        self.drain.drain_once()
    }

    /// Runs the loop on a named OS thread until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("rimbridge-host".to_string())
            .spawn(move || self.run(shutdown))
    }

    fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(tick_ms = self.tick_interval.as_millis() as u64, "Host loop started");

        while !shutdown.is_cancelled() {
            self.tick();
            thread::sleep(self.tick_interval);
        }

        // Work posted before shutdown still gets its one run.
        let report = self.drain.drain_once();
        tracing::info!(
            ticks = self.state.ticks(),
            final_drain = report.executed,
            "Host loop stopped"
        );
    }
}

/// Plugin exposing the host tools.
pub struct HostPlugin {
    state: Arc<HostState>,
}

impl HostPlugin {
    pub fn new(state: Arc<HostState>) -> Self {
        Self { state }
    }
}

pub fn host_factory(state: Arc<HostState>) -> PluginFactory {
    PluginFactory::new(HOST_PLUGIN_ID, move || {
        Ok(Box::new(HostPlugin::new(Arc::clone(&state))) as Box<dyn Plugin>)
    })
}

impl Plugin for HostPlugin {
    fn id(&self) -> &str {
        HOST_PLUGIN_ID
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn initialize(&mut self, api: &mut PluginApi<'_>) -> Result<(), PluginError> {
        let pause = PauseTool {
            state: Arc::clone(&self.state),
            bridge: api.bridge().clone(),
        };
        api.register_tool(Arc::new(pause))?;
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(GetInfoTool {
            state: Arc::clone(&self.state),
        })]
    }
}

pub struct GetInfoTool {
    state: Arc<HostState>,
}

#[async_trait]
impl Tool for GetInfoTool {
    fn name(&self) -> &str {
        GET_INFO_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Returns the host status, tick count and pause flag."
    }

    fn input_schema(&self) -> Value {
        empty_input_schema()
    }

    async fn call(
        &self,
        _args: Map<String, Value>,
        _ctx: CallContext,
    ) -> Result<ToolResult, ToolError> {
        let snapshot = serde_json::to_value(self.state.snapshot()).map_err(anyhow::Error::from)?;
        Ok(ToolResult::json(&snapshot))
    }
}

pub struct PauseTool {
    state: Arc<HostState>,
    bridge: BridgeHandle,
}

#[async_trait]
impl Tool for PauseTool {
    fn name(&self) -> &str {
        PAUSE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Pauses or resumes the host. Waits until the host thread applies the change."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pause": {
                    "type": "boolean",
                    "description": "true to pause, false to resume",
                    "default": true
                }
            },
            "required": []
        })
    }

    async fn call(
        &self,
        args: Map<String, Value>,
        ctx: CallContext,
    ) -> Result<ToolResult, ToolError> {
        let pause = match args.get("pause") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(pause)) => *pause,
            Some(other) => {
                return Ok(ToolResult::error(format!(
                    "Invalid argument 'pause': expected boolean, got {}",
                    other
                )))
            }
        };

        let (confirm_tx, confirm_rx) = oneshot::channel();
        let state = Arc::clone(&self.state);
        self.bridge
            .post(move || {
                state.set_paused(pause);
                if confirm_tx.send(state.is_paused()).is_err() {
                    tracing::debug!("Pause confirmation dropped: caller stopped waiting");
                }
                Ok(())
            })
            .map_err(|e| ToolError::Internal(e.into()))?;

        tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(ToolError::Cancelled),
            confirmed = tokio::time::timeout(PAUSE_CONFIRMATION_TIMEOUT, confirm_rx) => match confirmed {
                Ok(Ok(paused)) => Ok(ToolResult::json(&json!({
                    "success": true,
                    "paused": paused,
                    "message": if paused { "Host paused" } else { "Host resumed" },
                }))),
                Ok(Err(_)) => Err(ToolError::Failed(
                    "Host discarded the pause request".to_string(),
                )),
                Err(_) => Ok(ToolResult::json(&json!({
                    "success": false,
                    "paused": self.state.is_paused(),
                    "message": "Timed out waiting for the host to apply the change",
                }))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::ToolRegistry;
    use crate::mcp::tool::ToolContent;
    use crate::plugins::PluginLoader;
    use crate::services::execution_bridge;
    use crate::test_utils::test_helpers::call_context;

    fn text_of(result: &ToolResult) -> Value {
        match &result.content[0] {
            ToolContent::Text { text } => serde_json::from_str(text).unwrap(),
        }
    }

    fn host_tools() -> (ToolRegistry, SimulatedHost) {
        let (bridge, drain) = execution_bridge();
        let host = SimulatedHost::new(drain, Duration::from_millis(1));
        let mut registry = ToolRegistry::new();
        let report =
            PluginLoader::new(bridge).load_all(vec![host_factory(host.state())], &mut registry);
        assert!(report.failed.is_empty());
        (registry, host)
    }

    #[test]
    fn test_tick_advances_only_while_running() {
        let (_bridge, drain) = execution_bridge();
        let mut host = SimulatedHost::new(drain, Duration::from_millis(1));

        host.tick();
        host.tick();
        assert_eq!(host.state().ticks(), 2);

        host.state().set_paused(true);
        host.tick();
        assert_eq!(host.state().ticks(), 2);
        assert_eq!(host.state().snapshot().status, "paused");
    }

    #[test]
    fn test_plugin_registers_both_tools() {
        let (registry, _host) = host_tools();
        assert!(registry.lookup(GET_INFO_TOOL_NAME).is_some());
        assert!(registry.lookup(PAUSE_TOOL_NAME).is_some());
    }

    #[tokio::test]
    async fn test_get_info_reports_snapshot() {
        let (registry, mut host) = host_tools();
        host.tick();

        let tool = registry.lookup(GET_INFO_TOOL_NAME).unwrap();
        let result = tool.call(Map::new(), call_context()).await.unwrap();
        let info = text_of(&result);

        assert!(!result.is_error);
        assert_eq!(info["status"], "running");
        assert_eq!(info["ticks"], 1);
        assert_eq!(info["paused"], false);
        assert!(info["observedAt"].is_string());
    }

    #[tokio::test]
    async fn test_pause_round_trips_through_host_thread() {
        let (registry, host) = host_tools();
        let state = host.state();
        let shutdown = CancellationToken::new();
        let thread = host.spawn(shutdown.clone()).unwrap();

        let tool = registry.lookup(PAUSE_TOOL_NAME).unwrap();
        let result = tool.call(Map::new(), call_context()).await.unwrap();
        let body = text_of(&result);
        assert_eq!(body["success"], true);
        assert_eq!(body["paused"], true);
        assert!(state.is_paused());

        let mut args = Map::new();
        args.insert("pause".to_string(), Value::Bool(false));
        let result = tool.call(args, call_context()).await.unwrap();
        assert_eq!(text_of(&result)["paused"], false);
        assert!(!state.is_paused());

        shutdown.cancel();
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn test_pause_rejects_non_boolean_argument() {
        let (registry, _host) = host_tools();
        let tool = registry.lookup(PAUSE_TOOL_NAME).unwrap();

        let mut args = Map::new();
        args.insert("pause".to_string(), json!("yes"));
        let result = tool.call(args, call_context()).await.unwrap();

        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_pause_honours_cancellation() {
        // The host never drains, so only cancellation can end the call.
        let (registry, host) = host_tools();
        let tool = registry.lookup(PAUSE_TOOL_NAME).unwrap();

        let ctx = call_context();
        ctx.cancellation.cancel();
        let err = tool.call(Map::new(), ctx).await.unwrap_err();

        assert!(matches!(err, ToolError::Cancelled));
        assert!(!host.state().is_paused());
    }

    #[tokio::test]
    async fn test_pause_fails_when_host_is_gone() {
        let (registry, host) = host_tools();
        drop(host);

        let tool = registry.lookup(PAUSE_TOOL_NAME).unwrap();
        let err = tool.call(Map::new(), call_context()).await.unwrap_err();
        assert!(matches!(err, ToolError::Internal(_)));
    }
}
