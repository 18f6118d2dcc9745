//! Tool contract shared by built-in and plugin-supplied tools

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::BridgeHandle;

/// A named, schema-described operation exposed over `tools/call`.
///
/// Names are namespaced as `<plugin-id>/<tool-id>` and must be unique
/// across the whole registry.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema object describing the accepted `arguments`.
    fn input_schema(&self) -> Value;

    /// Executes the tool.
    ///
    /// `Err` means the call itself broke and is reported to the client as a
    /// JSON-RPC internal error. Domain-level failures the client should see
    /// as tool output belong in `Ok(ToolResult::error(..))`.
    async fn call(&self, args: Map<String, Value>, ctx: CallContext)
        -> Result<ToolResult, ToolError>;
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Schema for tools that take no arguments.
pub fn empty_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool failed: {0}")]
    Failed(String),

    #[error("Tool call was cancelled")]
    Cancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One item of a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// Result of a tool invocation, serialized as the `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub is_error: bool,
    pub content: Vec<ToolContent>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![ToolContent::Text { text: text.into() }],
        }
    }

    /// Wraps a JSON value as a single text item.
    pub fn json(value: &Value) -> Self {
        Self::text(value.to_string())
    }
}

/// Per-invocation context handed to [`Tool::call`].
///
/// Built fresh for every `tools/call` request and dropped when the call
/// returns.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Correlates log lines for this call.
    pub request_id: Uuid,
    /// Peer address of the client, when the transport knows it.
    pub client_id: Option<String>,
    pub protocol_version: String,
    /// Posts work onto the host's serialized execution context.
    pub bridge: BridgeHandle,
    /// Fires on server shutdown or when the client goes away mid-call.
    pub cancellation: CancellationToken,
    /// Logging scope for the call (tool, request_id, client).
    pub span: tracing::Span,
}
