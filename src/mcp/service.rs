//! MCP request dispatcher
//!
//! Decodes JSON-RPC envelopes, routes them by method, and encodes the
//! response. The service holds no per-connection state: any method may be
//! called at any time, `initialize` included.
//!
//! # Supported Methods
//!
//! * `initialize` - Negotiates a protocol version, returns capabilities
//! * `notifications/initialized` - Acknowledged with an empty result
//! * `ping` - Protocol liveness, empty result
//! * `tools/list` - Every registered tool with its owning plugin id
//! * `tools/call` - Invokes a tool by name
//!
//! # Usage
//!
//! ```rust
//! # use rimbridge::config::ServerConfig;
//! # use rimbridge::mcp::{McpService, RequestMeta, ToolRegistry};
//! # use rimbridge::plugins::{NoPlugins, PluginLoader};
//! # use rimbridge::services::execution_bridge;
//! # use std::sync::Arc;
//! # use tokio_util::sync::CancellationToken;
//! # async fn example() {
//! let (bridge, _drain) = execution_bridge();
//! let mut registry = ToolRegistry::new();
//! PluginLoader::new(bridge.clone()).load_all(NoPlugins, &mut registry);
//!
//! let service = McpService::new(
//!     Arc::new(ServerConfig::default()),
//!     registry.freeze(),
//!     bridge,
//!     CancellationToken::new(),
//! );
//! let body = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
//! let dispatched = service.handle_body(body, RequestMeta::default()).await;
//! assert!(dispatched.response.result.is_some());
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{panic_message, McpServiceError};
use crate::mcp::protocol::{
    negotiate_version, plugin_id_of, Implementation, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, ToolAnnotations, ToolDefinition,
    ToolsCapability,
};
use crate::mcp::registry::SharedRegistry;
use crate::mcp::tool::CallContext;
use crate::services::BridgeHandle;

/// What the transport knows about the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub client_id: Option<String>,
    /// Value of the `MCP-Protocol-Version` request header, if any.
    pub protocol_version: Option<String>,
}

/// Response plus the HTTP status it should be sent with.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub status: StatusCode,
    pub response: JsonRpcResponse,
}

pub struct McpService {
    config: Arc<ServerConfig>,
    registry: SharedRegistry,
    bridge: BridgeHandle,
    shutdown: CancellationToken,
}

impl McpService {
    /// `shutdown` is the root token; each tool call gets a child of it.
    pub fn new(
        config: Arc<ServerConfig>,
        registry: SharedRegistry,
        bridge: BridgeHandle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            bridge,
            shutdown,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Handles one raw request body.
    ///
    /// Undecodable bodies short-circuit with a `-32700` error, `id: null`,
    /// and HTTP 400. Everything else is answered with HTTP 200, including
    /// JSON-RPC errors.
    pub async fn handle_body(&self, body: &[u8], meta: RequestMeta) -> Dispatched {
        let request = match JsonRpcRequest::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "Rejecting undecodable JSON-RPC body");
                return Dispatched {
                    status: StatusCode::BAD_REQUEST,
                    response: JsonRpcResponse::err(Value::Null, McpServiceError::Parse),
                };
            }
        };

        Dispatched {
            status: StatusCode::OK,
            response: self.handle_request(request, &meta).await,
        }
    }

    /// Routes a decoded request and wraps the outcome in a response that
    /// echoes the request id.
    ///
    /// A panic anywhere in the method handler, plugin code included, is
    /// answered as an internal error.
    pub async fn handle_request(&self, request: JsonRpcRequest, meta: &RequestMeta) -> JsonRpcResponse {
        let id = request.id.clone();
        let outcome = AssertUnwindSafe(self.dispatch(&request, meta))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(method = %request.method, panic = %message, "Handler panicked");
                Err(McpServiceError::internal(format!("Handler panicked: {}", message)))
            });

        match outcome {
            Ok(result) => JsonRpcResponse::ok(id, result),
            Err(e) => {
                tracing::debug!(method = %request.method, error = %e, "JSON-RPC request failed");
                JsonRpcResponse::err(id, e)
            }
        }
    }

    async fn dispatch(
        &self,
        request: &JsonRpcRequest,
        meta: &RequestMeta,
    ) -> Result<Value, McpServiceError> {
        match request.method.as_str() {
            "initialize" => self.initialize(request),
            "notifications/initialized" => Ok(json!({})),
            "ping" => {
                tracing::info!(
                    client = meta.client_id.as_deref().unwrap_or("unknown"),
                    "rpc: ping"
                );
                Ok(json!({}))
            }
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request, meta).await,
            other => Err(McpServiceError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize(&self, request: &JsonRpcRequest) -> Result<Value, McpServiceError> {
        let requested = request.param("protocolVersion").and_then(Value::as_str);
        let negotiated = negotiate_version(requested, &self.config.supported_protocol_versions);

        tracing::debug!(
            requested = requested.unwrap_or("<none>"),
            negotiated = %negotiated,
            "Negotiated protocol version"
        );

        to_result(InitializeResult {
            protocol_version: negotiated.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: Implementation {
                name: self.config.server_name.clone(),
                version: self.config.server_version.clone(),
            },
            instructions: Some(self.instructions()),
        })
    }

    fn instructions(&self) -> String {
        format!(
            "{} MCP server; tools: {}",
            self.config.server_name,
            self.registry.names().join(", ")
        )
    }

    fn list_tools(&self) -> Result<Value, McpServiceError> {
        let tools = self
            .registry
            .list()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
                annotations: ToolAnnotations {
                    plugin_id: plugin_id_of(tool.name()).to_string(),
                },
            })
            .collect();

        to_result(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: &JsonRpcRequest,
        meta: &RequestMeta,
    ) -> Result<Value, McpServiceError> {
        let name = match request.param("name") {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(McpServiceError::InvalidParams("Missing tool name".to_string())),
        };

        let args = match request.param("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args.clone(),
            Some(_) => {
                return Err(McpServiceError::InvalidParams(
                    "Invalid arguments: expected object".to_string(),
                ))
            }
        };

        let tool = self
            .registry
            .lookup(&name)
            .ok_or_else(|| McpServiceError::InvalidParams(format!("Unknown tool: {}", name)))?;

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "tool_call",
            tool = %name,
            request_id = %request_id,
            client = meta.client_id.as_deref().unwrap_or("unknown")
        );
        let cancellation = self.shutdown.child_token();
        let ctx = CallContext {
            request_id,
            client_id: meta.client_id.clone(),
            protocol_version: meta
                .protocol_version
                .clone()
                .unwrap_or_else(|| self.config.default_protocol_version.clone()),
            bridge: self.bridge.clone(),
            cancellation: cancellation.clone(),
            span: span.clone(),
        };

        tracing::debug!(parent: &span, "Invoking tool");

        // Cancels the call if this future is dropped before the tool returns.
        let guard = cancellation.drop_guard();
        let outcome = tokio::spawn(async move { tool.call(args, ctx).await }.instrument(span.clone()))
            .await;
        guard.disarm();

        match outcome {
            Ok(Ok(result)) => to_result(result),
            Ok(Err(e)) => {
                tracing::error!(parent: &span, error = %e, "Tool failed");
                Err(McpServiceError::internal(e.to_string()))
            }
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic().as_ref());
                tracing::error!(parent: &span, panic = %message, "Tool panicked");
                Err(McpServiceError::internal(format!("Tool panicked: {}", message)))
            }
            Err(join_error) => {
                tracing::error!(parent: &span, error = %join_error, "Tool task did not complete");
                Err(McpServiceError::internal(join_error.to_string()))
            }
        }
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, McpServiceError> {
    serde_json::to_value(value)
        .map_err(|e| McpServiceError::internal(format!("Failed to serialize result: {}", e)))
}
