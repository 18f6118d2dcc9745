pub mod test_helpers {
    //! Fixtures shared by unit and integration tests.

    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::Router;
    use serde_json::{json, Map, Value};
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::config::ServerConfig;
    use crate::mcp::http_transport::mcp_router;
    use crate::mcp::registry::ToolRegistry;
    use crate::mcp::service::McpService;
    use crate::mcp::tool::{empty_input_schema, CallContext, Tool, ToolError, ToolResult};
    use crate::plugins::{Plugin, PluginApi, PluginError, PluginFactory, PluginLoader};
    use crate::services::{execution_bridge, BridgeDrain};
    use crate::AppState;

    /// Echoes its arguments back as JSON text.
    pub struct EchoTool {
        name: String,
    }

    impl EchoTool {
        pub fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Echoes its arguments"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}, "additionalProperties": true})
        }

        async fn call(
            &self,
            args: Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::json(&Value::Object(args)))
        }
    }

    /// Always returns [`ToolError::Failed`].
    pub struct FailingTool {
        name: String,
    }

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn input_schema(&self) -> Value {
            empty_input_schema()
        }

        async fn call(
            &self,
            _args: Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<ToolResult, ToolError> {
            Err(ToolError::Failed("deliberate failure".to_string()))
        }
    }

    /// Panics when called.
    pub struct PanickingTool {
        name: String,
    }

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Panics when called"
        }

        fn input_schema(&self) -> Value {
            empty_input_schema()
        }

        async fn call(
            &self,
            _args: Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<ToolResult, ToolError> {
            panic!("deliberate panic in {}", self.name)
        }
    }

    /// Panics while describing its input schema.
    pub struct BrokenSchemaTool {
        name: String,
    }

    #[async_trait]
    impl Tool for BrokenSchemaTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Cannot describe its arguments"
        }

        fn input_schema(&self) -> Value {
            panic!("schema generation failed for {}", self.name)
        }

        async fn call(
            &self,
            _args: Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text("unreachable through tools/list"))
        }
    }

    /// Returns the protocol version seen in its call context.
    pub struct ProtocolVersionTool {
        name: String,
    }

    #[async_trait]
    impl Tool for ProtocolVersionTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "Reports the negotiated protocol version"
        }

        fn input_schema(&self) -> Value {
            empty_input_schema()
        }

        async fn call(
            &self,
            _args: Map<String, Value>,
            ctx: CallContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text(ctx.protocol_version))
        }
    }

    /// Picks a fixture tool by name suffix: `/fail`, `/panic`, `/version`
    /// and `/bad_schema` get the matching behavior, anything else echoes.
    pub fn fixture_tool(name: &str) -> Arc<dyn Tool> {
        let name = name.to_string();
        if name.ends_with("/fail") {
            Arc::new(FailingTool { name })
        } else if name.ends_with("/panic") {
            Arc::new(PanickingTool { name })
        } else if name.ends_with("/version") {
            Arc::new(ProtocolVersionTool { name })
        } else if name.ends_with("/bad_schema") {
            Arc::new(BrokenSchemaTool { name })
        } else {
            Arc::new(EchoTool { name })
        }
    }

    /// Plugin that returns a fixed set of fixture tools from `tools()`.
    pub struct StaticPlugin {
        id: String,
        tool_names: Vec<String>,
    }

    impl StaticPlugin {
        pub fn factory(id: &str, tool_names: &[&str]) -> PluginFactory {
            let id = id.to_string();
            let tool_names: Vec<String> = tool_names.iter().map(|n| n.to_string()).collect();
            PluginFactory::new(id.clone(), move || {
                Ok(Box::new(StaticPlugin {
                    id: id.clone(),
                    tool_names: tool_names.clone(),
                }) as Box<dyn Plugin>)
            })
        }
    }

    impl Plugin for StaticPlugin {
        fn id(&self) -> &str {
            &self.id
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            self.tool_names.iter().map(|n| fixture_tool(n)).collect()
        }
    }

    /// Plugin whose `initialize` always fails.
    pub struct FailingInitPlugin {
        id: String,
    }

    impl FailingInitPlugin {
        pub fn factory(id: &str) -> PluginFactory {
            let id = id.to_string();
            PluginFactory::new(id.clone(), move || {
                Ok(Box::new(FailingInitPlugin { id: id.clone() }) as Box<dyn Plugin>)
            })
        }
    }

    impl Plugin for FailingInitPlugin {
        fn id(&self) -> &str {
            &self.id
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn initialize(&mut self, api: &mut PluginApi<'_>) -> Result<(), PluginError> {
            Err(PluginError::Initialize(format!(
                "{} refused to start",
                api.plugin_id()
            )))
        }

        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            vec![fixture_tool(&format!("{}/never", self.id))]
        }
    }

    /// A call context with a detached bridge and a fresh cancellation token.
    pub fn call_context() -> CallContext {
        let (bridge, _drain) = execution_bridge();
        CallContext {
            request_id: Uuid::new_v4(),
            client_id: None,
            protocol_version: ServerConfig::default().default_protocol_version,
            bridge,
            cancellation: CancellationToken::new(),
            span: tracing::Span::none(),
        }
    }

    /// Loads the core plugin plus `plugins` into a fresh service.
    ///
    /// Keep the returned drain alive for as long as tools may post work.
    pub fn service_with_plugins(plugins: Vec<PluginFactory>) -> (McpService, BridgeDrain) {
        let (bridge, drain) = execution_bridge();
        let mut registry = ToolRegistry::new();
        PluginLoader::new(bridge.clone()).load_all(plugins, &mut registry);
        let service = McpService::new(
            Arc::new(ServerConfig::default()),
            registry.freeze(),
            bridge,
            CancellationToken::new(),
        );
        (service, drain)
    }

    pub fn app_state(config: ServerConfig, plugins: Vec<PluginFactory>) -> (AppState, BridgeDrain) {
        let (bridge, drain) = execution_bridge();
        let mut registry = ToolRegistry::new();
        PluginLoader::new(bridge.clone()).load_all(plugins, &mut registry);
        let state = AppState::new(config, registry.freeze(), bridge, CancellationToken::new());
        (state, drain)
    }

    /// Router over a fresh state, the way the server binary builds it.
    pub fn test_router(config: ServerConfig, plugins: Vec<PluginFactory>) -> (Router, BridgeDrain) {
        let (state, drain) = app_state(config, plugins);
        (mcp_router(state), drain)
    }

    /// Config with enforcement on and `token` as the only accepted credential.
    pub fn config_with_token(token: &str) -> ServerConfig {
        ServerConfig {
            require_bearer_token: true,
            static_bearer_token: Some(token.to_string()),
            ..ServerConfig::default()
        }
    }

    pub fn rpc_body(id: Value, method: &str, params: Option<Value>) -> Value {
        let mut body = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(params) = params {
            body["params"] = params;
        }
        body
    }

    /// `POST` with a JSON body to `uri`.
    pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request")
    }

    pub fn post_raw(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request")
    }
}
