//! Loads plugins into the tool registry, isolating failures per plugin.

use super::builtin::core_factory;
use super::{Plugin, PluginApi, PluginError, PluginFactory, PluginSource};
use crate::error::panic_message;
use crate::mcp::registry::ToolRegistry;
use crate::services::BridgeHandle;
use std::panic::{self, AssertUnwindSafe};

/// Summary of one plugin that loaded cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlugin {
    pub id: String,
    pub version: String,
    pub tools: usize,
}

/// A provider that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPlugin {
    pub provider: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<LoadedPlugin>,
    pub failed: Vec<FailedPlugin>,
}

impl LoadReport {
    pub fn loaded_ids(&self) -> Vec<&str> {
        self.loaded.iter().map(|p| p.id.as_str()).collect()
    }
}

pub struct PluginLoader {
    bridge: BridgeHandle,
}

impl PluginLoader {
    pub fn new(bridge: BridgeHandle) -> Self {
        Self { bridge }
    }

    /// Loads the built-in core plugin followed by everything `source`
    /// discovers.
    ///
    /// # Behavior
    ///
    /// Continues loading even if some plugins fail. Failures are logged with
    /// the provider's name and recorded in the report; they are never
    /// returned as errors. Once this returns the caller should
    /// [`ToolRegistry::freeze`] the registry.
    pub fn load_all<S: PluginSource>(&self, source: S, registry: &mut ToolRegistry) -> LoadReport {
        let mut factories = vec![core_factory()];
        factories.extend(source.discover());

        let mut report = LoadReport::default();
        for factory in &factories {
            match self.load_one(factory, registry) {
                Ok(loaded) => {
                    tracing::info!(
                        plugin = %loaded.id,
                        version = %loaded.version,
                        tools = loaded.tools,
                        "Loaded plugin"
                    );
                    report.loaded.push(loaded);
                }
                Err(e) => {
                    tracing::error!(
                        provider = %factory.name(),
                        error = %e,
                        "Failed to load plugin"
                    );
                    report.failed.push(FailedPlugin {
                        provider: factory.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            tools = registry.len(),
            "Plugin load phase complete"
        );

        report
    }

    /// Any panic escaping the staged guards below, such as one raised by a
    /// plugin accessor or a tool's `name()`, fails only this plugin.
    fn load_one(
        &self,
        factory: &PluginFactory,
        registry: &mut ToolRegistry,
    ) -> Result<LoadedPlugin, PluginError> {
        guarded("loading", || self.load_stages(factory, registry))
    }

    fn load_stages(
        &self,
        factory: &PluginFactory,
        registry: &mut ToolRegistry,
    ) -> Result<LoadedPlugin, PluginError> {
        let mut plugin: Box<dyn Plugin> = guarded("instantiation", || factory.build())?;
        let before = registry.len();

        {
            let mut api = PluginApi::new(plugin.id().to_string(), registry, &self.bridge);
            guarded("initialization", || plugin.initialize(&mut api))?;
        }

        let tools = guarded("tool enumeration", || Ok(plugin.tools()))?;
        for tool in tools {
            registry.register(tool)?;
        }

        Ok(LoadedPlugin {
            id: plugin.id().to_string(),
            version: plugin.version().to_string(),
            tools: registry.len() - before,
        })
    }
}

/// Runs plugin code, turning a panic into [`PluginError::Panicked`].
fn guarded<T>(
    stage: &'static str,
    f: impl FnOnce() -> Result<T, PluginError>,
) -> Result<T, PluginError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(PluginError::Panicked {
            stage,
            message: panic_message(payload.as_ref()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builtin::{CORE_PLUGIN_ID, PING_TOOL_NAME};
    use crate::plugins::NoPlugins;
    use crate::services::execution_bridge;
    use crate::mcp::tool::{CallContext, Tool, ToolError, ToolResult};
    use crate::test_utils::test_helpers::{FailingInitPlugin, StaticPlugin};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn loader() -> PluginLoader {
        let (handle, _drain) = execution_bridge();
        PluginLoader::new(handle)
    }

    #[test]
    fn test_core_plugin_always_loads() {
        let mut registry = ToolRegistry::new();
        let report = loader().load_all(NoPlugins, &mut registry);

        assert_eq!(report.loaded_ids(), vec![CORE_PLUGIN_ID]);
        assert!(report.failed.is_empty());
        assert_eq!(registry.names(), vec![PING_TOOL_NAME]);
    }

    #[test]
    fn test_failing_plugin_does_not_block_later_plugins() {
        let mut registry = ToolRegistry::new();
        let report = loader().load_all(
            vec![
                FailingInitPlugin::factory("broken"),
                StaticPlugin::factory("good", &["good/one", "good/two"]),
            ],
            &mut registry,
        );

        assert_eq!(report.loaded_ids(), vec![CORE_PLUGIN_ID, "good"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].provider, "broken");
        assert!(registry.lookup("good/one").is_some());
        assert!(registry.lookup("good/two").is_some());
    }

    #[test]
    fn test_duplicate_tool_fails_only_the_offending_plugin() {
        let mut registry = ToolRegistry::new();
        let report = loader().load_all(
            vec![
                StaticPlugin::factory("first", &["shared/tool"]),
                StaticPlugin::factory("second", &["second/own", "shared/tool", "second/after"]),
                StaticPlugin::factory("third", &["third/tool"]),
            ],
            &mut registry,
        );

        assert_eq!(report.loaded_ids(), vec![CORE_PLUGIN_ID, "first", "third"]);
        assert_eq!(report.failed[0].provider, "second");
        assert!(report.failed[0].error.contains("Duplicate tool name: shared/tool"));

        // Tools registered before the failure stay, the rest never arrive.
        assert!(registry.lookup("second/own").is_some());
        assert!(registry.lookup("second/after").is_none());
        assert_eq!(
            registry.names(),
            vec![PING_TOOL_NAME, "shared/tool", "second/own", "third/tool"]
        );
    }

    #[test]
    fn test_instantiation_error_and_panic_are_isolated() {
        let mut registry = ToolRegistry::new();
        let report = loader().load_all(
            vec![
                PluginFactory::new("refuses", || {
                    Err(PluginError::Instantiate("missing dependency".into()))
                }),
                PluginFactory::new("explodes", || panic!("constructor blew up")),
                StaticPlugin::factory("survivor", &["survivor/tool"]),
            ],
            &mut registry,
        );

        assert_eq!(report.loaded_ids(), vec![CORE_PLUGIN_ID, "survivor"]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].error.contains("missing dependency"));
        assert!(report.failed[1].error.contains("constructor blew up"));
    }

    #[test]
    fn test_redeclaring_core_plugin_is_rejected() {
        let mut registry = ToolRegistry::new();
        let report = loader().load_all(
            vec![crate::plugins::builtin::core_factory()],
            &mut registry,
        );

        assert_eq!(report.loaded_ids(), vec![CORE_PLUGIN_ID]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    struct NamelessTool;

    #[async_trait]
    impl Tool for NamelessTool {
        fn name(&self) -> &str {
            panic!("tool has no name")
        }

        fn description(&self) -> &str {
            "Cannot be registered"
        }

        fn input_schema(&self) -> Value {
            crate::mcp::tool::empty_input_schema()
        }

        async fn call(
            &self,
            _args: Map<String, Value>,
            _ctx: CallContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text("never registered"))
        }
    }

    struct NamelessToolPlugin;

    impl Plugin for NamelessToolPlugin {
        fn id(&self) -> &str {
            "nameless"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn tools(&self) -> Vec<Arc<dyn Tool>> {
            vec![Arc::new(NamelessTool)]
        }
    }

    #[test]
    fn test_panic_while_registering_tool_is_isolated() {
        let mut registry = ToolRegistry::new();
        let report = loader().load_all(
            vec![
                PluginFactory::new("nameless", || {
                    Ok(Box::new(NamelessToolPlugin) as Box<dyn Plugin>)
                }),
                StaticPlugin::factory("after", &["after/tool"]),
            ],
            &mut registry,
        );

        assert_eq!(report.loaded_ids(), vec![CORE_PLUGIN_ID, "after"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].provider, "nameless");
        assert_eq!(
            report.failed[0].error,
            "Panicked during loading: tool has no name"
        );
        assert_eq!(registry.names(), vec![PING_TOOL_NAME, "after/tool"]);
    }
}
