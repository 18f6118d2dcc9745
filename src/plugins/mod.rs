//! Plugin contract and discovery
//!
//! A plugin is a bundle of tools under one namespace id. Plugins are never
//! found by scanning: the process entry point hands the [`PluginLoader`] an
//! explicit [`PluginSource`] (usually a `Vec<PluginFactory>`), and the
//! loader always prepends the built-in [`builtin::CorePlugin`].
//!
//! # Lifecycle
//!
//! 1. **Instantiate**: the factory builds the plugin value
//! 2. **Initialize**: [`Plugin::initialize`] gets a [`PluginApi`] and may
//!    register tools directly
//! 3. **Register**: every tool from [`Plugin::tools`] goes into the registry
//!
//! Failure at any step skips that plugin only. Tools it registered before
//! failing stay registered.

pub mod builtin;
pub mod loader;

pub use loader::{FailedPlugin, LoadReport, LoadedPlugin, PluginLoader};

use crate::mcp::registry::{RegistryError, ToolRegistry};
use crate::mcp::tool::Tool;
use crate::services::BridgeHandle;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Instantiation failed: {0}")]
    Instantiate(String),

    #[error("Initialization failed: {0}")]
    Initialize(String),

    #[error("Registration failed: {0}")]
    Register(#[from] RegistryError),

    #[error("Panicked during {stage}: {message}")]
    Panicked { stage: &'static str, message: String },
}

/// A provider of namespaced tools.
pub trait Plugin: Send {
    /// Namespace prefix, e.g. `rimbridge.core`.
    fn id(&self) -> &str;

    fn version(&self) -> &str;

    /// Called once before [`Plugin::tools`]. The default does nothing.
    fn initialize(&mut self, _api: &mut PluginApi<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Registration handle passed to [`Plugin::initialize`].
pub struct PluginApi<'a> {
    plugin_id: String,
    registry: &'a mut ToolRegistry,
    bridge: &'a BridgeHandle,
}

impl<'a> PluginApi<'a> {
    pub(crate) fn new(
        plugin_id: String,
        registry: &'a mut ToolRegistry,
        bridge: &'a BridgeHandle,
    ) -> Self {
        Self {
            plugin_id,
            registry,
            bridge,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Handle for tools that need to run work on the host context.
    pub fn bridge(&self) -> &BridgeHandle {
        self.bridge
    }

    /// Registers a tool immediately, subject to the same duplicate check as
    /// tools returned from [`Plugin::tools`].
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        tracing::debug!(plugin = %self.plugin_id, tool = %tool.name(), "Registering tool");
        self.registry.register(tool)
    }
}

type BuildFn = dyn Fn() -> Result<Box<dyn Plugin>, PluginError> + Send + Sync;

/// Named constructor for one plugin.
pub struct PluginFactory {
    name: String,
    build: Box<BuildFn>,
}

impl PluginFactory {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
        }
    }

    /// Factory for plugins that are constructed with `Default`.
    pub fn of<P>(name: impl Into<String>) -> Self
    where
        P: Plugin + Default + 'static,
    {
        Self::new(name, || Ok(Box::new(P::default()) as Box<dyn Plugin>))
    }

    /// Identity used in logs before the plugin itself exists.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(&self) -> Result<Box<dyn Plugin>, PluginError> {
        (self.build)()
    }
}

impl std::fmt::Debug for PluginFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Yields the finite list of plugin factories to load.
pub trait PluginSource {
    fn discover(self) -> Vec<PluginFactory>;
}

impl PluginSource for Vec<PluginFactory> {
    fn discover(self) -> Vec<PluginFactory> {
        self
    }
}

/// Source with no external plugins; only the built-in core loads.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlugins;

impl PluginSource for NoPlugins {
    fn discover(self) -> Vec<PluginFactory> {
        Vec::new()
    }
}
