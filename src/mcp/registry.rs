//! Tool registry
//!
//! Maps unique tool names to their implementations. The registry is filled
//! single-threaded during plugin loading, then moved into an `Arc` and only
//! read from afterwards, so lookups take no lock.

use crate::mcp::tool::Tool;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate tool name: {0}")]
    DuplicateToolName(String),
}

/// Registry of tools keyed by exact (case-sensitive) name
///
/// Listing preserves registration order.
///
/// # Examples
///
/// ```rust
/// use rimbridge::mcp::registry::ToolRegistry;
/// use rimbridge::plugins::builtin::PingTool;
/// use std::sync::Arc;
///
/// let mut registry = ToolRegistry::new();
/// registry.register(Arc::new(PingTool)).unwrap();
/// assert!(registry.register(Arc::new(PingTool)).is_err());
/// assert_eq!(registry.len(), 1);
/// assert!(registry.lookup("rimbridge.core/ping").is_some());
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

pub type SharedRegistry = Arc<ToolRegistry>;

impl ToolRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its own name
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Tool registered
    /// * `Err(RegistryError::DuplicateToolName)` - Name already taken; the
    ///   registry is left untouched
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateToolName(name));
        }

        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Exact, case-sensitive lookup
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    /// All tools in registration order
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Ends the load phase; the returned registry is read-only.
    pub fn freeze(self) -> SharedRegistry {
        Arc::new(self)
    }
}
