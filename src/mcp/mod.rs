//! MCP protocol surface
//!
//! - [`protocol`] - JSON-RPC envelopes and MCP result types
//! - [`tool`] - The [`Tool`] contract and per-call [`CallContext`]
//! - [`registry`] - [`ToolRegistry`], filled at load time and frozen afterwards
//! - [`service`] - [`McpService`], the method dispatcher
//! - [`http_transport`] - Axum router and handler for the HTTP endpoint

pub mod http_transport;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod tool;

pub use http_transport::{handle_streamable_http, mcp_router};
pub use registry::{RegistryError, SharedRegistry, ToolRegistry};
pub use service::{Dispatched, McpService, RequestMeta};
pub use tool::{CallContext, Tool, ToolContent, ToolError, ToolResult};
