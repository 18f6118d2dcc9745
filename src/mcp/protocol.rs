//! JSON-RPC 2.0 envelopes and the MCP result shapes carried inside them
//!
//! Only the subset of MCP used by this server is modelled: `initialize`,
//! `tools/list` and `tools/call`. Field names follow the MCP wire format
//! (camelCase), so these types serialize straight onto the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

pub const PROTOCOL_V2025_06_18: &str = "2025-06-18";
pub const PROTOCOL_V2025_03_26: &str = "2025-03-26";

/// Request header carrying the protocol version a client is speaking.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

/// Incoming JSON-RPC request
///
/// `id` defaults to `null` when absent so it can always be echoed back.
/// A missing `method` decodes as the empty string and is routed to
/// "method not found" like any other unknown method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        let params = match params {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        };
        Self {
            jsonrpc: default_jsonrpc(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Decodes a raw request body.
    ///
    /// The body must be a single JSON object; batches and bare values are
    /// rejected so that the positional (array) form of a struct never sneaks
    /// through serde.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("JSON-RPC request must be an object"));
        }
        serde_json::from_value(value)
    }

    /// Looks up a top-level parameter by name.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|p| p.get(key))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Outgoing JSON-RPC response; exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: impl Into<JsonRpcError>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Empty `{}` result used by `ping` and `notifications/initialized`.
    pub fn empty(id: Value) -> Self {
        Self::ok(id, Value::Object(Map::new()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub plugin_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Picks the protocol version for an `initialize` exchange.
///
/// Echoes the client's version when supported, otherwise falls back to the
/// first (most preferred) entry of `supported`.
pub fn negotiate_version<'a>(requested: Option<&'a str>, supported: &'a [String]) -> &'a str {
    match requested {
        Some(version) if supported.iter().any(|v| v == version) => version,
        _ => supported.first().map(String::as_str).unwrap_or(PROTOCOL_V2025_03_26),
    }
}

/// Derives the owning plugin id from a namespaced tool name.
pub fn plugin_id_of(tool_name: &str) -> &str {
    match tool_name.split_once('/') {
        Some((prefix, _)) => prefix,
        None => "unknown",
    }
}
