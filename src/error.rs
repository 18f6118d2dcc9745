use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::any::Any;
use thiserror::Error;

use crate::mcp::protocol::{
    JsonRpcError, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};

/// Realm advertised in the `WWW-Authenticate` challenge.
pub const AUTH_REALM: &str = "RimBridgeServer";

/// Error types for MCP request dispatch
///
/// Every failure that happens after the transport has accepted a request
/// ends up as one of these variants and is rendered as a JSON-RPC error
/// object. Nothing here tears down the connection.
///
/// | McpServiceError Variant | JSON-RPC code | Reason                               |
/// |-------------------------|---------------|--------------------------------------|
/// | Parse                   | -32700        | Body is not a JSON-RPC request       |
/// | MethodNotFound          | -32601        | Unknown `method`                     |
/// | InvalidParams           | -32602        | Missing/invalid params, unknown tool |
/// | Internal                | -32603        | Tool failure or unexpected error     |
#[derive(Debug, Error)]
pub enum McpServiceError {
    #[error("Parse error")]
    Parse,

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("{0}")]
    InvalidParams(String),

    /// Carries a diagnostic detail that is attached as `error.data.detail`.
    #[error("Internal error")]
    Internal { detail: String },
}

impl McpServiceError {
    pub fn internal(detail: impl Into<String>) -> Self {
        McpServiceError::Internal {
            detail: detail.into(),
        }
    }
}

impl From<McpServiceError> for JsonRpcError {
    fn from(err: McpServiceError) -> Self {
        let message = err.to_string();
        match err {
            McpServiceError::Parse => JsonRpcError::new(PARSE_ERROR, message),
            McpServiceError::MethodNotFound(_) => JsonRpcError::new(METHOD_NOT_FOUND, message),
            McpServiceError::InvalidParams(_) => JsonRpcError::new(INVALID_PARAMS, message),
            McpServiceError::Internal { detail } => {
                JsonRpcError::new(INTERNAL_ERROR, message).with_data(json!({ "detail": detail }))
            }
        }
    }
}

/// Transport-level rejections
///
/// These are produced by the middleware stack before the body is read, so
/// they never carry a JSON-RPC payload; only a status code (and, for 401,
/// the bearer challenge).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Only POST is accepted on the MCP endpoint")]
    MethodNotAllowed,

    #[error("Origin is not allowed: {0}")]
    ForbiddenOrigin(String),

    #[error("Authorization header is required")]
    MissingAuthorizationHeader,

    #[error("Authorization header must be 'Bearer <token>'")]
    InvalidAuthorizationFormat,

    #[error("Invalid access token")]
    InvalidToken,
}

impl AccessError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccessError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AccessError::ForbiddenOrigin(_) => StatusCode::FORBIDDEN,
            AccessError::MissingAuthorizationHeader
            | AccessError::InvalidAuthorizationFormat
            | AccessError::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = status.into_response();

        if status == StatusCode::UNAUTHORIZED {
            let challenge = format!(r#"Bearer realm="{}""#, AUTH_REALM);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}

/// Renders a caught panic payload for logging.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
