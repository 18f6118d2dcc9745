//! Streamable HTTP transport handler for MCP
//!
//! One JSON-RPC request per `POST`, one JSON response back. There is no SSE
//! stream and no session.
//!
//! # URL Structure
//!
//! - `POST {path}` and `POST {path}/` - Send JSON-RPC request, receive JSON response
//! - Any other verb - `405 Method Not Allowed`
//!
//! # Usage
//!
//! ```http
//! POST /mcp
//! Content-Type: application/json
//! Authorization: Bearer <token>
//!
//! {"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18"}}
//! ```
//!
//! Response:
//! ```http
//! HTTP/1.1 200 OK
//! Content-Type: application/json
//! Cache-Control: no-store
//!
//! {"jsonrpc":"2.0","id":1,"result":{...}}
//! ```

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use http_body_util::LengthLimitError;
use tower_http::trace::TraceLayer;

use crate::mcp::protocol::PROTOCOL_VERSION_HEADER;
use crate::mcp::service::RequestMeta;
use crate::middleware::{add_no_store_header, mcp_access_middleware, require_post};
use crate::AppState;

/// Builds the router for the MCP endpoint.
///
/// Layers run outermost first: `Cache-Control: no-store`, the `POST`-only
/// check, then origin and bearer checks, then the handler.
pub fn mcp_router(state: AppState) -> Router {
    let path = state.config.path.clone();

    let mut router = Router::new().route(&path, any(handle_streamable_http));
    if path != "/" {
        router = router.route(&format!("{}/", path), any(handle_streamable_http));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mcp_access_middleware,
        ))
        .layer(middleware::from_fn(require_post))
        .layer(middleware::from_fn(add_no_store_header))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST {path} - Streamable HTTP transport
///
/// Reads the body up to the configured limit and hands it to the
/// dispatcher. The peer address, when the server was started with connect
/// info, becomes the client id in the call context.
///
/// # Returns
///
/// * `200 OK` with a JSON-RPC response, including JSON-RPC errors
/// * `400 Bad Request` with a `-32700` response when the body cannot be decoded
/// * `400 Bad Request` with no body when the request body fails mid-read
/// * `413 Payload Too Large` when the body exceeds the configured limit
pub async fn handle_streamable_http(State(state): State<AppState>, request: Request) -> Response {
    let client_id = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());
    let protocol_version = request
        .headers()
        .get(PROTOCOL_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = match axum::body::to_bytes(request.into_body(), state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(e) if exceeds_limit(&e) => {
            tracing::warn!(limit = state.config.max_body_bytes, "Request body exceeds limit");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    tracing::debug!(
        client = client_id.as_deref().unwrap_or("unknown"),
        bytes = body.len(),
        "Received HTTP transport request"
    );

    let dispatched = state
        .service
        .handle_body(
            &body,
            RequestMeta {
                client_id,
                protocol_version,
            },
        )
        .await;

    (dispatched.status, Json(dispatched.response)).into_response()
}

fn exceeds_limit(error: &axum::Error) -> bool {
    std::error::Error::source(error).is_some_and(|source| source.is::<LengthLimitError>())
}
