use crate::{config::ServerConfig, error::AccessError, AppState};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};

/// How a request got past the bearer check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Token presented and matched.
    Verified,
    /// A token exists but enforcement is switched off.
    NotEnforced,
    /// No token configured at all; the endpoint is open.
    Unauthenticated,
}

/// Rejects anything but `POST` with 405.
pub async fn require_post(request: Request, next: Next) -> Result<Response, AccessError> {
    if request.method() != Method::POST {
        tracing::debug!(method = %request.method(), "Rejecting non-POST request");
        return Err(AccessError::MethodNotAllowed);
    }

    Ok(next.run(request).await)
}

/// Checks the `Origin` header against the allowed prefixes.
///
/// A missing or empty header passes, since non-browser clients do not send
/// one. Otherwise the origin must start with one of `allowed`, compared
/// ASCII case-insensitively.
pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), AccessError> {
    let Some(value) = headers.get(header::ORIGIN) else {
        return Ok(());
    };

    let origin = value
        .to_str()
        .map_err(|_| AccessError::ForbiddenOrigin(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;

    if origin.is_empty() || allowed.iter().any(|prefix| starts_with_ignore_case(origin, prefix)) {
        Ok(())
    } else {
        Err(AccessError::ForbiddenOrigin(origin.to_string()))
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AccessError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AccessError::MissingAuthorizationHeader)?
        .to_str()
        .map_err(|_| AccessError::InvalidAuthorizationFormat)?;

    auth_header
        .strip_prefix("Bearer ")
        .ok_or(AccessError::InvalidAuthorizationFormat)
}

/// Verifies the bearer token when enforcement is on.
///
/// The presented token must equal the configured one exactly.
pub fn check_bearer(headers: &HeaderMap, config: &ServerConfig) -> Result<AuthOutcome, AccessError> {
    if !config.require_bearer_token {
        return Ok(if config.token_configured() {
            AuthOutcome::NotEnforced
        } else {
            AuthOutcome::Unauthenticated
        });
    }

    let expected = config
        .static_bearer_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AccessError::InvalidToken)?;

    if extract_bearer_token(headers)? == expected {
        Ok(AuthOutcome::Verified)
    } else {
        Err(AccessError::InvalidToken)
    }
}

/// Origin and bearer checks for the MCP endpoint
///
/// Runs after [`require_post`] and before the body is read. Rejections are
/// logged at warn and answered with a bare 403 or a 401 challenge.
pub async fn mcp_access_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let headers = request.headers();

    if let Err(err) = check_origin(headers, &state.config.allowed_origins) {
        tracing::warn!(error = %err, "Rejected request from disallowed origin");
        return Err(err);
    }

    match check_bearer(headers, &state.config) {
        Ok(AuthOutcome::Unauthenticated) => {
            tracing::warn!("Serving unauthenticated MCP request: no bearer token configured");
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(error = %err, "Rejected request with missing or invalid bearer token");
            return Err(err);
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{config_with_token, post_json, rpc_body, test_router};
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    fn origins() -> Vec<String> {
        ServerConfig::default().allowed_origins
    }

    fn headers_with(name: header::HeaderName, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_missing_or_empty_origin_passes() {
        assert_eq!(check_origin(&HeaderMap::new(), &origins()), Ok(()));
        assert_eq!(
            check_origin(&headers_with(header::ORIGIN, ""), &origins()),
            Ok(())
        );
    }

    #[test]
    fn test_origin_prefix_match_is_case_insensitive() {
        for origin in ["null", "file:///tmp/page.html", "APP://renderer", "App://x"] {
            assert_eq!(
                check_origin(&headers_with(header::ORIGIN, origin), &origins()),
                Ok(()),
                "{} should pass",
                origin
            );
        }
    }

    #[test]
    fn test_foreign_origin_is_forbidden() {
        let result = check_origin(&headers_with(header::ORIGIN, "https://evil.example"), &origins());
        assert_eq!(
            result,
            Err(AccessError::ForbiddenOrigin("https://evil.example".into()))
        );

        // Shorter than every allowed prefix.
        assert!(check_origin(&headers_with(header::ORIGIN, "ap"), &origins()).is_err());
    }

    #[test]
    fn test_bearer_not_required_reports_posture() {
        let open = ServerConfig::default();
        assert_eq!(
            check_bearer(&HeaderMap::new(), &open),
            Ok(AuthOutcome::Unauthenticated)
        );

        let relaxed = ServerConfig {
            static_bearer_token: Some("secret".into()),
            ..ServerConfig::default()
        };
        assert_eq!(
            check_bearer(&HeaderMap::new(), &relaxed),
            Ok(AuthOutcome::NotEnforced)
        );
    }

    #[test]
    fn test_bearer_required() {
        let config = ServerConfig {
            require_bearer_token: true,
            static_bearer_token: Some("secret".into()),
            ..ServerConfig::default()
        };

        assert_eq!(
            check_bearer(&HeaderMap::new(), &config),
            Err(AccessError::MissingAuthorizationHeader)
        );
        assert_eq!(
            check_bearer(&headers_with(header::AUTHORIZATION, "Basic abc"), &config),
            Err(AccessError::InvalidAuthorizationFormat)
        );
        assert_eq!(
            check_bearer(&headers_with(header::AUTHORIZATION, "Bearer wrong"), &config),
            Err(AccessError::InvalidToken)
        );
        assert_eq!(
            check_bearer(&headers_with(header::AUTHORIZATION, "Bearer secret "), &config),
            Err(AccessError::InvalidToken)
        );
        assert_eq!(
            check_bearer(&headers_with(header::AUTHORIZATION, "Bearer secret"), &config),
            Ok(AuthOutcome::Verified)
        );
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Sends one ping through the full router and returns what was logged.
    async fn logs_for_ping(config: ServerConfig, authorization: Option<&'static str>) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let (app, _drain) = test_router(config, vec![]);
        let mut request = post_json("/mcp", &rpc_body(json!(1), "ping", None));
        if let Some(value) = authorization {
            request
                .headers_mut()
                .insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        }
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        logs.contents()
    }

    #[tokio::test]
    async fn test_unauthenticated_request_is_logged_at_warn() {
        let logs = logs_for_ping(ServerConfig::default(), None).await;

        let line = logs
            .lines()
            .find(|line| line.contains("Serving unauthenticated MCP request"))
            .unwrap_or_else(|| panic!("no warning in captured logs:\n{}", logs));
        assert!(line.contains("WARN"));
    }

    #[tokio::test]
    async fn test_verified_request_is_not_flagged_unauthenticated() {
        let logs = logs_for_ping(config_with_token("secret"), Some("Bearer secret")).await;

        assert!(!logs.contains("Serving unauthenticated MCP request"));
    }
}
