//! Bearer-token gate for the MCP endpoint.
//!
//! The gate enforces presence and well-formedness only. The token itself is
//! never verified here; it rides into the session's Kubernetes clients and
//! the API server performs the actual identity check.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use k0rdent_core::{AuthMode, Error, Result};
use serde_json::json;
use std::sync::Arc;

use crate::session::ServerState;

/// The token extracted from the originating request; `None` means an
/// anonymous dev-mode session.
#[derive(Debug, Clone)]
pub struct BearerToken(pub Option<String>);

/// Apply the mode policy to an `Authorization` header value.
pub fn extract_bearer(header: Option<&str>, mode: AuthMode) -> Result<Option<String>> {
    let Some(value) = header else {
        return match mode {
            AuthMode::DevAllowAny => Ok(None),
            AuthMode::OidcRequired => Err(Error::Unauthorized("bearer token required".into())),
        };
    };

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or_else(|| Error::Malformed("authorization header is not a bearer token".into()))?;
    if token.trim().is_empty() {
        return Err(Error::Malformed("bearer token is empty".into()));
    }
    Ok(Some(token.to_string()))
}

fn reject(err: Error) -> Response {
    let status = match err {
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::Malformed(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = Json(json!({
        "error": err.to_string(),
        "code": err.code(),
    }));
    (status, body).into_response()
}

/// Axum middleware in front of `/mcp`. Anything else (notably `/healthz`)
/// passes through untouched.
pub async fn bearer_gate(
    State(state): State<Arc<ServerState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !request.uri().path().starts_with("/mcp") {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match extract_bearer(header.as_deref(), state.settings.auth_mode) {
        Ok(token) => {
            request.extensions_mut().insert(BearerToken(token));
            next.run(request).await
        }
        Err(err) => reject(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_accepts_absent_header() {
        assert_eq!(extract_bearer(None, AuthMode::DevAllowAny).unwrap(), None);
    }

    #[test]
    fn oidc_mode_rejects_absent_header() {
        let err = extract_bearer(None, AuthMode::OidcRequired).unwrap_err();
        assert_eq!(err.code(), "unauthorized");
    }

    #[test]
    fn well_formed_token_is_forwarded_in_both_modes() {
        for mode in [AuthMode::DevAllowAny, AuthMode::OidcRequired] {
            let token = extract_bearer(Some("Bearer abc.def.ghi"), mode).unwrap();
            assert_eq!(token.as_deref(), Some("abc.def.ghi"));
        }
    }

    #[test]
    fn malformed_scheme_fails_in_both_modes() {
        for mode in [AuthMode::DevAllowAny, AuthMode::OidcRequired] {
            let err = extract_bearer(Some("Basic dXNlcjpwYXNz"), mode).unwrap_err();
            assert_eq!(err.code(), "malformed");
        }
    }

    #[test]
    fn empty_token_is_malformed() {
        let err = extract_bearer(Some("Bearer "), AuthMode::DevAllowAny).unwrap_err();
        assert_eq!(err.code(), "malformed");
        let err = extract_bearer(Some("Bearer    "), AuthMode::OidcRequired).unwrap_err();
        assert_eq!(err.code(), "malformed");
    }
}
