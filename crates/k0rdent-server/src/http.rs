//! HTTP surface: /healthz and the MCP streamable-HTTP endpoint.

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Json, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handler::K0rdentServer;
use crate::session::ServerState;

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": k0rdent_core::build_info(),
    }))
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let mcp_service = StreamableHttpService::new(
        {
            let state = Arc::clone(&state);
            move || Ok(K0rdentServer::new(Arc::clone(&state)))
        },
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    Router::new()
        .route("/healthz", get(healthz))
        .nest_service("/mcp", mcp_service)
        .layer(middleware::from_fn_with_state(state, auth::bearer_gate))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use k0rdent_core::Settings;
    use k0rdent_kube::{ClientFactory, NamespacePolicy};
    use tower::ServiceExt;

    fn test_state(auth_mode: &str) -> Arc<ServerState> {
        let settings = Settings::from_lookup(|key| match key {
            "AUTH_MODE" => Some(auth_mode.to_string()),
            _ => None,
        })
        .unwrap();
        let config = kube::Config::new("https://mgmt.example:6443".parse().unwrap());
        let catalog = Arc::new(k0rdent_catalog::CatalogClient::new());
        Arc::new(ServerState {
            factory: Arc::new(ClientFactory::from_config(config)),
            policy: Arc::new(NamespacePolicy::from_settings(&settings)),
            installer: Arc::new(k0rdent_catalog::Installer::new(
                k0rdent_catalog::HelmCli::new(),
                Arc::clone(&catalog),
            )),
            catalog,
            clock: Arc::new(k0rdent_core::SystemClock::new()),
            settings,
        })
    }

    /// A router with the real gate but a stub MCP endpoint, so the auth
    /// policy is exercised without a live transport.
    fn gated_router(state: Arc<ServerState>) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/mcp", post(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, auth::bearer_gate))
    }

    #[tokio::test]
    async fn healthz_reports_ok_and_version() {
        let router = gated_router(test_state("OIDC_REQUIRED"));
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"]["name"], k0rdent_core::SERVER_NAME);
    }

    #[tokio::test]
    async fn healthz_answers_head_requests() {
        let router = gated_router(test_state("OIDC_REQUIRED"));
        let response = router
            .oneshot(Request::head("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_is_not_gated() {
        // strict mode, no token: health must still answer
        let router = gated_router(test_state("OIDC_REQUIRED"));
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mcp_requires_bearer_in_oidc_mode() {
        let router = gated_router(test_state("OIDC_REQUIRED"));
        let response = router
            .oneshot(Request::post("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mcp_rejects_malformed_scheme_with_400() {
        let router = gated_router(test_state("DEV_ALLOW_ANY"));
        let response = router
            .oneshot(
                Request::post("/mcp")
                    .header("authorization", "Basic dXNlcjpwYXNz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn mcp_allows_anonymous_in_dev_mode() {
        let router = gated_router(test_state("DEV_ALLOW_ANY"));
        let response = router
            .oneshot(Request::post("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mcp_accepts_well_formed_bearer_in_oidc_mode() {
        let router = gated_router(test_state("OIDC_REQUIRED"));
        let response = router
            .oneshot(
                Request::post("/mcp")
                    .header("authorization", "Bearer token-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
