//! The MCP server handler.
//!
//! One handler instance per transport session. The session's bearer token is
//! recovered from the HTTP request parts the transport stashes in the request
//! context, so the auth gate's decision travels with every call.

use std::sync::Arc;
use std::time::Instant;

use k0rdent_core::Error;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, Implementation, InitializeRequestParam,
    InitializeResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam,
    ReadResourceRequestParam, ReadResourceResult, ResourceContents, ResourcesCapability,
    ServerCapabilities, ServerInfo, SubscribeRequestParam, ToolsCapability, UnsubscribeRequestParam,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::auth::{extract_bearer, BearerToken};
use crate::session::{ServerState, Session, SessionRuntime};
use crate::tools;

const INSTRUCTIONS: &str = "Manage k0rdent cluster deployments, service templates and the add-on \
catalog. Subscribe to k0rdent://events/<namespace>, \
k0rdent://podlogs/<namespace>/<pod>/<container> or \
k0rdent://cluster-monitor/<namespace>/<name> for live updates.";

pub struct K0rdentServer {
    state: Arc<ServerState>,
    runtime: SessionRuntime,
    session: RwLock<Option<Arc<Session>>>,
}

impl K0rdentServer {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            runtime: SessionRuntime::new(Arc::clone(&state)),
            state,
            session: RwLock::new(None),
        }
    }

    fn to_mcp_error(err: &Error) -> McpError {
        let code = match err {
            Error::InvalidParams(_) | Error::Malformed(_) => ErrorCode::INVALID_PARAMS,
            Error::NotFound(_) => ErrorCode::RESOURCE_NOT_FOUND,
            Error::Unauthorized(_) | Error::Forbidden(_) => ErrorCode::INVALID_REQUEST,
            _ => ErrorCode::INTERNAL_ERROR,
        };
        McpError::new(code, err.to_string(), Some(json!({"code": err.code()})))
    }

    /// Recover the bearer token for this request. The gate middleware leaves
    /// a `BearerToken` in the request extensions; when the transport did not
    /// pass through HTTP the raw header policy applies directly.
    fn token_from_context(&self, context: &RequestContext<RoleServer>) -> Result<Option<String>, Error> {
        let Some(parts) = context.extensions.get::<axum::http::request::Parts>() else {
            return extract_bearer(None, self.state.settings.auth_mode);
        };
        if let Some(BearerToken(token)) = parts.extensions.get::<BearerToken>() {
            return Ok(token.clone());
        }
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        extract_bearer(header, self.state.settings.auth_mode)
    }

    /// The session for this handler, created on first use.
    async fn session(&self, context: &RequestContext<RoleServer>) -> Result<Arc<Session>, McpError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(Arc::clone(session));
        }
        let token = self
            .token_from_context(context)
            .map_err(|e| Self::to_mcp_error(&e))?;
        let session = self
            .runtime
            .open_session(token)
            .await
            .map_err(|e| Self::to_mcp_error(&e))?;
        *self.session.write().await = Some(Arc::clone(&session));
        Ok(session)
    }
}

impl ServerHandler for K0rdentServer {
    async fn initialize(
        &self,
        request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!(
            client = %request.client_info.name,
            version = %request.client_info.version,
            "mcp session initializing"
        );
        // the session-init hook: a failed client build fails initialization
        self.session(&context).await?;
        Ok(self.get_info())
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session(&context).await?;
        let args = Value::Object(request.arguments.unwrap_or_default());
        let tool = request.name.to_string();

        let started = Instant::now();
        let result = tools::dispatch(&self.state, &session, &tool, args, context.ct.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(tool = %tool, elapsed_ms, "tool call succeeded");
                let text = serde_json::to_string_pretty(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(err) => {
                warn!(tool = %tool, elapsed_ms, "tool call failed: {err}");
                Err(Self::to_mcp_error(&err))
            }
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            next_cursor: None,
            tools: tools::mcp_tools(),
        })
    }

    async fn subscribe(
        &self,
        request: SubscribeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<(), McpError> {
        let session = self.session(&context).await?;
        session
            .subscriptions
            .subscribe(&session, &request.uri, context.peer.clone())
            .await
            .map_err(|e| Self::to_mcp_error(&e))
    }

    async fn unsubscribe(
        &self,
        request: UnsubscribeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<(), McpError> {
        let session = self.session(&context).await?;
        session
            .subscriptions
            .unsubscribe(&request.uri)
            .await
            .map_err(|e| Self::to_mcp_error(&e))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let session = self.session(&context).await?;
        let payload = session.subscriptions.latest(&request.uri).await.ok_or_else(|| {
            McpError::resource_not_found(
                format!("no updates published on {:?} yet", request.uri),
                None,
            )
        })?;
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        // resources are dynamic subscription URIs; nothing to enumerate
        Ok(ListResourcesResult {
            resources: Vec::new(),
            next_cursor: None,
        })
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability {
                    subscribe: Some(true),
                    list_changed: None,
                }),
                ..Default::default()
            },
            server_info: Implementation {
                name: k0rdent_core::SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }
}

impl Drop for K0rdentServer {
    fn drop(&mut self) {
        // transport session closed: tear down producers
        if let Some(session) = self.session.get_mut().take() {
            session.subscriptions.shutdown();
        }
    }
}
