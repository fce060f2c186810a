//! Catalog listing and the Helm-backed install/delete tools.

use std::sync::Arc;

use k0rdent_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::{ServerState, Session};

#[derive(Debug, Default, Deserialize)]
struct CatalogListInput {
    app: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallInput {
    app: String,
    template: String,
    version: String,
    namespace: Option<String>,
    #[serde(default)]
    all_namespaces: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteInput {
    name: String,
    namespace: Option<String>,
    #[serde(default)]
    all_namespaces: bool,
}

async fn target_namespaces(
    session: &Arc<Session>,
    namespace: Option<&str>,
    all_namespaces: bool,
) -> Result<Vec<String>> {
    if all_namespaces {
        session.policy.allowed_namespaces(&session.client).await
    } else {
        Ok(vec![session.policy.resolve(namespace)?])
    }
}

pub async fn list_catalog(state: &Arc<ServerState>, args: Value) -> Result<Value> {
    let input: CatalogListInput = serde_json::from_value(args)?;
    let entries = state.catalog.list(input.app.as_deref()).await?;
    Ok(json!({"entries": entries}))
}

pub async fn list_installed(session: &Arc<Session>) -> Result<Value> {
    let templates = session.clusters.list_service_templates().await?;
    Ok(json!({"serviceTemplates": templates}))
}

pub async fn install(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    args: Value,
) -> Result<Value> {
    let input: InstallInput = serde_json::from_value(args)?;
    let namespaces =
        target_namespaces(session, input.namespace.as_deref(), input.all_namespaces).await?;
    let results = state
        .installer
        .install(&input.app, &input.template, &input.version, &namespaces)
        .await?;
    Ok(json!({"results": results}))
}

pub async fn delete(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    args: Value,
) -> Result<Value> {
    let input: DeleteInput = serde_json::from_value(args)?;
    let namespaces =
        target_namespaces(session, input.namespace.as_deref(), input.all_namespaces).await?;
    let results = state.installer.uninstall(&input.name, &namespaces).await?;
    Ok(json!({"results": results}))
}
