//! Cluster deployment tools: listing, state, provider deploys and delete.

use std::sync::Arc;

use k0rdent_clusters::{
    CloudProvider, DeleteStatus, ProviderDeployInput, TemplateScope, WaitOptions,
};
use k0rdent_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
struct TemplatesInput {
    #[serde(default)]
    scope: TemplateScope,
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListAllInput {
    selector: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetStateInput {
    name: String,
    namespace: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteInput {
    name: String,
    namespace: Option<String>,
    #[serde(default)]
    wait: bool,
    poll_interval: Option<u64>,
    deletion_timeout: Option<u64>,
}

pub async fn list_templates(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: TemplatesInput = serde_json::from_value(args)?;
    let mut templates = session.clusters.list_templates(input.scope).await?;
    if let Some(namespace) = input.namespace {
        let namespace = session.policy.resolve(Some(&namespace))?;
        templates.retain(|t| t.namespace == namespace);
    }
    Ok(json!({"templates": templates}))
}

pub async fn list(session: &Arc<Session>) -> Result<Value> {
    let clusters = session.clusters.list_summaries(None).await?;
    Ok(json!({"clusters": clusters}))
}

pub async fn list_all(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: ListAllInput = serde_json::from_value(args)?;
    let clusters = session
        .clusters
        .list_summaries(input.selector.as_deref())
        .await?;
    Ok(json!({"clusters": clusters}))
}

pub async fn get_state(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: GetStateInput = serde_json::from_value(args)?;
    let namespace = session.policy.resolve(Some(&input.namespace))?;
    let raw = session.clusters.get_raw(&namespace, &input.name).await?;
    let summary = k0rdent_clusters::summarize(&raw, session.clock.now());

    let services = raw
        .pointer("/spec/serviceSpec/services")
        .cloned()
        .unwrap_or_else(|| json!([]));
    let service_states = raw
        .pointer("/status/services")
        .cloned()
        .unwrap_or_else(|| json!([]));

    Ok(json!({
        "cluster": summary,
        "services": services,
        "serviceStates": service_states,
    }))
}

pub async fn deploy(
    session: &Arc<Session>,
    provider: CloudProvider,
    args: Value,
    cancel: CancellationToken,
) -> Result<Value> {
    let input = ProviderDeployInput::parse(provider, args)?;
    let summary = session.clusters.deploy(&input, &cancel).await?;
    Ok(json!({"cluster": summary}))
}

pub async fn delete(session: &Arc<Session>, args: Value, cancel: CancellationToken) -> Result<Value> {
    let input: DeleteInput = serde_json::from_value(args)?;
    let namespace = session.policy.resolve(input.namespace.as_deref())?;
    let opts = WaitOptions::deletion().with_overrides(input.poll_interval, input.deletion_timeout, None);
    let status: DeleteStatus = session
        .clusters
        .delete(&namespace, &input.name, input.wait, opts, &cancel)
        .await?;
    Ok(json!({"status": status}))
}
