//! Provider and credential tools: pure reads over the dynamic client.

use std::sync::Arc;

use k0rdent_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsInput {
    namespace: Option<String>,
    provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentitiesInput {
    provider: Option<String>,
}

pub async fn list(session: &Arc<Session>) -> Result<Value> {
    let providers: Vec<Value> = [
        k0rdent_clusters::CloudProvider::Aws,
        k0rdent_clusters::CloudProvider::Azure,
        k0rdent_clusters::CloudProvider::Gcp,
    ]
    .iter()
    .map(|p| {
        json!({
            "name": p.name(),
            "templatePrefix": p.template_prefix(),
        })
    })
    .collect();

    // enrich with what the management cluster actually has credentials for
    let credentials = session.clusters.list_credentials(None, None).await?;
    let with_credentials: Vec<Value> = providers
        .into_iter()
        .map(|mut p| {
            let name = p["name"].as_str().unwrap_or_default().to_string();
            let count = credentials.iter().filter(|c| c.provider == name).count();
            p["credentialCount"] = json!(count);
            p
        })
        .collect();

    Ok(json!({"providers": with_credentials}))
}

pub async fn list_credentials(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: CredentialsInput = serde_json::from_value(args)?;
    let credentials = session
        .clusters
        .list_credentials(input.namespace.as_deref(), input.provider.as_deref())
        .await?;
    Ok(json!({"credentials": credentials}))
}

pub async fn list_identities(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: IdentitiesInput = serde_json::from_value(args)?;
    let identities = session
        .clusters
        .list_identities(input.provider.as_deref())
        .await?;
    Ok(json!({"identities": identities}))
}
