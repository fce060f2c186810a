//! Service attach/remove tools.

use std::sync::Arc;

use k0rdent_clusters::{split_template_version, ServiceEntry};
use k0rdent_core::Result;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInput {
    template_namespace: String,
    template_name: String,
    service_name: Option<String>,
    values: Option<String>,
    values_from: Option<Value>,
    helm_options: Option<Value>,
    depends_on: Option<Vec<String>>,
    priority: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyInput {
    cluster_namespace: String,
    cluster_name: String,
    service: ServiceInput,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveInput {
    cluster_namespace: String,
    cluster_name: String,
    service_name: String,
    #[serde(default)]
    dry_run: bool,
}

impl ServiceInput {
    /// The service name defaults to the template name without its version
    /// suffix (`ingress-nginx-4-11-0` installs as `ingress-nginx`).
    fn into_entry(self) -> ServiceEntry {
        let name = self.service_name.unwrap_or_else(|| {
            split_template_version(&self.template_name)
                .map(|(base, _)| base.to_string())
                .unwrap_or_else(|| self.template_name.clone())
        });
        ServiceEntry {
            name,
            namespace: self.template_namespace,
            template: self.template_name,
            values: self.values,
            values_from: self.values_from,
            helm_options: self.helm_options,
            depends_on: self.depends_on,
            priority: self.priority,
        }
    }
}

pub async fn apply(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: ApplyInput = serde_json::from_value(args)?;
    let outcome = session
        .clusters
        .apply_service(
            &input.cluster_namespace,
            &input.cluster_name,
            input.service.into_entry(),
            input.dry_run,
        )
        .await?;
    Ok(serde_json::to_value(outcome)?)
}

pub async fn remove(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: RemoveInput = serde_json::from_value(args)?;
    let outcome = session
        .clusters
        .remove_service(
            &input.cluster_namespace,
            &input.cluster_name,
            &input.service_name,
            input.dry_run,
        )
        .await?;
    Ok(serde_json::to_value(outcome)?)
}
