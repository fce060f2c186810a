//! Cluster deployment engine.
//!
//! Deploys are declarative: the engine builds the cluster deployment document
//! and submits it via server-side apply with a stable field owner and
//! `force=true`, then optionally polls for readiness. Deletes use foreground
//! propagation and are idempotent.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k0rdent_core::{Clock, Error, Result};
use k0rdent_kube::{map_kube_error, NamespacePolicy};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{self, K0RDENT_API_VERSION, MANAGED_LABEL};
use crate::providers::{CloudProvider, ProviderDeployInput, IDENTITY_KINDS};
use crate::summary::{summarize, ClusterSummary};
use crate::templates::{select_latest_template, summarize_template, TemplateScope, TemplateSummary};

/// Pacing for the optional readiness/deletion waits.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub stall_threshold: Duration,
}

impl WaitOptions {
    /// Provisioning defaults: poll 30 s, total 30 min, stall warning 10 min.
    pub fn provisioning() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(30 * 60),
            stall_threshold: Duration::from_secs(10 * 60),
        }
    }

    /// Deletion defaults: poll 60 s, total 20 min. Deletions routinely outlast
    /// provisioning, especially on Azure.
    pub fn deletion() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(20 * 60),
            stall_threshold: Duration::from_secs(10 * 60),
        }
    }

    pub fn with_overrides(
        mut self,
        poll_interval: Option<u64>,
        timeout: Option<u64>,
        stall_threshold: Option<u64>,
    ) -> Self {
        if let Some(secs) = poll_interval {
            self.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = timeout {
            self.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = stall_threshold {
            self.stall_threshold = Duration::from_secs(secs.max(1));
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleting,
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provider: String,
    pub identity_kind: String,
    pub identity_name: String,
    pub ready: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplateSummary {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub chart: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    pub ready: bool,
}

/// Per-session manager for everything cluster-deployment shaped.
pub struct ClusterManager {
    client: Client,
    policy: Arc<NamespacePolicy>,
    field_owner: String,
    clock: Arc<dyn Clock>,
}

impl ClusterManager {
    pub fn new(
        client: Client,
        policy: Arc<NamespacePolicy>,
        field_owner: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            policy,
            field_owner,
            clock,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    pub fn field_owner(&self) -> &str {
        &self.field_owner
    }

    fn apply_params(&self, dry_run: bool) -> PatchParams {
        let mut params = PatchParams::apply(&self.field_owner).force();
        params.dry_run = dry_run;
        params
    }

    pub async fn get_raw(&self, namespace: &str, name: &str) -> Result<Value> {
        let obj = api::cluster_deployments(&self.client, namespace)
            .get(name)
            .await
            .map_err(map_kube_error)?;
        serde_json::to_value(obj).map_err(|e| Error::internal(e.to_string()))
    }

    pub async fn get_summary(&self, namespace: &str, name: &str) -> Result<ClusterSummary> {
        let raw = self.get_raw(namespace, name).await?;
        Ok(summarize(&raw, self.clock.now()))
    }

    /// Cluster summaries across every allowed namespace. Namespaces the token
    /// cannot read are skipped rather than failing the whole listing.
    pub async fn list_summaries(&self, selector: Option<&str>) -> Result<Vec<ClusterSummary>> {
        let namespaces = self.policy.allowed_namespaces(&self.client).await?;
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            params = params.labels(selector);
        }

        let now = self.clock.now();
        let mut summaries = Vec::new();
        for namespace in namespaces {
            let listed = match api::cluster_deployments(&self.client, &namespace)
                .list(&params)
                .await
            {
                Ok(listed) => listed,
                Err(kube::Error::Api(resp)) if resp.code == 403 || resp.code == 404 => {
                    debug!("skipping namespace {namespace}: {}", resp.message);
                    continue;
                }
                Err(err) => return Err(map_kube_error(err)),
            };
            for obj in listed.items {
                if let Ok(raw) = serde_json::to_value(obj) {
                    summaries.push(summarize(&raw, now));
                }
            }
        }
        summaries.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(summaries)
    }

    /// Deploy (or re-apply) a cluster deployment from a validated provider
    /// input. Returns the post-apply summary; with `wait` the summary of the
    /// ready cluster.
    pub async fn deploy(
        &self,
        input: &ProviderDeployInput,
        cancel: &CancellationToken,
    ) -> Result<ClusterSummary> {
        let common = input.common();
        let namespace = self.policy.resolve(common.namespace.as_deref())?;

        let template = match &common.template {
            Some(template) => template.clone(),
            None => self.latest_template_for(input.provider()).await?,
        };

        let doc = build_deployment_doc(
            &common.name,
            &namespace,
            &template,
            &common.credential,
            input.build_config(),
        );

        info!(
            name = %common.name,
            namespace = %namespace,
            template = %template,
            provider = input.provider().name(),
            "applying cluster deployment"
        );
        let applied = api::cluster_deployments(&self.client, &namespace)
            .patch(&common.name, &self.apply_params(false), &Patch::Apply(&doc))
            .await
            .map_err(map_kube_error)?;

        if !common.wait {
            let raw = serde_json::to_value(applied).map_err(|e| Error::internal(e.to_string()))?;
            return Ok(summarize(&raw, self.clock.now()));
        }

        let opts = WaitOptions::provisioning().with_overrides(
            common.poll_interval,
            common.provision_timeout,
            common.stall_threshold,
        );
        self.wait_for_ready(&namespace, &common.name, opts, cancel).await
    }

    async fn latest_template_for(&self, provider: CloudProvider) -> Result<String> {
        let listed = api::cluster_templates(&self.client, self.policy.global_namespace())
            .list(&ListParams::default())
            .await
            .map_err(map_kube_error)?;
        let names: Vec<String> = listed
            .items
            .iter()
            .filter_map(|t| t.metadata.name.clone())
            .collect();
        select_latest_template(names.iter().map(String::as_str), provider.template_prefix())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no cluster template matching {:?} in namespace {:?}",
                    provider.template_prefix(),
                    self.policy.global_namespace()
                ))
            })
    }

    /// Poll until the Ready condition is True. A conditions snapshot that
    /// stays unchanged past the stall threshold produces a warning log, not a
    /// failure; only the overall timeout fails the wait.
    pub async fn wait_for_ready(
        &self,
        namespace: &str,
        name: &str,
        opts: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<ClusterSummary> {
        let started = Instant::now();
        let mut last_snapshot: Option<Value> = None;
        let mut last_change = Instant::now();
        let mut stall_logged = false;

        let mut ticker = tokio::time::interval(opts.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {}
            }

            let summary = self.get_summary(namespace, name).await?;
            if summary.ready {
                info!(name, namespace, "cluster deployment is ready");
                return Ok(summary);
            }

            let snapshot = serde_json::to_value(&summary.conditions).unwrap_or(Value::Null);
            if last_snapshot.as_ref() != Some(&snapshot) {
                last_snapshot = Some(snapshot);
                last_change = Instant::now();
                stall_logged = false;
            } else if last_change.elapsed() >= opts.stall_threshold && !stall_logged {
                warn!(
                    name,
                    namespace,
                    stalled_for_secs = last_change.elapsed().as_secs(),
                    phase = %summary.phase,
                    "cluster conditions have not changed; provisioning may be stalled"
                );
                stall_logged = true;
            }

            if started.elapsed() >= opts.timeout {
                return Err(Error::Timeout(format!(
                    "cluster deployment {namespace}/{name} was not ready within {}s",
                    opts.timeout.as_secs()
                )));
            }
        }
    }

    /// Foreground delete. Missing objects are success: the operation is
    /// idempotent by contract.
    pub async fn delete(
        &self,
        namespace: &str,
        name: &str,
        wait: bool,
        opts: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<DeleteStatus> {
        let api = api::cluster_deployments(&self.client, namespace);
        match api.delete(name, &DeleteParams::foreground()).await {
            Ok(_) => {}
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                return Ok(DeleteStatus::NotFound);
            }
            Err(err) => return Err(map_kube_error(err)),
        }

        if !wait {
            return Ok(DeleteStatus::Deleting);
        }
        self.wait_for_deletion(namespace, name, opts, cancel).await?;
        Ok(DeleteStatus::Deleted)
    }

    async fn wait_for_deletion(
        &self,
        namespace: &str,
        name: &str,
        opts: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(opts.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {}
            }

            match api::cluster_deployments(&self.client, namespace).get(name).await {
                Ok(_) => {}
                Err(kube::Error::Api(resp)) if resp.code == 404 => return Ok(()),
                Err(err) => return Err(map_kube_error(err)),
            }

            if started.elapsed() >= opts.timeout {
                return Err(Error::Timeout(format!(
                    "cluster deployment {namespace}/{name} was not deleted within {}s",
                    opts.timeout.as_secs()
                )));
            }
        }
    }

    /// Cluster templates by scope.
    pub async fn list_templates(&self, scope: TemplateScope) -> Result<Vec<TemplateSummary>> {
        let global = self.policy.global_namespace().to_string();
        let namespaces: Vec<String> = match scope {
            TemplateScope::Global => vec![global.clone()],
            TemplateScope::Local => self
                .policy
                .allowed_namespaces(&self.client)
                .await?
                .into_iter()
                .filter(|ns| ns != &global)
                .collect(),
            TemplateScope::All => self.policy.allowed_namespaces(&self.client).await?,
        };

        let mut templates = Vec::new();
        for namespace in namespaces {
            let listed = match api::cluster_templates(&self.client, &namespace)
                .list(&ListParams::default())
                .await
            {
                Ok(listed) => listed,
                Err(kube::Error::Api(resp)) if resp.code == 403 || resp.code == 404 => continue,
                Err(err) => return Err(map_kube_error(err)),
            };
            for obj in listed.items {
                if let Ok(raw) = serde_json::to_value(obj) {
                    templates.push(summarize_template(&raw));
                }
            }
        }
        templates.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(templates)
    }

    /// Installed service templates across allowed namespaces.
    pub async fn list_service_templates(&self) -> Result<Vec<ServiceTemplateSummary>> {
        let namespaces = self.policy.allowed_namespaces(&self.client).await?;
        let mut out = Vec::new();
        for namespace in namespaces {
            let listed = match api::service_templates(&self.client, &namespace)
                .list(&ListParams::default())
                .await
            {
                Ok(listed) => listed,
                Err(kube::Error::Api(resp)) if resp.code == 403 || resp.code == 404 => continue,
                Err(err) => return Err(map_kube_error(err)),
            };
            for obj in listed.items {
                let raw = match serde_json::to_value(obj) {
                    Ok(raw) => raw,
                    Err(_) => continue,
                };
                out.push(ServiceTemplateSummary {
                    name: raw
                        .pointer("/metadata/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    namespace: namespace.clone(),
                    chart: raw
                        .pointer("/status/chartRef/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    version: raw
                        .pointer("/status/chartVersion")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    ready: raw
                        .pointer("/status/valid")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
        }
        out.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(out)
    }

    /// Credential objects across allowed namespaces, optionally filtered by
    /// provider.
    pub async fn list_credentials(
        &self,
        namespace: Option<&str>,
        provider: Option<&str>,
    ) -> Result<Vec<CredentialSummary>> {
        let namespaces = match namespace {
            Some(ns) => vec![self.policy.resolve(Some(ns))?],
            None => self.policy.allowed_namespaces(&self.client).await?,
        };

        let mut out = Vec::new();
        for namespace in namespaces {
            let listed = match api::credentials(&self.client, &namespace)
                .list(&ListParams::default())
                .await
            {
                Ok(listed) => listed,
                Err(kube::Error::Api(resp)) if resp.code == 403 || resp.code == 404 => continue,
                Err(err) => return Err(map_kube_error(err)),
            };
            for obj in listed.items {
                let raw = match serde_json::to_value(obj) {
                    Ok(raw) => raw,
                    Err(_) => continue,
                };
                let identity_kind = raw
                    .pointer("/spec/identityRef/kind")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let summary = CredentialSummary {
                    name: raw
                        .pointer("/metadata/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    namespace: namespace.clone(),
                    provider: crate::summary::infer_cloud_provider(
                        &BTreeMap::new(),
                        &identity_kind,
                        raw.pointer("/metadata/name")
                            .and_then(Value::as_str)
                            .unwrap_or_default(),
                    ),
                    identity_name: raw
                        .pointer("/spec/identityRef/name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    identity_kind,
                    ready: raw
                        .pointer("/status/ready")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    description: raw
                        .pointer("/spec/description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                };
                if let Some(filter) = provider {
                    if !summary.provider.eq_ignore_ascii_case(filter) {
                        continue;
                    }
                }
                out.push(summary);
            }
        }
        out.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        Ok(out)
    }

    /// Provider identity objects. Providers whose CRDs are not installed on
    /// the management cluster are skipped.
    pub async fn list_identities(&self, provider: Option<&str>) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for kind in IDENTITY_KINDS {
            if let Some(filter) = provider {
                if !kind.provider.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            let api = api::dynamic_api(
                &self.client,
                kind.group,
                kind.version,
                kind.kind,
                kind.plural,
                None,
            );
            let listed = match api.list(&ListParams::default()).await {
                Ok(listed) => listed,
                Err(kube::Error::Api(resp)) if resp.code == 403 || resp.code == 404 => continue,
                Err(err) => return Err(map_kube_error(err)),
            };
            for obj in listed.items {
                out.push(json!({
                    "provider": kind.provider,
                    "kind": kind.kind,
                    "name": obj.metadata.name,
                    "namespace": obj.metadata.namespace,
                }));
            }
        }
        Ok(out)
    }
}

/// The exact server-side-apply payload for a deploy. `spec.credential` is a
/// bare string; the CRD contract rejects an object there.
pub fn build_deployment_doc(
    name: &str,
    namespace: &str,
    template: &str,
    credential: &str,
    config: Value,
) -> Value {
    json!({
        "apiVersion": K0RDENT_API_VERSION,
        "kind": "ClusterDeployment",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { MANAGED_LABEL: "true" }
        },
        "spec": {
            "template": template,
            "credential": credential,
            "config": config
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_doc_has_the_bit_exact_shape() {
        let doc = build_deployment_doc(
            "e2e-az",
            "kcm-system",
            "azure-standalone-cp-1-0-15",
            "azure-cluster-credential",
            json!({"location": "westus2"}),
        );

        assert_eq!(doc["apiVersion"], K0RDENT_API_VERSION);
        assert_eq!(doc["kind"], "ClusterDeployment");
        assert_eq!(doc["metadata"]["name"], "e2e-az");
        assert_eq!(doc["metadata"]["labels"][MANAGED_LABEL], "true");
        assert_eq!(doc["spec"]["template"], "azure-standalone-cp-1-0-15");
        // credential is a string, never an object
        assert!(doc["spec"]["credential"].is_string());
        assert_eq!(doc["spec"]["credential"], "azure-cluster-credential");
        assert_eq!(doc["spec"]["config"]["location"], "westus2");

        // nothing else sneaks into the payload
        let spec = doc["spec"].as_object().unwrap();
        assert_eq!(spec.len(), 3);
        let top = doc.as_object().unwrap();
        assert_eq!(top.len(), 4);
    }

    #[test]
    fn wait_options_overrides_apply() {
        let opts = WaitOptions::provisioning().with_overrides(Some(10), Some(120), None);
        assert_eq!(opts.poll_interval, Duration::from_secs(10));
        assert_eq!(opts.timeout, Duration::from_secs(120));
        assert_eq!(opts.stall_threshold, Duration::from_secs(600));
    }

    #[test]
    fn deletion_defaults_differ_from_provisioning() {
        let del = WaitOptions::deletion();
        assert_eq!(del.poll_interval, Duration::from_secs(60));
        assert_eq!(del.timeout, Duration::from_secs(20 * 60));
        let prov = WaitOptions::provisioning();
        assert_eq!(prov.poll_interval, Duration::from_secs(30));
        assert_eq!(prov.timeout, Duration::from_secs(30 * 60));
    }

    #[test]
    fn delete_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(DeleteStatus::NotFound).unwrap(),
            json!("not_found")
        );
        assert_eq!(
            serde_json::to_value(DeleteStatus::Deleting).unwrap(),
            json!("deleting")
        );
    }
}
