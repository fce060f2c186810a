//! Catalog-driven service template installation.
//!
//! Installation is idempotent by construction (`helm upgrade --install`),
//! with one piece of recovery: a release whose latest revision is stuck in a
//! `pending-*` state is rolled back to its last good revision first, so a
//! wedged orchestrator cannot wedge the server.

use std::sync::Arc;

use k0rdent_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::catalog::{CatalogChart, CatalogClient};
use crate::helm::{pending_rollback_target, HelmCli};

/// The kgst ("k0rdent ghcr service template") chart wraps a catalog chart
/// into ServiceTemplate + HelmRepository objects on the management cluster.
pub const KGST_CHART_REF: &str = "oci://ghcr.io/k0rdent/catalog/charts/kgst";
pub const KGST_CHART_VERSION: &str = "1.0.0";
pub const CHARTS_REPO_URL: &str = "oci://ghcr.io/k0rdent/catalog/charts";
pub const K0RDENT_API_VERSION_VALUE: &str = "v1beta1";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub version: i64,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub chart: String,
}

/// Per-namespace install result; multi-namespace installs surface one entry
/// per namespace instead of hiding partial effects.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub namespace: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceRef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallOutcome {
    pub namespace: String,
    pub status: String,
}

/// The values document fed to the kgst chart on stdin.
pub fn build_values(template: &str, version: &str, namespace: &str) -> Value {
    json!({
        "chart": format!("{template}:{version}"),
        "repo": {
            "spec": {
                "url": CHARTS_REPO_URL,
                "type": "oci"
            }
        },
        "namespace": namespace,
        "k0rdentApiVersion": K0RDENT_API_VERSION_VALUE
    })
}

/// Flatten a multi-document manifest into `namespace/kind/name` refs.
pub fn parse_manifest_resources(manifest: &str, default_namespace: &str) -> Vec<ResourceRef> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let Ok(value) = serde_yaml::Value::deserialize(document) else {
            continue;
        };
        let kind = value
            .get("kind")
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default();
        let name = value
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default();
        if kind.is_empty() || name.is_empty() {
            continue;
        }
        let namespace = value
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or(default_namespace);
        resources.push(ResourceRef {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
    resources
}

pub struct Installer {
    helm: HelmCli,
    catalog: Arc<CatalogClient>,
}

impl Installer {
    pub fn new(helm: HelmCli, catalog: Arc<CatalogClient>) -> Self {
        Self { helm, catalog }
    }

    /// Resolve `(app, template, version)` against the catalog, verifying the
    /// referenced service template file actually exists upstream. Failing
    /// here is cheap; failing inside helm costs a five-minute timeout.
    async fn resolve_chart(&self, app: &str, template: &str, version: &str) -> Result<CatalogChart> {
        let entry = self
            .catalog
            .find(app)
            .await?
            .ok_or_else(|| Error::NotFound(format!("catalog app {app:?} does not exist")))?;
        let chart = entry
            .service_templates
            .iter()
            .find(|c| c.chart_name == template && c.version == version)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "app {app:?} has no chart {template:?} at version {version:?}"
                ))
            })?;
        self.catalog.fetch_raw(&chart.service_template_path).await?;
        Ok(chart)
    }

    /// Install a catalog chart into each target namespace. Namespaces are
    /// resolved by the caller's policy and are never created here.
    pub async fn install(
        &self,
        app: &str,
        template: &str,
        version: &str,
        namespaces: &[String],
    ) -> Result<Vec<InstallOutcome>> {
        let chart = self.resolve_chart(app, template, version).await?;

        let mut outcomes = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            let outcome = match self.install_into(&chart, namespace).await {
                Ok((release, resources)) => InstallOutcome {
                    namespace: namespace.clone(),
                    success: true,
                    error: None,
                    release: Some(release),
                    resources,
                },
                Err(err) => {
                    warn!(app, template, %namespace, "install failed: {err}");
                    InstallOutcome {
                        namespace: namespace.clone(),
                        success: false,
                        error: Some(err.to_string()),
                        release: None,
                        resources: Vec::new(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn install_into(
        &self,
        chart: &CatalogChart,
        namespace: &str,
    ) -> Result<(ReleaseInfo, Vec<ResourceRef>)> {
        let release = chart.chart_name.as_str();

        // stuck-release recovery before touching the release again
        let history = self.helm.history(release, namespace).await?;
        if let Some(revision) = pending_rollback_target(&history) {
            info!(
                release,
                namespace, revision, "rolling back stuck pending release before upgrade"
            );
            self.helm.rollback(release, revision, namespace).await?;
        }

        let chart_ref = format!("{KGST_CHART_REF}:{KGST_CHART_VERSION}");
        let values = build_values(&chart.chart_name, &chart.version, namespace);
        self.helm
            .upgrade_install(release, &chart_ref, namespace, &values)
            .await?;

        let status = self.helm.status(release, namespace).await?;
        let manifest = self.helm.get_manifest(release, namespace).await?;
        let latest_chart = self
            .helm
            .history(release, namespace)
            .await?
            .into_iter()
            .max_by_key(|e| e.revision)
            .map(|e| e.chart)
            .unwrap_or_default();

        Ok((
            ReleaseInfo {
                name: release.to_string(),
                namespace: namespace.to_string(),
                version: status.get("version").and_then(Value::as_i64).unwrap_or(0),
                status: status
                    .pointer("/info/status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                chart: latest_chart,
            },
            parse_manifest_resources(&manifest, namespace),
        ))
    }

    /// Uninstall a release from each target namespace. Absent releases are
    /// reported as `not_found`, not errors.
    pub async fn uninstall(
        &self,
        release: &str,
        namespaces: &[String],
    ) -> Result<Vec<UninstallOutcome>> {
        let mut outcomes = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            let status = match self.helm.uninstall(release, namespace).await {
                Ok(true) => "uninstalled",
                Ok(false) => "not_found",
                Err(err) => {
                    warn!(release, %namespace, "uninstall failed: {err}");
                    outcomes.push(UninstallOutcome {
                        namespace: namespace.clone(),
                        status: format!("error: {err}"),
                    });
                    continue;
                }
            };
            outcomes.push(UninstallOutcome {
                namespace: namespace.clone(),
                status: status.to_string(),
            });
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_document_shape() {
        let values = build_values("ingress-nginx", "4.11.0", "team-a");
        assert_eq!(values["chart"], "ingress-nginx:4.11.0");
        assert_eq!(values["repo"]["spec"]["url"], CHARTS_REPO_URL);
        assert_eq!(values["repo"]["spec"]["type"], "oci");
        assert_eq!(values["namespace"], "team-a");
        assert_eq!(values["k0rdentApiVersion"], "v1beta1");
    }

    #[test]
    fn manifest_resources_are_flattened() {
        let manifest = r#"---
apiVersion: k0rdent.mirantis.com/v1beta1
kind: ServiceTemplate
metadata:
  name: ingress-nginx-4-11-0
---
apiVersion: source.toolkit.fluxcd.io/v1
kind: HelmRepository
metadata:
  name: k0rdent-catalog
  namespace: flux-system
"#;
        let resources = parse_manifest_resources(manifest, "team-a");
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, "ServiceTemplate");
        assert_eq!(resources[0].name, "ingress-nginx-4-11-0");
        // documents without an explicit namespace inherit the install target
        assert_eq!(resources[0].namespace, "team-a");
        assert_eq!(resources[1].namespace, "flux-system");
    }

    #[test]
    fn manifest_parsing_skips_incomplete_documents() {
        let manifest = "---\nkind: ConfigMap\n---\njust: noise\n";
        let resources = parse_manifest_resources(manifest, "ns");
        assert!(resources.is_empty());
    }
}
