//! Service entry mutations on `spec.serviceSpec.services[]`.
//!
//! Both mutations compute the full replacement array locally and submit it in
//! a minimal document via server-side apply. Identity is the service `name`:
//! a same-named entry is merged field-by-field, a new one is appended, remove
//! filters. Index-based patching is deliberately avoided.

use k0rdent_core::{Error, Result};
use k0rdent_kube::map_kube_error;
use kube::api::Patch;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::api::{self, K0RDENT_API_VERSION};
use crate::deploy::ClusterManager;
use crate::summary::{summarize, ClusterSummary};

pub const SERVICE_ALREADY_REMOVED: &str = "service not found (already removed)";

/// One element of `spec.serviceSpec.services[]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_from: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Merge `incoming` into the array by name. An existing entry keeps its
/// position and any field the incoming entry leaves unset; a new entry lands
/// at the end. Returns the new array and whether an existing entry was
/// updated.
pub fn merge_service(mut services: Vec<ServiceEntry>, incoming: ServiceEntry) -> (Vec<ServiceEntry>, bool) {
    if let Some(existing) = services.iter_mut().find(|s| s.name == incoming.name) {
        existing.template = incoming.template;
        if !incoming.namespace.is_empty() {
            existing.namespace = incoming.namespace;
        }
        if incoming.values.is_some() {
            existing.values = incoming.values;
        }
        if incoming.values_from.is_some() {
            existing.values_from = incoming.values_from;
        }
        if incoming.helm_options.is_some() {
            existing.helm_options = incoming.helm_options;
        }
        if incoming.depends_on.is_some() {
            existing.depends_on = incoming.depends_on;
        }
        if incoming.priority.is_some() {
            existing.priority = incoming.priority;
        }
        (services, true)
    } else {
        services.push(incoming);
        (services, false)
    }
}

/// Filter the array by name. Returns the new array and the removed entry,
/// `None` when the name was not present.
pub fn remove_service(
    services: Vec<ServiceEntry>,
    name: &str,
) -> (Vec<ServiceEntry>, Option<ServiceEntry>) {
    let mut removed = None;
    let kept = services
        .into_iter()
        .filter_map(|entry| {
            if entry.name == name {
                removed = Some(entry);
                None
            } else {
                Some(entry)
            }
        })
        .collect();
    (kept, removed)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApplyOutcome {
    pub cluster: ClusterSummary,
    pub applied_service: ServiceEntry,
    pub updated_services: Vec<ServiceEntry>,
    pub updated_existing: bool,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRemoveOutcome {
    pub removed_service: Option<ServiceEntry>,
    pub updated_services: Vec<ServiceEntry>,
    pub message: String,
    pub dry_run: bool,
}

fn services_of(raw: &Value) -> Result<Vec<ServiceEntry>> {
    match raw.pointer("/spec/serviceSpec/services") {
        Some(services) => serde_json::from_value(services.clone())
            .map_err(|e| Error::internal(format!("malformed services array: {e}"))),
        None => Ok(Vec::new()),
    }
}

/// The minimal apply document: only identity plus the reduced serviceSpec, so
/// field ownership stays scoped to the services array.
fn build_services_doc(name: &str, namespace: &str, services: &[ServiceEntry]) -> Value {
    json!({
        "apiVersion": K0RDENT_API_VERSION,
        "kind": "ClusterDeployment",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {"serviceSpec": {"services": services}}
    })
}

impl ClusterManager {
    async fn patch_services(
        &self,
        namespace: &str,
        name: &str,
        services: &[ServiceEntry],
        dry_run: bool,
    ) -> Result<Value> {
        let doc = build_services_doc(name, namespace, services);
        let mut params = kube::api::PatchParams::apply(self.field_owner()).force();
        params.dry_run = dry_run;
        let applied = api::cluster_deployments(self.client(), namespace)
            .patch(name, &params, &Patch::Apply(&doc))
            .await
            .map_err(map_kube_error)?;
        serde_json::to_value(applied).map_err(|e| Error::internal(e.to_string()))
    }

    /// Add or update a service entry.
    pub async fn apply_service(
        &self,
        cluster_namespace: &str,
        cluster_name: &str,
        entry: ServiceEntry,
        dry_run: bool,
    ) -> Result<ServiceApplyOutcome> {
        if entry.name.is_empty() || entry.template.is_empty() {
            return Err(Error::invalid_params("service name and template are required"));
        }
        let namespace = self.policy().resolve(Some(cluster_namespace))?;
        let raw = self.get_raw(&namespace, cluster_name).await?;
        let current = services_of(&raw)?;

        let (updated, updated_existing) = merge_service(current, entry.clone());
        let applied = self
            .patch_services(&namespace, cluster_name, &updated, dry_run)
            .await?;

        info!(
            cluster = cluster_name,
            namespace = %namespace,
            service = %entry.name,
            updated_existing,
            dry_run,
            "applied service entry"
        );
        Ok(ServiceApplyOutcome {
            cluster: summarize(&applied, chrono::Utc::now()),
            updated_services: services_of(&applied)?,
            applied_service: entry,
            updated_existing,
            dry_run,
        })
    }

    /// Remove a service entry by name. Removing an absent entry is success.
    pub async fn remove_service(
        &self,
        cluster_namespace: &str,
        cluster_name: &str,
        service_name: &str,
        dry_run: bool,
    ) -> Result<ServiceRemoveOutcome> {
        let namespace = self.policy().resolve(Some(cluster_namespace))?;
        let raw = self.get_raw(&namespace, cluster_name).await?;
        let current = services_of(&raw)?;

        let (updated, removed) = remove_service(current, service_name);
        if removed.is_none() {
            return Ok(ServiceRemoveOutcome {
                removed_service: None,
                updated_services: updated,
                message: SERVICE_ALREADY_REMOVED.to_string(),
                dry_run,
            });
        }

        let applied = self
            .patch_services(&namespace, cluster_name, &updated, dry_run)
            .await?;
        info!(
            cluster = cluster_name,
            namespace = %namespace,
            service = service_name,
            dry_run,
            "removed service entry"
        );
        Ok(ServiceRemoveOutcome {
            removed_service: removed,
            updated_services: services_of(&applied)?,
            message: format!("service {service_name:?} removed"),
            dry_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, template: &str) -> ServiceEntry {
        ServiceEntry {
            name: name.to_string(),
            template: template.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn new_entry_is_appended_at_the_end() {
        let existing = vec![entry("ingress", "ingress-1-0-0"), entry("cert", "cert-1-0-0")];
        let (merged, updated) = merge_service(existing, entry("dex", "dex-0-1-0"));
        assert!(!updated);
        let names: Vec<&str> = merged.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ingress", "cert", "dex"]);
    }

    #[test]
    fn same_name_merges_in_place_and_keeps_order() {
        let existing = vec![
            ServiceEntry {
                values: Some("replicaCount: 1\n".into()),
                priority: Some(10),
                ..entry("ingress", "ingress-1-0-0")
            },
            entry("cert", "cert-1-0-0"),
        ];
        let incoming = ServiceEntry {
            values: Some("replicaCount: 3\n".into()),
            ..entry("ingress", "ingress-1-1-0")
        };
        let (merged, updated) = merge_service(existing, incoming);
        assert!(updated);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "ingress");
        assert_eq!(merged[0].template, "ingress-1-1-0");
        assert_eq!(merged[0].values.as_deref(), Some("replicaCount: 3\n"));
        // a field the incoming entry left unset survives
        assert_eq!(merged[0].priority, Some(10));
        assert_eq!(merged[1].name, "cert");
    }

    #[test]
    fn merge_never_produces_duplicate_names() {
        let (merged, _) = merge_service(
            vec![entry("a", "a-1-0-0"), entry("b", "b-1-0-0")],
            entry("a", "a-2-0-0"),
        );
        let mut names: Vec<&str> = merged.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), merged.len());
    }

    #[test]
    fn remove_filters_by_name() {
        let services = vec![entry("ingress", "ingress-1-1-0"), entry("cert", "cert-1-0-0")];
        let (kept, removed) = remove_service(services, "ingress");
        assert_eq!(removed.unwrap().template, "ingress-1-1-0");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "cert");
    }

    #[test]
    fn remove_absent_yields_none_both_times() {
        let services = vec![entry("cert", "cert-1-0-0")];
        let (kept, removed) = remove_service(services, "ingress");
        assert!(removed.is_none());
        let (kept, removed) = remove_service(kept, "ingress");
        assert!(removed.is_none());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn services_doc_carries_only_identity_and_service_spec() {
        let doc = build_services_doc("demo", "kcm-system", &[entry("ingress", "ingress-1-1-0")]);
        assert_eq!(doc["apiVersion"], K0RDENT_API_VERSION);
        assert_eq!(doc["kind"], "ClusterDeployment");
        assert_eq!(doc["metadata"]["name"], "demo");
        assert_eq!(doc["metadata"]["namespace"], "kcm-system");
        assert_eq!(doc["metadata"].as_object().unwrap().len(), 2);
        assert_eq!(doc["spec"].as_object().unwrap().len(), 1);
        assert_eq!(doc["spec"]["serviceSpec"]["services"][0]["name"], "ingress");
    }

    #[test]
    fn entry_serializes_without_unset_fields() {
        let value = serde_json::to_value(entry("ingress", "ingress-1-0-0")).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("template"));
    }
}
