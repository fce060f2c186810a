//! Cluster deployment summarization.
//!
//! Tools never return raw cluster deployment objects; they return this
//! summary shape, extracted leniently from the dynamic object so missing
//! status blocks or partially-populated specs still produce usable output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Providers this server recognizes when inferring the cloud from names.
const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("aws", "aws"),
    ("eks", "aws"),
    ("azure", "azure"),
    ("aks", "azure"),
    ("gcp", "gcp"),
    ("gke", "gcp"),
    ("openstack", "openstack"),
    ("vsphere", "vsphere"),
    ("docker", "docker"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub age_seconds: i64,
    pub template_ref: NamespacedRef,
    pub credential_ref: NamespacedRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_identity_ref: Option<NamespacedRef>,
    /// One of aws/azure/gcp/…; empty when the provider cannot be inferred.
    pub cloud_provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    pub ready: bool,
    pub phase: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub conditions: Vec<Condition>,
    pub service_templates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub management_url: Option<String>,
}

fn str_of(v: &Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn time_of(v: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    v.pointer(pointer)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Split a template name into base and version when it ends in a
/// `-<major>-<minor>-<patch>` suffix: `azure-standalone-cp-1-0-15` parses to
/// `("azure-standalone-cp", "1.0.15")`.
pub fn split_template_version(name: &str) -> Option<(&str, String)> {
    let parts: Vec<&str> = name.rsplitn(4, '-').collect();
    if parts.len() < 4 {
        return None;
    }
    let (patch, minor, major, base) = (parts[0], parts[1], parts[2], parts[3]);
    if [major, minor, patch]
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        Some((base, format!("{major}.{minor}.{patch}")))
    } else {
        None
    }
}

fn provider_from_token(token: &str) -> Option<&'static str> {
    let token = token.to_ascii_lowercase();
    KNOWN_PROVIDERS
        .iter()
        .find(|(needle, _)| token.contains(needle))
        .map(|(_, canonical)| *canonical)
}

/// Infer the cloud provider: labels first, then the template name, then the
/// credential name.
pub fn infer_cloud_provider(
    labels: &BTreeMap<String, String>,
    template: &str,
    credential: &str,
) -> String {
    for (key, value) in labels {
        if let Some(p) = provider_from_token(value).or_else(|| provider_from_token(key)) {
            return p.to_string();
        }
    }
    if let Some(p) = provider_from_token(template) {
        return p.to_string();
    }
    if let Some(p) = provider_from_token(credential) {
        return p.to_string();
    }
    String::new()
}

fn extract_conditions(v: &Value) -> Vec<Condition> {
    v.pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| Condition {
                    condition_type: str_of(c, "/type"),
                    status: str_of(c, "/status"),
                    reason: str_of(c, "/reason"),
                    message: str_of(c, "/message"),
                    last_transition_at: time_of(c, "/lastTransitionTime"),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Look up a condition by type.
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

pub fn condition_is<'a>(conditions: &'a [Condition], condition_type: &str, status: &str) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == status)
}

/// Build the invariant summary shape from a raw cluster deployment object.
pub fn summarize(obj: &Value, now: DateTime<Utc>) -> ClusterSummary {
    let name = str_of(obj, "/metadata/name");
    let namespace = str_of(obj, "/metadata/namespace");

    let labels: BTreeMap<String, String> = obj
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let owner = obj
        .pointer("/metadata/ownerReferences/0/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let created_at = time_of(obj, "/metadata/creationTimestamp");
    let age_seconds = created_at
        .map(|created| (now - created).num_seconds().max(0))
        .unwrap_or(0);

    let template = str_of(obj, "/spec/template");
    let credential = str_of(obj, "/spec/credential");

    // The CR omits an explicit template version; recover it from the
    // conventional name suffix.
    let template_version = split_template_version(&template)
        .map(|(_, version)| version)
        .unwrap_or_default();

    let conditions = extract_conditions(obj);
    let ready = condition_is(&conditions, "Ready", "True");
    let ready_condition = find_condition(&conditions, "Ready");

    let region = {
        let r = str_of(obj, "/spec/config/region");
        if r.is_empty() { str_of(obj, "/spec/config/location") } else { r }
    };

    let cluster_identity_ref = obj
        .pointer("/spec/config/clusterIdentity")
        .filter(|ci| ci.get("name").is_some())
        .map(|ci| NamespacedRef {
            name: str_of(ci, "/name"),
            namespace: str_of(ci, "/namespace"),
            version: String::new(),
        });

    let service_templates = obj
        .pointer("/spec/serviceSpec/services")
        .and_then(Value::as_array)
        .map(|services| {
            services
                .iter()
                .filter_map(|s| s.get("template").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let cloud_provider = infer_cloud_provider(&labels, &template, &credential);

    let kubeconfig_secret = if ready && !name.is_empty() {
        Some(format!("{name}-kubeconfig"))
    } else {
        None
    };

    ClusterSummary {
        owner,
        created_at,
        age_seconds,
        template_ref: NamespacedRef {
            name: template,
            namespace: namespace.clone(),
            version: template_version,
        },
        credential_ref: NamespacedRef {
            name: credential,
            namespace: namespace.clone(),
            version: String::new(),
        },
        cluster_identity_ref,
        cloud_provider,
        region,
        ready,
        phase: str_of(obj, "/status/phase"),
        message: ready_condition.map(|c| c.message.clone()).unwrap_or_default(),
        conditions,
        service_templates,
        kubeconfig_secret,
        management_url: obj
            .pointer("/metadata/annotations/k0rdent.mirantis.com~1management-url")
            .and_then(Value::as_str)
            .map(str::to_string),
        labels,
        name,
        namespace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "apiVersion": "k0rdent.mirantis.com/v1beta1",
            "kind": "ClusterDeployment",
            "metadata": {
                "name": "e2e-az",
                "namespace": "kcm-system",
                "creationTimestamp": "2026-01-01T00:00:00Z",
                "labels": {"team": "platform"}
            },
            "spec": {
                "template": "azure-standalone-cp-1-0-15",
                "credential": "azure-cluster-credential",
                "config": {
                    "location": "westus2",
                    "subscriptionID": "00000000-0000-0000-0000-000000000000",
                    "clusterIdentity": {"name": "azure-identity", "namespace": "kcm-system"}
                },
                "serviceSpec": {
                    "services": [
                        {"name": "ingress", "template": "ingress-nginx-4-11-0"}
                    ]
                }
            },
            "status": {
                "phase": "Provisioning",
                "conditions": [
                    {"type": "Ready", "status": "False", "reason": "Provisioning",
                     "message": "infrastructure is being created",
                     "lastTransitionTime": "2026-01-01T00:05:00Z"},
                    {"type": "InfrastructureReady", "status": "False"}
                ]
            }
        })
    }

    #[test]
    fn extracts_the_invariant_shape() {
        let now = "2026-01-01T01:00:00Z".parse().unwrap();
        let summary = summarize(&deployment(), now);

        assert_eq!(summary.name, "e2e-az");
        assert_eq!(summary.namespace, "kcm-system");
        assert_eq!(summary.template_ref.name, "azure-standalone-cp-1-0-15");
        assert_eq!(summary.template_ref.version, "1.0.15");
        assert_eq!(summary.credential_ref.name, "azure-cluster-credential");
        assert_eq!(summary.cloud_provider, "azure");
        assert_eq!(summary.region, "westus2");
        assert_eq!(summary.age_seconds, 3600);
        assert!(!summary.ready);
        assert_eq!(summary.phase, "Provisioning");
        assert_eq!(summary.message, "infrastructure is being created");
        assert_eq!(summary.conditions.len(), 2);
        assert_eq!(summary.service_templates, vec!["ingress-nginx-4-11-0"]);
        assert_eq!(
            summary.cluster_identity_ref.unwrap().name,
            "azure-identity"
        );
        assert!(summary.kubeconfig_secret.is_none());
    }

    #[test]
    fn ready_cluster_reports_kubeconfig_secret() {
        let mut obj = deployment();
        obj["status"]["conditions"][0]["status"] = json!("True");
        let summary = summarize(&obj, Utc::now());
        assert!(summary.ready);
        assert_eq!(summary.kubeconfig_secret.as_deref(), Some("e2e-az-kubeconfig"));
    }

    #[test]
    fn summary_is_lenient_about_missing_status() {
        let obj = json!({
            "metadata": {"name": "bare", "namespace": "ns"},
            "spec": {"template": "aws-standalone-cp-1-0-0", "credential": "aws-cred"}
        });
        let summary = summarize(&obj, Utc::now());
        assert!(!summary.ready);
        assert!(summary.phase.is_empty());
        assert!(summary.conditions.is_empty());
        assert_eq!(summary.cloud_provider, "aws");
        assert_eq!(summary.age_seconds, 0);
    }

    #[test]
    fn template_version_split() {
        assert_eq!(
            split_template_version("azure-standalone-cp-1-0-15"),
            Some(("azure-standalone-cp", "1.0.15".to_string()))
        );
        assert_eq!(
            split_template_version("aws-eks-0-2-3"),
            Some(("aws-eks", "0.2.3".to_string()))
        );
        assert_eq!(split_template_version("no-version-here"), None);
        assert_eq!(split_template_version("short-1-2"), None);
    }

    #[test]
    fn provider_inference_precedence() {
        // labels win
        let mut labels = BTreeMap::new();
        labels.insert("cloud".to_string(), "gcp".to_string());
        assert_eq!(
            infer_cloud_provider(&labels, "azure-standalone-cp-1-0-15", "azure-cred"),
            "gcp"
        );
        // then template
        assert_eq!(
            infer_cloud_provider(&BTreeMap::new(), "azure-standalone-cp-1-0-15", "aws-cred"),
            "azure"
        );
        // then credential
        assert_eq!(
            infer_cloud_provider(&BTreeMap::new(), "standalone-cp", "aws-cluster-credential"),
            "aws"
        );
        // aliases map to the canonical name
        assert_eq!(
            infer_cloud_provider(&BTreeMap::new(), "gke-standard-0-1-0", ""),
            "gcp"
        );
        // unknown stays empty
        assert_eq!(infer_cloud_provider(&BTreeMap::new(), "mystery", "cred"), "");
    }
}
