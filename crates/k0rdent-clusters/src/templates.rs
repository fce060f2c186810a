//! Cluster template listing and selection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::summary::{infer_cloud_provider, split_template_version};

/// Which namespaces a template listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateScope {
    /// The global namespace only.
    Global,
    /// Every allowed namespace except the global one.
    Local,
    /// The union of both.
    #[default]
    All,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cloud: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Extract a template summary from the raw ClusterTemplate object.
pub fn summarize_template(obj: &Value) -> TemplateSummary {
    let name = obj
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let labels: BTreeMap<String, String> = obj
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let provider = obj
        .pointer("/status/providers/0")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let version = obj
        .pointer("/status/chartVersion")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| split_template_version(&name).map(|(_, v)| v))
        .unwrap_or_default();

    TemplateSummary {
        namespace: obj
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: obj
            .pointer("/status/description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        cloud: infer_cloud_provider(&labels, &name, &provider),
        provider,
        version,
        created_at: obj
            .pointer("/metadata/creationTimestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc)),
        labels,
        name,
    }
}

/// Pick the newest template whose name starts with `prefix`, ordering by the
/// parsed `-<major>-<minor>-<patch>` suffix. Names without a parsable version
/// are ignored.
pub fn select_latest_template<'a, I>(names: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .filter_map(|name| {
            let (_, version) = split_template_version(name)?;
            let parts: Vec<u64> = version.split('.').map(|p| p.parse().ok()).collect::<Option<_>>()?;
            Some((name, (parts[0], parts[1], parts[2])))
        })
        .max_by(|(a_name, a_ver), (b_name, b_ver)| a_ver.cmp(b_ver).then_with(|| a_name.cmp(b_name)))
        .map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selects_highest_version_for_prefix() {
        let names = [
            "azure-standalone-cp-1-0-15",
            "azure-standalone-cp-1-0-9",
            "azure-standalone-cp-0-9-22",
            "azure-aks-0-2-0",
            "aws-standalone-cp-2-0-0",
        ];
        assert_eq!(
            select_latest_template(names, "azure-standalone-cp"),
            Some("azure-standalone-cp-1-0-15".to_string())
        );
        assert_eq!(
            select_latest_template(names, "azure-"),
            Some("azure-standalone-cp-1-0-15".to_string())
        );
        assert_eq!(select_latest_template(names, "gcp-"), None);
    }

    #[test]
    fn numeric_ordering_beats_lexicographic() {
        let names = ["aws-standalone-cp-1-2-0", "aws-standalone-cp-1-10-0"];
        assert_eq!(
            select_latest_template(names, "aws-"),
            Some("aws-standalone-cp-1-10-0".to_string())
        );
    }

    #[test]
    fn unversioned_names_are_ignored() {
        let names = ["aws-custom", "aws-standalone-cp-0-1-0"];
        assert_eq!(
            select_latest_template(names, "aws-"),
            Some("aws-standalone-cp-0-1-0".to_string())
        );
    }

    #[test]
    fn template_summary_extracts_status_fields() {
        let summary = summarize_template(&json!({
            "metadata": {
                "name": "azure-standalone-cp-1-0-15",
                "namespace": "kcm-system",
                "creationTimestamp": "2026-01-01T00:00:00Z"
            },
            "status": {
                "description": "Azure standalone control plane",
                "providers": ["infrastructure-azure"],
                "chartVersion": "1.0.15"
            }
        }));
        assert_eq!(summary.version, "1.0.15");
        assert_eq!(summary.provider, "infrastructure-azure");
        assert_eq!(summary.cloud, "azure");
        assert_eq!(summary.description, "Azure standalone control plane");
    }

    #[test]
    fn template_version_falls_back_to_name_suffix() {
        let summary = summarize_template(&json!({
            "metadata": {"name": "gcp-standalone-cp-0-2-1", "namespace": "kcm-system"}
        }));
        assert_eq!(summary.version, "0.2.1");
        assert_eq!(summary.cloud, "gcp");
    }
}
