//! GCP deployment input.

use serde::Deserialize;
use serde_json::{json, Value};

use super::DeployCommon;

pub const EXAMPLE_CONFIG: &str = r#"{"name":"my-cluster","credential":"gcp-cluster-credential","project":"my-project","region":"us-central1","network":{"name":"default"},"controlPlane":{"instanceType":"n1-standard-4","rootVolumeSize":32},"controlPlaneNumber":1,"worker":{"instanceType":"n1-standard-4","rootVolumeSize":32},"workersNumber":1}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpNodeGroup {
    #[serde(default)]
    pub instance_type: String,
    pub root_volume_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpNetwork {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpDeployInput {
    #[serde(flatten)]
    pub common: DeployCommon,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub network: GcpNetwork,
    #[serde(default)]
    pub control_plane: GcpNodeGroup,
    pub control_plane_number: Option<u32>,
    #[serde(default)]
    pub worker: GcpNodeGroup,
    pub workers_number: Option<u32>,
}

impl GcpDeployInput {
    pub(super) fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project.is_empty() {
            missing.push("project");
        }
        if self.region.is_empty() {
            missing.push("region");
        }
        if self.network.name.is_empty() {
            missing.push("network.name");
        }
        missing
    }

    pub(super) fn build_config(&self) -> Value {
        let mut config = json!({
            "project": self.project,
            "region": self.region,
            "network": {"name": self.network.name},
            "controlPlaneNumber": self.control_plane_number.unwrap_or(1),
            "workersNumber": self.workers_number.unwrap_or(1),
        });
        if !self.control_plane.instance_type.is_empty() {
            config["controlPlane"] = node_group(&self.control_plane);
        }
        if !self.worker.instance_type.is_empty() {
            config["worker"] = node_group(&self.worker);
        }
        config
    }
}

fn node_group(group: &GcpNodeGroup) -> Value {
    let mut v = json!({"instanceType": group.instance_type});
    if let Some(size) = group.root_volume_size {
        v["rootVolumeSize"] = json!(size);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::super::{CloudProvider, ProviderDeployInput};
    use serde_json::json;

    #[test]
    fn requires_project_region_and_network_name() {
        let err = ProviderDeployInput::parse(
            CloudProvider::Gcp,
            json!({"name": "c", "credential": "gcp-cred"}),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("project"));
        assert!(msg.contains("region"));
        assert!(msg.contains("network.name"));
    }

    #[test]
    fn builds_provider_shaped_config() {
        let input = ProviderDeployInput::parse(
            CloudProvider::Gcp,
            json!({
                "name": "e2e-gcp",
                "credential": "gcp-cluster-credential",
                "project": "demo-project",
                "region": "us-central1",
                "network": {"name": "default"},
                "worker": {"instanceType": "n1-standard-4", "rootVolumeSize": 64},
                "workersNumber": 3
            }),
        )
        .unwrap();
        let config = input.build_config();
        assert_eq!(config["project"], "demo-project");
        assert_eq!(config["network"]["name"], "default");
        assert_eq!(config["workersNumber"], 3);
        assert_eq!(config["worker"]["rootVolumeSize"], 64);
    }
}
