//! AWS deployment input.

use serde::Deserialize;
use serde_json::{json, Value};

use super::DeployCommon;

pub const EXAMPLE_CONFIG: &str = r#"{"name":"my-cluster","credential":"aws-cluster-credential","region":"us-east-1","controlPlane":{"instanceType":"t3.large","rootVolumeSize":32},"controlPlaneNumber":1,"worker":{"instanceType":"t3.large","rootVolumeSize":32},"workersNumber":2}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsNodeGroup {
    #[serde(default)]
    pub instance_type: String,
    pub root_volume_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsDeployInput {
    #[serde(flatten)]
    pub common: DeployCommon,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub control_plane: AwsNodeGroup,
    pub control_plane_number: Option<u32>,
    #[serde(default)]
    pub worker: AwsNodeGroup,
    pub workers_number: Option<u32>,
}

impl AwsDeployInput {
    pub(super) fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.region.is_empty() {
            missing.push("region");
        }
        missing
    }

    pub(super) fn build_config(&self) -> Value {
        let mut config = json!({
            "region": self.region,
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

fn node_group(group: &AwsNodeGroup) -> Value {
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
    fn builds_provider_shaped_config() {
        let input = ProviderDeployInput::parse(
            CloudProvider::Aws,
            json!({
                "name": "e2e-aws",
                "credential": "aws-cluster-credential",
                "region": "us-east-1",
                "controlPlane": {"instanceType": "t3.large", "rootVolumeSize": 32},
                "controlPlaneNumber": 3,
                "worker": {"instanceType": "t3.xlarge"},
                "workersNumber": 2
            }),
        )
        .unwrap();
        let config = input.build_config();
        assert_eq!(config["region"], "us-east-1");
        assert_eq!(config["controlPlaneNumber"], 3);
        assert_eq!(config["workersNumber"], 2);
        assert_eq!(config["controlPlane"]["instanceType"], "t3.large");
        assert_eq!(config["controlPlane"]["rootVolumeSize"], 32);
        assert_eq!(config["worker"]["instanceType"], "t3.xlarge");
        assert!(config["worker"].get("rootVolumeSize").is_none());
    }

    #[test]
    fn missing_region_is_invalid() {
        let err = ProviderDeployInput::parse(
            CloudProvider::Aws,
            json!({"name": "c", "credential": "aws-cred"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn counts_default_to_one() {
        let input = ProviderDeployInput::parse(
            CloudProvider::Aws,
            json!({"name": "c", "credential": "aws-cred", "region": "eu-west-1"}),
        )
        .unwrap();
        let config = input.build_config();
        assert_eq!(config["controlPlaneNumber"], 1);
        assert_eq!(config["workersNumber"], 1);
    }
}
