//! Azure deployment input.

use serde::Deserialize;
use serde_json::{json, Value};

use super::DeployCommon;

pub const EXAMPLE_CONFIG: &str = r#"{"name":"my-cluster","credential":"azure-cluster-credential","location":"westus2","subscriptionID":"00000000-0000-0000-0000-000000000000","clusterIdentity":{"name":"azure-cluster-identity","namespace":"kcm-system"},"controlPlane":{"vmSize":"Standard_A4_v2","rootVolumeSize":32},"controlPlaneNumber":1,"worker":{"vmSize":"Standard_A4_v2","rootVolumeSize":32},"workersNumber":1}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureNodeGroup {
    #[serde(default)]
    pub vm_size: String,
    pub root_volume_size: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureDeployInput {
    #[serde(flatten)]
    pub common: DeployCommon,
    #[serde(default)]
    pub location: String,
    #[serde(default, rename = "subscriptionID")]
    pub subscription_id: String,
    #[serde(default)]
    pub cluster_identity: Option<AzureClusterIdentity>,
    #[serde(default)]
    pub control_plane: AzureNodeGroup,
    pub control_plane_number: Option<u32>,
    #[serde(default)]
    pub worker: AzureNodeGroup,
    pub workers_number: Option<u32>,
}

impl AzureDeployInput {
    pub(super) fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.location.is_empty() {
            missing.push("location");
        }
        if self.subscription_id.is_empty() {
            missing.push("subscriptionID");
        }
        missing
    }

    pub(super) fn build_config(&self) -> Value {
        let mut config = json!({
            "location": self.location,
            "subscriptionID": self.subscription_id,
            "controlPlaneNumber": self.control_plane_number.unwrap_or(1),
            "workersNumber": self.workers_number.unwrap_or(1),
        });
        if let Some(identity) = &self.cluster_identity {
            config["clusterIdentity"] = json!({
                "name": identity.name,
                "namespace": identity.namespace,
            });
        }
        if !self.control_plane.vm_size.is_empty() {
            config["controlPlane"] = node_group(&self.control_plane);
        }
        if !self.worker.vm_size.is_empty() {
            config["worker"] = node_group(&self.worker);
        }
        config
    }
}

fn node_group(group: &AzureNodeGroup) -> Value {
    let mut v = json!({"vmSize": group.vm_size});
    if let Some(size) = group.root_volume_size {
        v["rootVolumeSize"] = json!(size);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::super::{CloudProvider, ProviderDeployInput};
    use serde_json::json;

    fn valid_args() -> serde_json::Value {
        json!({
            "name": "e2e-az",
            "namespace": "kcm-system",
            "credential": "azure-cluster-credential",
            "location": "westus2",
            "subscriptionID": "00000000-0000-0000-0000-000000000000",
            "clusterIdentity": {"name": "azure-identity", "namespace": "kcm-system"},
            "controlPlane": {"vmSize": "Standard_A4_v2", "rootVolumeSize": 32},
            "controlPlaneNumber": 1,
            "worker": {"vmSize": "Standard_A4_v2", "rootVolumeSize": 32},
            "workersNumber": 1
        })
    }

    #[test]
    fn builds_provider_shaped_config() {
        let input = ProviderDeployInput::parse(CloudProvider::Azure, valid_args()).unwrap();
        let config = input.build_config();
        assert_eq!(config["location"], "westus2");
        assert_eq!(
            config["subscriptionID"],
            "00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(config["clusterIdentity"]["name"], "azure-identity");
        assert_eq!(config["controlPlane"]["vmSize"], "Standard_A4_v2");
        assert_eq!(config["worker"]["rootVolumeSize"], 32);
    }

    #[test]
    fn location_and_subscription_are_required() {
        let err = ProviderDeployInput::parse(
            CloudProvider::Azure,
            json!({"name": "c", "credential": "azure-cred", "location": ""}),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("location"));
        assert!(msg.contains("subscriptionID"));
    }

    #[test]
    fn wait_parameters_parse_through_common() {
        let mut args = valid_args();
        args["wait"] = json!(true);
        args["pollInterval"] = json!(15);
        args["provisionTimeout"] = json!(600);
        let input = ProviderDeployInput::parse(CloudProvider::Azure, args).unwrap();
        let common = input.common();
        assert!(common.wait);
        assert_eq!(common.poll_interval, Some(15));
        assert_eq!(common.provision_timeout, Some(600));
        assert_eq!(common.stall_threshold, None);
    }
}
