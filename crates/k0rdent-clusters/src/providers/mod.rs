//! Provider-specific deployment inputs.
//!
//! Dispatch on the provider is tagged-variant: the provider identifier
//! selects a typed input shape and a small builder for `spec.config`. Each
//! provider declares its required keys; validation failures carry the missing
//! fields and a copy-pasteable example configuration.

pub mod aws;
pub mod azure;
pub mod gcp;

pub use aws::AwsDeployInput;
pub use azure::AzureDeployInput;
pub use gcp::GcpDeployInput;

use k0rdent_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
}

impl CloudProvider {
    pub fn name(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
        }
    }

    /// Cluster template name prefix for this provider's standalone templates.
    pub fn template_prefix(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws-standalone-cp",
            CloudProvider::Azure => "azure-standalone-cp",
            CloudProvider::Gcp => "gcp-standalone-cp",
        }
    }
}

/// Identity objects a provider's credentials reference. CRDs for providers
/// that are not installed on the management cluster are simply absent; the
/// listing tolerates that.
pub struct IdentityKind {
    pub provider: &'static str,
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
}

pub const IDENTITY_KINDS: &[IdentityKind] = &[
    IdentityKind {
        provider: "aws",
        group: "infrastructure.cluster.x-k8s.io",
        version: "v1beta2",
        kind: "AWSClusterStaticIdentity",
        plural: "awsclusterstaticidentities",
        namespaced: false,
    },
    IdentityKind {
        provider: "azure",
        group: "infrastructure.cluster.x-k8s.io",
        version: "v1beta1",
        kind: "AzureClusterIdentity",
        plural: "azureclusteridentities",
        namespaced: true,
    },
];

/// Fields shared by every provider deploy input.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployCommon {
    pub name: String,
    pub namespace: Option<String>,
    pub credential: String,
    /// Explicit template override; the latest provider template is selected
    /// when absent.
    pub template: Option<String>,
    #[serde(default)]
    pub wait: bool,
    pub poll_interval: Option<u64>,
    pub provision_timeout: Option<u64>,
    pub stall_threshold: Option<u64>,
}

/// A provider input, validated and ready to be turned into `spec.config`.
#[derive(Debug, Clone)]
pub enum ProviderDeployInput {
    Aws(AwsDeployInput),
    Azure(AzureDeployInput),
    Gcp(GcpDeployInput),
}

impl ProviderDeployInput {
    pub fn parse(provider: CloudProvider, args: Value) -> Result<Self> {
        let input = match provider {
            CloudProvider::Aws => ProviderDeployInput::Aws(serde_json::from_value(args)?),
            CloudProvider::Azure => ProviderDeployInput::Azure(serde_json::from_value(args)?),
            CloudProvider::Gcp => ProviderDeployInput::Gcp(serde_json::from_value(args)?),
        };
        input.validate()?;
        Ok(input)
    }

    pub fn provider(&self) -> CloudProvider {
        match self {
            ProviderDeployInput::Aws(_) => CloudProvider::Aws,
            ProviderDeployInput::Azure(_) => CloudProvider::Azure,
            ProviderDeployInput::Gcp(_) => CloudProvider::Gcp,
        }
    }

    pub fn common(&self) -> &DeployCommon {
        match self {
            ProviderDeployInput::Aws(input) => &input.common,
            ProviderDeployInput::Azure(input) => &input.common,
            ProviderDeployInput::Gcp(input) => &input.common,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (missing, example) = match self {
            ProviderDeployInput::Aws(input) => (input.missing_fields(), aws::EXAMPLE_CONFIG),
            ProviderDeployInput::Azure(input) => (input.missing_fields(), azure::EXAMPLE_CONFIG),
            ProviderDeployInput::Gcp(input) => (input.missing_fields(), gcp::EXAMPLE_CONFIG),
        };
        let mut missing = missing;
        if self.common().name.is_empty() {
            missing.insert(0, "name");
        }
        if self.common().credential.is_empty() {
            missing.insert(1.min(missing.len()), "credential");
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(Error::InvalidParams(format!(
            "invalid {} deployment configuration; missing or empty field(s): {}. Example: {}",
            self.provider().name(),
            missing.join(", "),
            example,
        )))
    }

    /// Build the provider-shaped `spec.config` map.
    pub fn build_config(&self) -> Value {
        match self {
            ProviderDeployInput::Aws(input) => input.build_config(),
            ProviderDeployInput::Azure(input) => input.build_config(),
            ProviderDeployInput::Gcp(input) => input.build_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_validates_common_fields() {
        let err = ProviderDeployInput::parse(
            CloudProvider::Aws,
            json!({"name": "", "credential": "", "region": "us-east-1"}),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalidParams");
        let msg = err.to_string();
        assert!(msg.contains("name"));
        assert!(msg.contains("credential"));
    }

    #[test]
    fn validation_message_includes_example() {
        let err = ProviderDeployInput::parse(
            CloudProvider::Azure,
            json!({"name": "c1", "credential": "azure-cred"}),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("location"));
        assert!(msg.contains("subscriptionID"));
        assert!(msg.contains("Example"));
    }
}
