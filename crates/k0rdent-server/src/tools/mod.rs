//! Tool registry and dispatch.
//!
//! Tool names follow `k0rdent.<plane>.<category>.<action>` with planes
//! `catalog`, `mgmt` and `provider`. Every registration carries a human
//! description, the plane/category/action metadata and a JSON schema for its
//! input object; dispatch deserializes the arguments into the tool's typed
//! input, which is where validation happens.

pub mod catalog;
pub mod clusters;
pub mod events;
pub mod providers;
pub mod services;

use std::sync::Arc;

use k0rdent_core::{Error, Result};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::session::{ServerState, Session};

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub plane: &'static str,
    pub category: &'static str,
    pub action: &'static str,
    pub input_schema: Value,
}

pub const APPROVED_PLANES: &[&str] = &["catalog", "mgmt", "provider"];

fn no_input() -> Value {
    json!({"type": "object", "properties": {}, "additionalProperties": false})
}

/// The full tool surface.
pub fn registry() -> Vec<ToolSpec> {
    let wait_props = json!({
        "wait": {"type": "boolean", "description": "Block until the cluster is ready"},
        "pollInterval": {"type": "integer", "description": "Readiness poll interval in seconds"},
        "provisionTimeout": {"type": "integer", "description": "Overall readiness timeout in seconds"},
        "stallThreshold": {"type": "integer", "description": "Seconds without condition changes before a stall warning"}
    });

    let deploy_schema = |provider_props: Value, required: Value| {
        let mut props = Map::new();
        props.insert("name".into(), json!({"type": "string"}));
        props.insert("namespace".into(), json!({"type": "string"}));
        props.insert("credential".into(), json!({"type": "string"}));
        props.insert("template".into(), json!({"type": "string", "description": "Explicit cluster template; latest for the provider when omitted"}));
        for (k, v) in provider_props.as_object().unwrap() {
            props.insert(k.clone(), v.clone());
        }
        for (k, v) in wait_props.as_object().unwrap() {
            props.insert(k.clone(), v.clone());
        }
        json!({"type": "object", "properties": props, "required": required})
    };

    vec![
        ToolSpec {
            name: "k0rdent.mgmt.providers.list",
            description: "List the infrastructure providers this management cluster can deploy to",
            plane: "mgmt",
            category: "providers",
            action: "list",
            input_schema: no_input(),
        },
        ToolSpec {
            name: "k0rdent.mgmt.providers.listCredentials",
            description: "List credential objects, optionally scoped to a namespace or provider",
            plane: "mgmt",
            category: "providers",
            action: "listCredentials",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": {"type": "string"},
                    "provider": {"type": "string", "enum": ["aws", "azure", "gcp"]}
                }
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.providers.listIdentities",
            description: "List provider identity objects referenced by credentials",
            plane: "mgmt",
            category: "providers",
            action: "listIdentities",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "provider": {"type": "string", "enum": ["aws", "azure", "gcp"]}
                }
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterTemplates.list",
            description: "List cluster templates by scope (global, local or all namespaces)",
            plane: "mgmt",
            category: "clusterTemplates",
            action: "list",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "scope": {"type": "string", "enum": ["global", "local", "all"]},
                    "namespace": {"type": "string"}
                }
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterDeployments.list",
            description: "List cluster deployments across all allowed namespaces",
            plane: "mgmt",
            category: "clusterDeployments",
            action: "list",
            input_schema: no_input(),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterDeployments.listAll",
            description: "List cluster deployments with an optional label selector",
            plane: "mgmt",
            category: "clusterDeployments",
            action: "listAll",
            input_schema: json!({
                "type": "object",
                "properties": {"selector": {"type": "string", "description": "Kubernetes label selector"}}
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterDeployments.getState",
            description: "Full state of one cluster deployment, including its service entries",
            plane: "mgmt",
            category: "clusterDeployments",
            action: "getState",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "namespace": {"type": "string"}
                },
                "required": ["name", "namespace"]
            }),
        },
        ToolSpec {
            name: "k0rdent.provider.aws.clusterDeployments.deploy",
            description: "Deploy an AWS cluster via the latest (or given) AWS cluster template",
            plane: "provider",
            category: "clusterDeployments",
            action: "deploy",
            input_schema: deploy_schema(
                json!({
                    "region": {"type": "string"},
                    "controlPlane": {"type": "object", "properties": {"instanceType": {"type": "string"}, "rootVolumeSize": {"type": "integer"}}},
                    "controlPlaneNumber": {"type": "integer"},
                    "worker": {"type": "object", "properties": {"instanceType": {"type": "string"}, "rootVolumeSize": {"type": "integer"}}},
                    "workersNumber": {"type": "integer"}
                }),
                json!(["name", "credential", "region"]),
            ),
        },
        ToolSpec {
            name: "k0rdent.provider.azure.clusterDeployments.deploy",
            description: "Deploy an Azure cluster via the latest (or given) Azure cluster template",
            plane: "provider",
            category: "clusterDeployments",
            action: "deploy",
            input_schema: deploy_schema(
                json!({
                    "location": {"type": "string"},
                    "subscriptionID": {"type": "string"},
                    "clusterIdentity": {"type": "object", "properties": {"name": {"type": "string"}, "namespace": {"type": "string"}}},
                    "controlPlane": {"type": "object", "properties": {"vmSize": {"type": "string"}, "rootVolumeSize": {"type": "integer"}}},
                    "controlPlaneNumber": {"type": "integer"},
                    "worker": {"type": "object", "properties": {"vmSize": {"type": "string"}, "rootVolumeSize": {"type": "integer"}}},
                    "workersNumber": {"type": "integer"}
                }),
                json!(["name", "credential", "location", "subscriptionID"]),
            ),
        },
        ToolSpec {
            name: "k0rdent.provider.gcp.clusterDeployments.deploy",
            description: "Deploy a GCP cluster via the latest (or given) GCP cluster template",
            plane: "provider",
            category: "clusterDeployments",
            action: "deploy",
            input_schema: deploy_schema(
                json!({
                    "project": {"type": "string"},
                    "region": {"type": "string"},
                    "network": {"type": "object", "properties": {"name": {"type": "string"}}},
                    "controlPlane": {"type": "object", "properties": {"instanceType": {"type": "string"}, "rootVolumeSize": {"type": "integer"}}},
                    "controlPlaneNumber": {"type": "integer"},
                    "worker": {"type": "object", "properties": {"instanceType": {"type": "string"}, "rootVolumeSize": {"type": "integer"}}},
                    "workersNumber": {"type": "integer"}
                }),
                json!(["name", "credential", "project", "region", "network"]),
            ),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterDeployments.delete",
            description: "Delete a cluster deployment (idempotent, foreground propagation)",
            plane: "mgmt",
            category: "clusterDeployments",
            action: "delete",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "namespace": {"type": "string"},
                    "wait": {"type": "boolean"},
                    "pollInterval": {"type": "integer"},
                    "deletionTimeout": {"type": "integer"}
                },
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterDeployments.services.apply",
            description: "Add or update a service entry on a cluster deployment",
            plane: "mgmt",
            category: "clusterDeployments.services",
            action: "apply",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "clusterNamespace": {"type": "string"},
                    "clusterName": {"type": "string"},
                    "service": {
                        "type": "object",
                        "properties": {
                            "templateNamespace": {"type": "string"},
                            "templateName": {"type": "string"},
                            "serviceName": {"type": "string"},
                            "values": {"type": "string", "description": "Inline YAML values"},
                            "valuesFrom": {"type": "array"},
                            "helmOptions": {"type": "object"},
                            "dependsOn": {"type": "array", "items": {"type": "string"}},
                            "priority": {"type": "integer"}
                        },
                        "required": ["templateNamespace", "templateName"]
                    },
                    "dryRun": {"type": "boolean"}
                },
                "required": ["clusterNamespace", "clusterName", "service"]
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.clusterDeployments.services.remove",
            description: "Remove a service entry from a cluster deployment (idempotent)",
            plane: "mgmt",
            category: "clusterDeployments.services",
            action: "remove",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "clusterNamespace": {"type": "string"},
                    "clusterName": {"type": "string"},
                    "serviceName": {"type": "string"},
                    "dryRun": {"type": "boolean"}
                },
                "required": ["clusterNamespace", "clusterName", "serviceName"]
            }),
        },
        ToolSpec {
            name: "k0rdent.catalog.serviceTemplates.list",
            description: "List add-ons from the k0rdent catalog, optionally filtered by slug",
            plane: "catalog",
            category: "serviceTemplates",
            action: "list",
            input_schema: json!({
                "type": "object",
                "properties": {"app": {"type": "string", "description": "Case-insensitive slug substring"}}
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.serviceTemplates.list",
            description: "List service templates installed on the management cluster",
            plane: "mgmt",
            category: "serviceTemplates",
            action: "list",
            input_schema: no_input(),
        },
        ToolSpec {
            name: "k0rdent.mgmt.serviceTemplates.install_from_catalog",
            description: "Install a catalog add-on as a service template via Helm",
            plane: "mgmt",
            category: "serviceTemplates",
            action: "install_from_catalog",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "app": {"type": "string"},
                    "template": {"type": "string"},
                    "version": {"type": "string"},
                    "namespace": {"type": "string"},
                    "allNamespaces": {"type": "boolean"}
                },
                "required": ["app", "template", "version"]
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.serviceTemplates.delete",
            description: "Uninstall a catalog-installed service template",
            plane: "mgmt",
            category: "serviceTemplates",
            action: "delete",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "namespace": {"type": "string"},
                    "allNamespaces": {"type": "boolean"}
                },
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.namespaces.list",
            description: "List the namespaces this session may address",
            plane: "mgmt",
            category: "namespaces",
            action: "list",
            input_schema: no_input(),
        },
        ToolSpec {
            name: "k0rdent.mgmt.events.list",
            description: "List Kubernetes events in a namespace with filtering",
            plane: "mgmt",
            category: "events",
            action: "list",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": {"type": "string"},
                    "types": {"type": "array", "items": {"type": "string", "enum": ["Normal", "Warning"]}},
                    "forKind": {"type": "string"},
                    "forName": {"type": "string"},
                    "sinceSeconds": {"type": "integer"},
                    "limit": {"type": "integer"}
                },
                "required": ["namespace"]
            }),
        },
        ToolSpec {
            name: "k0rdent.mgmt.podLogs.get",
            description: "Fetch logs from one container of a pod",
            plane: "mgmt",
            category: "podLogs",
            action: "get",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namespace": {"type": "string"},
                    "pod": {"type": "string"},
                    "container": {"type": "string"},
                    "sinceSeconds": {"type": "integer"},
                    "tailLines": {"type": "integer"}
                },
                "required": ["namespace", "pod", "container"]
            }),
        },
    ]
}

/// The registry in MCP wire form.
pub fn mcp_tools() -> Vec<rmcp::model::Tool> {
    registry()
        .into_iter()
        .map(|spec| {
            let schema: Map<String, Value> = spec
                .input_schema
                .as_object()
                .cloned()
                .unwrap_or_default();
            rmcp::model::Tool::new(spec.name, spec.description, Arc::new(schema))
        })
        .collect()
}

/// Route a validated tool call into its handler.
pub async fn dispatch(
    state: &Arc<ServerState>,
    session: &Arc<Session>,
    name: &str,
    args: Value,
    cancel: CancellationToken,
) -> Result<Value> {
    match name {
        "k0rdent.mgmt.providers.list" => providers::list(session).await,
        "k0rdent.mgmt.providers.listCredentials" => providers::list_credentials(session, args).await,
        "k0rdent.mgmt.providers.listIdentities" => providers::list_identities(session, args).await,
        "k0rdent.mgmt.clusterTemplates.list" => clusters::list_templates(session, args).await,
        "k0rdent.mgmt.clusterDeployments.list" => clusters::list(session).await,
        "k0rdent.mgmt.clusterDeployments.listAll" => clusters::list_all(session, args).await,
        "k0rdent.mgmt.clusterDeployments.getState" => clusters::get_state(session, args).await,
        "k0rdent.provider.aws.clusterDeployments.deploy" => {
            clusters::deploy(session, k0rdent_clusters::CloudProvider::Aws, args, cancel).await
        }
        "k0rdent.provider.azure.clusterDeployments.deploy" => {
            clusters::deploy(session, k0rdent_clusters::CloudProvider::Azure, args, cancel).await
        }
        "k0rdent.provider.gcp.clusterDeployments.deploy" => {
            clusters::deploy(session, k0rdent_clusters::CloudProvider::Gcp, args, cancel).await
        }
        "k0rdent.mgmt.clusterDeployments.delete" => clusters::delete(session, args, cancel).await,
        "k0rdent.mgmt.clusterDeployments.services.apply" => services::apply(session, args).await,
        "k0rdent.mgmt.clusterDeployments.services.remove" => services::remove(session, args).await,
        "k0rdent.catalog.serviceTemplates.list" => catalog::list_catalog(state, args).await,
        "k0rdent.mgmt.serviceTemplates.list" => catalog::list_installed(session).await,
        "k0rdent.mgmt.serviceTemplates.install_from_catalog" => {
            catalog::install(state, session, args).await
        }
        "k0rdent.mgmt.serviceTemplates.delete" => catalog::delete(state, session, args).await,
        "k0rdent.mgmt.namespaces.list" => events::list_namespaces(session).await,
        "k0rdent.mgmt.events.list" => events::list_events(session, args).await,
        "k0rdent.mgmt.podLogs.get" => events::get_pod_logs(session, args).await,
        other => Err(Error::invalid_params(format!("unknown tool {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tool_names_follow_the_grammar_and_are_unique() {
        let registry = registry();
        let mut seen = HashSet::new();
        for spec in &registry {
            assert!(spec.name.starts_with("k0rdent."), "{}", spec.name);
            assert!(APPROVED_PLANES.contains(&spec.plane), "{}", spec.name);
            assert!(!spec.category.is_empty() && !spec.action.is_empty());
            assert!(
                spec.name.ends_with(spec.action),
                "{} should end with its action {}",
                spec.name,
                spec.action
            );
            assert!(seen.insert(spec.name), "duplicate tool {}", spec.name);
            assert!(spec.input_schema.is_object());
            assert!(!spec.description.is_empty());
        }
    }

    #[test]
    fn every_registered_tool_has_a_dispatch_arm() {
        // the dispatcher's match is the source of truth; keep the registry in
        // lock-step by checking the wire listing covers the same names
        let names: Vec<&str> = registry().iter().map(|s| s.name).collect();
        assert_eq!(names.len(), mcp_tools().len());
    }

    #[test]
    fn deploy_tools_require_provider_keys() {
        let registry = registry();
        let azure = registry
            .iter()
            .find(|s| s.name == "k0rdent.provider.azure.clusterDeployments.deploy")
            .unwrap();
        let required = azure.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "location"));
        assert!(required.iter().any(|v| v == "subscriptionID"));
    }
}
