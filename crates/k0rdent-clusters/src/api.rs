//! Dynamic API handles for the k0rdent management resources.

use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client};

pub const K0RDENT_GROUP: &str = "k0rdent.mirantis.com";
pub const K0RDENT_VERSION: &str = "v1beta1";
pub const K0RDENT_API_VERSION: &str = "k0rdent.mirantis.com/v1beta1";

/// Label stamped on every cluster deployment this server applies.
pub const MANAGED_LABEL: &str = "k0rdent.mirantis.com/managed";

fn k0rdent_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(K0RDENT_GROUP, K0RDENT_VERSION, kind),
        plural,
    )
}

pub fn cluster_deployments(client: &Client, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(
        client.clone(),
        namespace,
        &k0rdent_resource("ClusterDeployment", "clusterdeployments"),
    )
}

pub fn cluster_templates(client: &Client, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(
        client.clone(),
        namespace,
        &k0rdent_resource("ClusterTemplate", "clustertemplates"),
    )
}

pub fn service_templates(client: &Client, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(
        client.clone(),
        namespace,
        &k0rdent_resource("ServiceTemplate", "servicetemplates"),
    )
}

pub fn credentials(client: &Client, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(
        client.clone(),
        namespace,
        &k0rdent_resource("Credential", "credentials"),
    )
}

/// Handle for an arbitrary group/version/kind, used for the provider
/// identity objects whose CRDs may or may not be installed.
pub fn dynamic_api(
    client: &Client,
    group: &str,
    version: &str,
    kind: &str,
    plural: &str,
    namespace: Option<&str>,
) -> Api<DynamicObject> {
    let resource = ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(group, version, kind),
        plural,
    );
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &resource),
        None => Api::all_with(client.clone(), &resource),
    }
}
