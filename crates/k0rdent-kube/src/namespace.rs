//! Namespace scoping policy.
//!
//! Two knobs: the process-wide allow-list pattern and the auth mode. The
//! global namespace is always implicitly accessible.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Namespace;
use k0rdent_core::{AuthMode, Error, Result, Settings};
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use regex::Regex;

use crate::map_kube_error;

#[derive(Clone)]
pub struct NamespacePolicy {
    mode: AuthMode,
    filter: Option<Regex>,
    global_namespace: String,
    default_namespace: String,
}

impl NamespacePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: settings.auth_mode,
            filter: settings.namespace_filter.clone(),
            global_namespace: settings.global_namespace.clone(),
            default_namespace: settings.default_namespace_dev.clone(),
        }
    }

    pub fn new(
        mode: AuthMode,
        filter: Option<Regex>,
        global_namespace: impl Into<String>,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            mode,
            filter,
            global_namespace: global_namespace.into(),
            default_namespace: default_namespace.into(),
        }
    }

    pub fn global_namespace(&self) -> &str {
        &self.global_namespace
    }

    /// Whether a namespace may be addressed at all. The global namespace
    /// always passes; otherwise the allow-list pattern decides (no pattern
    /// means everything is allowed).
    pub fn is_allowed(&self, namespace: &str) -> bool {
        if namespace == self.global_namespace {
            return true;
        }
        match &self.filter {
            Some(pattern) => pattern.is_match(namespace),
            None => true,
        }
    }

    /// Resolve the namespace a tool call addresses. Dev mode defaults an
    /// unspecified namespace; OIDC mode requires one.
    pub fn resolve(&self, requested: Option<&str>) -> Result<String> {
        let namespace = match requested.filter(|ns| !ns.is_empty()) {
            Some(ns) => ns.to_string(),
            None => match self.mode {
                AuthMode::DevAllowAny => self.default_namespace.clone(),
                AuthMode::OidcRequired => {
                    return Err(Error::invalid_params("namespace must be specified"))
                }
            },
        };
        if !self.is_allowed(&namespace) {
            return Err(Error::Forbidden(format!(
                "namespace {namespace:?} is outside the configured namespace filter"
            )));
        }
        Ok(namespace)
    }

    /// All namespaces a multi-namespace operation fans out over: every
    /// pattern-matched namespace on the cluster plus the global one,
    /// deduplicated and sorted for deterministic output.
    pub async fn allowed_namespaces(&self, client: &Client) -> Result<Vec<String>> {
        let api: Api<Namespace> = Api::all(client.clone());
        let listed = api
            .list(&ListParams::default())
            .await
            .map_err(map_kube_error)?;

        let mut out: BTreeSet<String> = listed
            .items
            .iter()
            .map(|ns| ns.name_any())
            .filter(|name| self.is_allowed(name))
            .collect();
        out.insert(self.global_namespace.clone());
        Ok(out.into_iter().collect())
    }

    /// Same fan-out, applied to an already-fetched namespace list. The async
    /// variant delegates here; tests drive this directly.
    pub fn filter_namespaces<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out: BTreeSet<String> = names
            .into_iter()
            .filter(|name| self.is_allowed(name))
            .map(|name| name.to_string())
            .collect();
        out.insert(self.global_namespace.clone());
        out.into_iter().collect()
    }
}
