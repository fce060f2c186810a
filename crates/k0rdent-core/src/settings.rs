//! Process-wide settings, loaded once from the environment at startup.

use std::net::SocketAddr;
use std::path::PathBuf;

use regex::Regex;

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:6767";
pub const DEFAULT_GLOBAL_NAMESPACE: &str = "kcm-system";
pub const DEFAULT_FIELD_OWNER: &str = "mcp.clusters";

/// Authentication policy for the MCP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Accept requests without a bearer token; any presented token is still
    /// forwarded to the Kubernetes API server.
    DevAllowAny,
    /// A bearer token must be present. The token is forwarded verbatim; the
    /// Kubernetes API server performs the actual identity check.
    OidcRequired,
}

impl AuthMode {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "DEV_ALLOW_ANY" => Ok(AuthMode::DevAllowAny),
            "OIDC_REQUIRED" => Ok(AuthMode::OidcRequired),
            other => Err(Error::invalid_params(format!(
                "AUTH_MODE must be DEV_ALLOW_ANY or OIDC_REQUIRED, got {other:?}"
            ))),
        }
    }
}

/// Immutable process configuration. Constructed once in `main` and shared by
/// reference everywhere else.
#[derive(Debug, Clone)]
pub struct Settings {
    pub auth_mode: AuthMode,
    pub kubeconfig_path: Option<PathBuf>,
    pub kube_context: Option<String>,
    pub namespace_filter: Option<Regex>,
    pub listen_addr: SocketAddr,
    pub global_namespace: String,
    pub default_namespace_dev: String,
    pub field_owner: String,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from process environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup. `load` delegates here;
    /// tests drive this directly so they never touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let auth_mode = match get("AUTH_MODE") {
            Some(value) => AuthMode::parse(&value)?,
            None => AuthMode::DevAllowAny,
        };

        let namespace_filter = get("K0RDENT_NAMESPACE_FILTER")
            .map(|pattern| {
                Regex::new(&pattern).map_err(|e| {
                    Error::invalid_params(format!("K0RDENT_NAMESPACE_FILTER is not a valid regex: {e}"))
                })
            })
            .transpose()?;

        let listen_addr: SocketAddr = get("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|e| Error::invalid_params(format!("LISTEN_ADDR is not a valid address: {e}")))?;

        let global_namespace =
            get("CLUSTER_GLOBAL_NAMESPACE").unwrap_or_else(|| DEFAULT_GLOBAL_NAMESPACE.to_string());
        let default_namespace_dev =
            get("CLUSTER_DEFAULT_NAMESPACE_DEV").unwrap_or_else(|| global_namespace.clone());

        let logging = LoggingConfig {
            level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: LogFormat::Pretty,
        };

        Ok(Settings {
            auth_mode,
            kubeconfig_path: get("K0RDENT_MGMT_KUBECONFIG_PATH").map(PathBuf::from),
            kube_context: get("K0RDENT_MGMT_CONTEXT"),
            namespace_filter,
            listen_addr,
            global_namespace,
            default_namespace_dev,
            field_owner: get("CLUSTER_DEPLOY_FIELD_OWNER").unwrap_or_else(|| DEFAULT_FIELD_OWNER.to_string()),
            logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.auth_mode, AuthMode::DevAllowAny);
        assert_eq!(settings.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(settings.global_namespace, DEFAULT_GLOBAL_NAMESPACE);
        assert_eq!(settings.default_namespace_dev, DEFAULT_GLOBAL_NAMESPACE);
        assert_eq!(settings.field_owner, DEFAULT_FIELD_OWNER);
        assert!(settings.namespace_filter.is_none());
        assert!(settings.kubeconfig_path.is_none());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("AUTH_MODE", "OIDC_REQUIRED"),
            ("LISTEN_ADDR", "0.0.0.0:9999"),
            ("CLUSTER_GLOBAL_NAMESPACE", "mgmt"),
            ("CLUSTER_DEFAULT_NAMESPACE_DEV", "dev-ns"),
            ("CLUSTER_DEPLOY_FIELD_OWNER", "custom.owner"),
            ("K0RDENT_NAMESPACE_FILTER", "^team-.*$"),
            ("K0RDENT_MGMT_KUBECONFIG_PATH", "/etc/kube/config"),
            ("K0RDENT_MGMT_CONTEXT", "mgmt-cluster"),
        ]))
        .unwrap();
        assert_eq!(settings.auth_mode, AuthMode::OidcRequired);
        assert_eq!(settings.listen_addr.to_string(), "0.0.0.0:9999");
        assert_eq!(settings.global_namespace, "mgmt");
        assert_eq!(settings.default_namespace_dev, "dev-ns");
        assert_eq!(settings.field_owner, "custom.owner");
        assert!(settings.namespace_filter.unwrap().is_match("team-alpha"));
        assert_eq!(settings.kube_context.as_deref(), Some("mgmt-cluster"));
    }

    #[test]
    fn default_dev_namespace_follows_global_namespace() {
        let settings =
            Settings::from_lookup(lookup_from(&[("CLUSTER_GLOBAL_NAMESPACE", "mgmt")])).unwrap();
        assert_eq!(settings.default_namespace_dev, "mgmt");
    }

    #[test]
    fn bad_auth_mode_is_rejected() {
        let err = Settings::from_lookup(lookup_from(&[("AUTH_MODE", "YOLO")])).unwrap_err();
        assert_eq!(err.code(), "invalidParams");
    }

    #[test]
    fn bad_filter_regex_is_rejected() {
        let err =
            Settings::from_lookup(lookup_from(&[("K0RDENT_NAMESPACE_FILTER", "([")])).unwrap_err();
        assert_eq!(err.code(), "invalidParams");
    }
}
