//! Token-scoped Kubernetes client construction.
//!
//! The base connection config is loaded once at startup and never mutated.
//! Each MCP session gets a copy with the session's bearer token swapped into
//! the credential slot, so every API call a session makes is authorized as the
//! caller, not as the server.

use k0rdent_core::{Error, Result, Settings};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use secrecy::SecretString;
use tracing::info;

pub struct ClientFactory {
    base: Config,
}

impl ClientFactory {
    /// Load the base config: explicit kubeconfig path when configured,
    /// otherwise the standard inference chain (KUBECONFIG, in-cluster).
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let config = match &settings.kubeconfig_path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::Unavailable(format!("failed to read kubeconfig {}: {e}", path.display()))
                })?;
                let options = KubeConfigOptions {
                    context: settings.kube_context.clone(),
                    ..Default::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| Error::Unavailable(format!("invalid kubeconfig: {e}")))?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::Unavailable(format!("no kubernetes config available: {e}")))?,
        };
        info!(cluster = %config.cluster_url, "loaded base kubernetes config");
        Ok(Self { base: config })
    }

    pub fn from_config(base: Config) -> Self {
        Self { base }
    }

    /// Copy of the base config scoped to `token`. When a token is present it
    /// replaces the bearer credential and every other auth mechanism is
    /// cleared; an empty session token leaves the base credentials intact
    /// (dev mode).
    pub fn scoped_config(&self, token: Option<&str>) -> Config {
        let mut config = self.base.clone();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            config.auth_info.token = Some(SecretString::new(token.to_string()));
            config.auth_info.token_file = None;
            config.auth_info.username = None;
            config.auth_info.password = None;
            config.auth_info.exec = None;
            config.auth_info.auth_provider = None;
            config.auth_info.client_certificate = None;
            config.auth_info.client_key = None;
            config.auth_info.client_certificate_data = None;
            config.auth_info.client_key_data = None;
        }
        config
    }

    /// Build a client authorized as the session owner.
    pub fn client_for(&self, token: Option<&str>) -> Result<Client> {
        Client::try_from(self.scoped_config(token))
            .map_err(|e| Error::Internal(format!("failed to construct kubernetes client: {e}")))
    }

    pub fn base(&self) -> &Config {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn base_config() -> Config {
        let mut config = Config::new("https://mgmt.example:6443".parse().unwrap());
        config.default_namespace = "kcm-system".to_string();
        config.auth_info.token = Some(SecretString::new("server-token".to_string()));
        config.auth_info.token_file = Some("/var/run/secrets/token".to_string());
        config.auth_info.username = Some("admin".to_string());
        config
    }

    #[test]
    fn scoped_config_swaps_bearer_and_clears_other_auth() {
        let factory = ClientFactory::from_config(base_config());
        let scoped = factory.scoped_config(Some("caller-token"));

        assert_eq!(
            scoped.auth_info.token.as_ref().unwrap().expose_secret(),
            "caller-token"
        );
        assert!(scoped.auth_info.token_file.is_none());
        assert!(scoped.auth_info.username.is_none());
        assert!(scoped.auth_info.password.is_none());
        assert!(scoped.auth_info.exec.is_none());
    }

    #[test]
    fn scoped_config_without_token_keeps_base_credentials() {
        let factory = ClientFactory::from_config(base_config());
        let scoped = factory.scoped_config(None);
        assert_eq!(
            scoped.auth_info.token.as_ref().unwrap().expose_secret(),
            "server-token"
        );
        assert_eq!(
            scoped.auth_info.token_file.as_deref(),
            Some("/var/run/secrets/token")
        );
    }

    #[test]
    fn empty_token_is_treated_as_absent() {
        let factory = ClientFactory::from_config(base_config());
        let scoped = factory.scoped_config(Some(""));
        assert_eq!(
            scoped.auth_info.token.as_ref().unwrap().expose_secret(),
            "server-token"
        );
    }

    #[test]
    fn base_config_is_never_mutated() {
        let factory = ClientFactory::from_config(base_config());
        let _ = factory.scoped_config(Some("caller-token"));
        assert_eq!(
            factory.base().auth_info.token.as_ref().unwrap().expose_secret(),
            "server-token"
        );
        assert!(factory.base().auth_info.token_file.is_some());
    }
}
