//! Per-connection session assembly.
//!
//! A session is the bearer token plus everything derived from it: the
//! token-scoped Kubernetes clients, the event and log providers, the cluster
//! manager and the subscription router. Construction failures are fatal for
//! the session and surface as initialization errors.

use std::sync::Arc;

use k0rdent_catalog::{CatalogClient, Installer};
use k0rdent_core::{Clock, Result, Settings, SystemClock};
use k0rdent_kube::{ClientFactory, EventProvider, LogProvider, NamespacePolicy};
use k0rdent_clusters::ClusterManager;
use kube::Client;
use tracing::info;

use crate::subscriptions::SubscriptionRouter;

/// Process-wide shared state; immutable after startup.
pub struct ServerState {
    pub settings: Settings,
    pub factory: Arc<ClientFactory>,
    pub policy: Arc<NamespacePolicy>,
    pub catalog: Arc<CatalogClient>,
    pub installer: Arc<Installer>,
    pub clock: Arc<dyn Clock>,
}

impl ServerState {
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let factory = Arc::new(ClientFactory::from_settings(&settings).await?);
        let policy = Arc::new(NamespacePolicy::from_settings(&settings));
        let catalog = Arc::new(CatalogClient::new());
        let installer = Arc::new(Installer::new(
            k0rdent_catalog::HelmCli::new(),
            Arc::clone(&catalog),
        ));
        Ok(Self {
            settings,
            factory,
            policy,
            catalog,
            installer,
            clock: Arc::new(SystemClock::new()),
        })
    }
}

/// Everything a tool call or subscription can reach, bound to one client
/// connection and its token.
pub struct Session {
    pub token: Option<String>,
    pub client: Client,
    pub events: Arc<EventProvider>,
    pub logs: Arc<LogProvider>,
    pub clusters: Arc<ClusterManager>,
    pub policy: Arc<NamespacePolicy>,
    pub clock: Arc<dyn Clock>,
    pub subscriptions: SubscriptionRouter,
}

impl Drop for Session {
    fn drop(&mut self) {
        // session teardown terminates every producer it owns
        self.subscriptions.shutdown();
    }
}

/// Builds sessions from bearer tokens.
pub struct SessionRuntime {
    state: Arc<ServerState>,
}

impl SessionRuntime {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// The transport's session-init hook lands here.
    pub async fn open_session(&self, token: Option<String>) -> Result<Arc<Session>> {
        let client = self.state.factory.client_for(token.as_deref())?;
        let events = Arc::new(EventProvider::new(
            client.clone(),
            Arc::clone(&self.state.clock),
        ));
        events.probe(&self.state.settings.global_namespace).await;

        let logs = Arc::new(LogProvider::new(client.clone()));
        let clusters = Arc::new(ClusterManager::new(
            client.clone(),
            Arc::clone(&self.state.policy),
            self.state.settings.field_owner.clone(),
            Arc::clone(&self.state.clock),
        ));

        info!(authenticated = token.is_some(), "session opened");
        Ok(Arc::new(Session {
            token,
            client,
            events,
            logs,
            clusters,
            policy: Arc::clone(&self.state.policy),
            clock: Arc::clone(&self.state.clock),
            subscriptions: SubscriptionRouter::new(),
        }))
    }
}
