//! Subscription router: `k0rdent://` URIs to producer tasks.
//!
//! Each URI gets one long-running producer; repeated subscribes to the same
//! URI share it. Producers publish onto bounded drop-oldest queues; a
//! forwarder task stores the latest payload (served by resource reads) and
//! raises a resource-updated notification per delivery. Cancellation fans
//! out from the session's root token.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use k0rdent_core::{Error, QueueReceiver, Result};
use k0rdent_kube::{EventFilter, LogQuery};
use k0rdent_clusters::monitor::spawn_monitor;
use rmcp::model::ResourceUpdatedNotificationParam;
use rmcp::{Peer, RoleServer};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::Session;

pub const URI_SCHEME: &str = "k0rdent://";
/// Log lines retained for resource reads.
const LOG_TAIL_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTarget {
    Events { namespace: String },
    PodLogs { namespace: String, pod: String, container: String },
    ClusterMonitor { namespace: String, name: String },
    Graph,
}

/// Parse `k0rdent://<kind>/<path…>`.
pub fn parse_subscription_uri(uri: &str) -> Result<SubscriptionTarget> {
    let rest = uri
        .strip_prefix(URI_SCHEME)
        .ok_or_else(|| Error::invalid_params(format!("subscription uri must start with {URI_SCHEME}")))?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let (kind, path) = segments
        .split_first()
        .ok_or_else(|| Error::invalid_params("subscription uri has no kind"))?;

    match (*kind, path) {
        ("events", [namespace]) => Ok(SubscriptionTarget::Events {
            namespace: namespace.to_string(),
        }),
        ("podlogs", [namespace, pod, container]) => Ok(SubscriptionTarget::PodLogs {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
        }),
        ("cluster-monitor", [namespace, name]) => Ok(SubscriptionTarget::ClusterMonitor {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }),
        ("graph", _) => Ok(SubscriptionTarget::Graph),
        ("events" | "podlogs" | "cluster-monitor", _) => Err(Error::invalid_params(format!(
            "subscription uri {uri:?} has the wrong number of path segments"
        ))),
        (other, _) => Err(Error::invalid_params(format!(
            "unknown subscription kind {other:?}"
        ))),
    }
}

struct ActiveProducer {
    cancel: CancellationToken,
    subscribers: usize,
}

pub struct SubscriptionRouter {
    root: CancellationToken,
    active: Mutex<HashMap<String, ActiveProducer>>,
    latest: Arc<RwLock<HashMap<String, Value>>>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            active: Mutex::new(HashMap::new()),
            latest: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Terminate every producer this session owns.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Latest payload published on a URI, for resource reads.
    pub async fn latest(&self, uri: &str) -> Option<Value> {
        self.latest.read().await.get(uri).cloned()
    }

    pub async fn subscribe(
        &self,
        session: &Session,
        uri: &str,
        peer: Peer<RoleServer>,
    ) -> Result<()> {
        let target = parse_subscription_uri(uri)?;

        let mut active = self.active.lock().await;
        if let Some(existing) = active.get_mut(uri) {
            existing.subscribers += 1;
            debug!(uri, subscribers = existing.subscribers, "joined existing producer");
            return Ok(());
        }

        let cancel = self.root.child_token();
        self.start_producer(session, uri, target, peer, cancel.clone())
            .await?;
        active.insert(
            uri.to_string(),
            ActiveProducer {
                cancel,
                subscribers: 1,
            },
        );
        Ok(())
    }

    pub async fn unsubscribe(&self, uri: &str) -> Result<()> {
        let mut active = self.active.lock().await;
        let Some(producer) = active.get_mut(uri) else {
            return Err(Error::NotFound(format!("no active subscription for {uri:?}")));
        };
        producer.subscribers -= 1;
        if producer.subscribers == 0 {
            producer.cancel.cancel();
            active.remove(uri);
            debug!(uri, "subscription cancelled");
        }
        Ok(())
    }

    async fn start_producer(
        &self,
        session: &Session,
        uri: &str,
        target: SubscriptionTarget,
        peer: Peer<RoleServer>,
        cancel: CancellationToken,
    ) -> Result<()> {
        match target {
            SubscriptionTarget::Events { namespace } => {
                let namespace = session.policy.resolve(Some(&namespace))?;
                let (rx, _errors) =
                    session
                        .events
                        .watch(&namespace, EventFilter::default(), cancel.clone());
                self.spawn_json_forwarder(uri, rx, peer, cancel);
                Ok(())
            }
            SubscriptionTarget::PodLogs { namespace, pod, container } => {
                let namespace = session.policy.resolve(Some(&namespace))?;
                let query = LogQuery {
                    namespace,
                    pod,
                    container,
                    since_seconds: None,
                    tail_lines: Some(LOG_TAIL_CAPACITY as i64),
                };
                let rx = session.logs.stream(&query, cancel.clone()).await?;
                self.spawn_line_forwarder(uri, rx, peer, cancel);
                Ok(())
            }
            SubscriptionTarget::ClusterMonitor { namespace, name } => {
                let namespace = session.policy.resolve(Some(&namespace))?;
                let rx = spawn_monitor(
                    Arc::clone(&session.clusters),
                    Arc::clone(&session.events),
                    Arc::clone(&session.clock),
                    namespace,
                    name,
                    cancel.clone(),
                );
                self.spawn_json_forwarder(uri, rx, peer, cancel);
                Ok(())
            }
            SubscriptionTarget::Graph => Err(Error::invalid_params(
                "graph subscriptions are not available",
            )),
        }
    }

    /// Forward serializable updates: store the latest payload and notify.
    fn spawn_json_forwarder<T: Serialize + Send + 'static>(
        &self,
        uri: &str,
        mut rx: QueueReceiver<T>,
        peer: Peer<RoleServer>,
        cancel: CancellationToken,
    ) {
        let uri = uri.to_string();
        let latest = Arc::clone(&self.latest);
        tokio::spawn(async move {
            loop {
                let update = tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = rx.recv() => match update {
                        Some(update) => update,
                        None => break,
                    }
                };
                let Ok(payload) = serde_json::to_value(&update) else {
                    continue;
                };
                latest.write().await.insert(uri.clone(), payload);
                if notify(&peer, &uri).await.is_err() {
                    break;
                }
            }
            debug!(%uri, "subscription forwarder ended");
        });
    }

    /// Forward log lines, retaining a bounded tail for resource reads.
    fn spawn_line_forwarder(
        &self,
        uri: &str,
        mut rx: QueueReceiver<String>,
        peer: Peer<RoleServer>,
        cancel: CancellationToken,
    ) {
        let uri = uri.to_string();
        let latest = Arc::clone(&self.latest);
        tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::with_capacity(LOG_TAIL_CAPACITY);
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = rx.recv() => match line {
                        Some(line) => line,
                        None => break,
                    }
                };
                if tail.len() == LOG_TAIL_CAPACITY {
                    tail.pop_front();
                }
                tail.push_back(line);
                let payload = Value::from(tail.iter().cloned().collect::<Vec<String>>());
                latest.write().await.insert(uri.clone(), payload);
                if notify(&peer, &uri).await.is_err() {
                    break;
                }
            }
            debug!(%uri, "log forwarder ended");
        });
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}

async fn notify(peer: &Peer<RoleServer>, uri: &str) -> std::result::Result<(), ()> {
    match peer
        .notify_resource_updated(ResourceUpdatedNotificationParam {
            uri: uri.to_string(),
        })
        .await
    {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(uri, "dropping subscription peer: {err}");
            Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind() {
        assert_eq!(
            parse_subscription_uri("k0rdent://events/kcm-system").unwrap(),
            SubscriptionTarget::Events {
                namespace: "kcm-system".into()
            }
        );
        assert_eq!(
            parse_subscription_uri("k0rdent://podlogs/demo/web-0/nginx").unwrap(),
            SubscriptionTarget::PodLogs {
                namespace: "demo".into(),
                pod: "web-0".into(),
                container: "nginx".into()
            }
        );
        assert_eq!(
            parse_subscription_uri("k0rdent://cluster-monitor/kcm-system/e2e-az").unwrap(),
            SubscriptionTarget::ClusterMonitor {
                namespace: "kcm-system".into(),
                name: "e2e-az".into()
            }
        );
        assert_eq!(
            parse_subscription_uri("k0rdent://graph/anything").unwrap(),
            SubscriptionTarget::Graph
        );
    }

    #[test]
    fn rejects_unknown_kind_and_bad_shapes() {
        assert_eq!(
            parse_subscription_uri("k0rdent://nope/x").unwrap_err().code(),
            "invalidParams"
        );
        assert_eq!(
            parse_subscription_uri("k0rdent://events").unwrap_err().code(),
            "invalidParams"
        );
        assert_eq!(
            parse_subscription_uri("k0rdent://podlogs/ns/pod").unwrap_err().code(),
            "invalidParams"
        );
        assert_eq!(
            parse_subscription_uri("other://events/ns").unwrap_err().code(),
            "invalidParams"
        );
    }
}
