//! Kubernetes Events with API-version fallback.
//!
//! The provider prefers `events.k8s.io/v1` and downgrades permanently to
//! `core/v1` on the first NotFound/Forbidden, whether that happens during the
//! startup probe or a later list/watch. The fallback flag is shared by every
//! call in the session and guarded by a reader-writer lock: readers on every
//! probe of the flag, one writer on downgrade. The flag never flips back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k0rdent_core::{bounded_queue, Clock, Error, QueueReceiver, QueueSender, Result};
use kube::api::ListParams;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of a watch delivery queue; overflow drops the oldest delta.
const WATCH_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

/// Transport-neutral event shape, identical for both source API versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub name: String,
    pub namespace: String,
    pub reason: String,
    pub message: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub involved_object: ObjectRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_last_observed: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Most recent timestamp the event carries, across both API shapes.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        [
            self.series_last_observed,
            self.event_time,
            self.last_timestamp,
            self.first_timestamp,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

fn parse_time(v: &Value) -> Option<DateTime<Utc>> {
    v.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Build a record from the serialized object. `core/v1` puts the subject in
/// `involvedObject` and the text in `message`; `events.k8s.io/v1` uses
/// `regarding` and `note` with deprecated compatibility fields.
pub fn record_from_value(v: &Value) -> EventRecord {
    let str_at = |path: &[&str]| -> String {
        let mut cur = v;
        for key in path {
            match cur.get(key) {
                Some(next) => cur = next,
                None => return String::new(),
            }
        }
        cur.as_str().unwrap_or_default().to_string()
    };

    let involved = v
        .get("involvedObject")
        .or_else(|| v.get("regarding"))
        .cloned()
        .unwrap_or(Value::Null);

    let message = {
        let m = str_at(&["message"]);
        if m.is_empty() { str_at(&["note"]) } else { m }
    };

    let first_timestamp = v
        .get("firstTimestamp")
        .or_else(|| v.get("deprecatedFirstTimestamp"))
        .and_then(|t| parse_time(t))
        .or_else(|| v.pointer("/metadata/creationTimestamp").and_then(parse_time));
    let last_timestamp = v
        .get("lastTimestamp")
        .or_else(|| v.get("deprecatedLastTimestamp"))
        .and_then(|t| parse_time(t));

    let count = v
        .get("count")
        .or_else(|| v.get("deprecatedCount"))
        .and_then(Value::as_i64)
        .unwrap_or(1);

    EventRecord {
        name: str_at(&["metadata", "name"]),
        namespace: str_at(&["metadata", "namespace"]),
        reason: str_at(&["reason"]),
        message,
        event_type: str_at(&["type"]),
        involved_object: ObjectRef {
            kind: involved.get("kind").and_then(Value::as_str).unwrap_or_default().to_string(),
            name: involved.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            namespace: involved
                .get("namespace")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            uid: involved.get("uid").and_then(Value::as_str).unwrap_or_default().to_string(),
        },
        first_timestamp,
        last_timestamp,
        event_time: v.get("eventTime").and_then(parse_time),
        count,
        series_count: v.pointer("/series/count").and_then(Value::as_i64),
        series_last_observed: v
            .pointer("/series/lastObservedTime")
            .and_then(parse_time),
    }
}

/// Client-side list/watch predicates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Event types to keep (`Normal`, `Warning`); empty keeps both.
    #[serde(default)]
    pub types: Vec<String>,
    pub for_kind: Option<String>,
    pub for_name: Option<String>,
    pub since_seconds: Option<i64>,
    pub limit: Option<usize>,
}

impl EventFilter {
    /// Whether a record passes all predicates except `limit` (applied as a
    /// post-slice by the caller). Recency is strict: the most recent
    /// timestamp must be after `now - since_seconds`.
    pub fn matches(&self, record: &EventRecord, now: DateTime<Utc>) -> bool {
        if !self.types.is_empty() && !self.types.iter().any(|t| t == &record.event_type) {
            return false;
        }
        if let Some(kind) = &self.for_kind {
            if !kind.eq_ignore_ascii_case(&record.involved_object.kind) {
                return false;
            }
        }
        if let Some(name) = &self.for_name {
            if name != &record.involved_object.name {
                return false;
            }
        }
        if let Some(since) = self.since_seconds {
            let cutoff = now - chrono::Duration::seconds(since);
            match record.last_activity() {
                Some(ts) if ts > cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

fn events_v1_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("events.k8s.io", "v1", "Event"),
        "events",
    )
}

fn core_v1_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk("", "v1", "Event"), "events")
}

fn is_missing_or_forbidden(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404 || resp.code == 403)
}

fn watch_error_is_missing_or_forbidden(err: &watcher::Error) -> bool {
    match err {
        watcher::Error::InitialListFailed(e)
        | watcher::Error::WatchStartFailed(e)
        | watcher::Error::WatchFailed(e) => is_missing_or_forbidden(e),
        watcher::Error::WatchError(resp) => resp.code == 404 || resp.code == 403,
        _ => false,
    }
}

pub struct EventProvider {
    client: Client,
    clock: Arc<dyn Clock>,
    /// True once we have downgraded to `core/v1`. Guarded: concurrent list
    /// calls in the same session race on this otherwise.
    use_core_api: Arc<RwLock<bool>>,
}

impl EventProvider {
    pub fn new(client: Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            use_core_api: Arc::new(RwLock::new(false)),
        }
    }

    fn api(&self, namespace: &str, use_core: bool) -> Api<DynamicObject> {
        let resource = if use_core {
            core_v1_resource()
        } else {
            events_v1_resource()
        };
        Api::namespaced_with(self.client.clone(), namespace, &resource)
    }

    async fn downgrade(&self, context: &str) {
        let mut flag = self.use_core_api.write().await;
        if !*flag {
            warn!("events.k8s.io/v1 unavailable during {context}, falling back to core/v1 events");
            *flag = true;
        }
    }

    pub async fn uses_core_api(&self) -> bool {
        *self.use_core_api.read().await
    }

    /// Startup probe: one cheap list against the preferred API. Failure to
    /// probe for any other reason is tolerated; the first real call repeats
    /// the check.
    pub async fn probe(&self, namespace: &str) {
        if *self.use_core_api.read().await {
            return;
        }
        let api = self.api(namespace, false);
        match api.list(&ListParams::default().limit(1)).await {
            Ok(_) => debug!("events.k8s.io/v1 available"),
            Err(err) if is_missing_or_forbidden(&err) => self.downgrade("probe").await,
            Err(err) => debug!("event api probe inconclusive: {err}"),
        }
    }

    /// List events in a namespace, filtered client-side. Ordering is by most
    /// recent activity, oldest first, so `limit` truncation is deterministic.
    pub async fn list(&self, namespace: &str, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        let use_core = *self.use_core_api.read().await;
        let listed = match self.api(namespace, use_core).list(&ListParams::default()).await {
            Ok(listed) => listed,
            Err(err) if !use_core && is_missing_or_forbidden(&err) => {
                self.downgrade("list").await;
                self.api(namespace, true)
                    .list(&ListParams::default())
                    .await
                    .map_err(crate::map_kube_error)?
            }
            Err(err) => return Err(crate::map_kube_error(err)),
        };

        let now = self.clock.now();
        let mut records: Vec<EventRecord> = listed
            .items
            .into_iter()
            .filter_map(|obj| serde_json::to_value(obj).ok())
            .map(|v| record_from_value(&v))
            .filter(|r| filter.matches(r, now))
            .collect();
        records.sort_by(|a, b| {
            a.last_activity()
                .cmp(&b.last_activity())
                .then_with(|| a.name.cmp(&b.name))
        });
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Watch events in a namespace. Deltas (including deletions) are
    /// re-filtered through the same predicates and delivered on a bounded
    /// drop-oldest queue; retriable stream failures are signaled on the error
    /// channel while the watch self-heals. The task exits when cancelled.
    pub fn watch(
        &self,
        namespace: &str,
        filter: EventFilter,
        cancel: CancellationToken,
    ) -> (QueueReceiver<EventRecord>, mpsc::Receiver<Error>) {
        let (tx, rx) = bounded_queue(WATCH_QUEUE_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(4);

        let client = self.client.clone();
        let clock = Arc::clone(&self.clock);
        let flag = Arc::clone(&self.use_core_api);
        let namespace = namespace.to_string();

        tokio::spawn(async move {
            watch_loop(client, clock, flag, namespace, filter, cancel, tx, err_tx).await;
        });

        (rx, err_rx)
    }
}

#[allow(clippy::too_many_arguments)]
async fn watch_loop(
    client: Client,
    clock: Arc<dyn Clock>,
    flag: Arc<RwLock<bool>>,
    namespace: String,
    filter: EventFilter,
    cancel: CancellationToken,
    tx: QueueSender<EventRecord>,
    err_tx: mpsc::Sender<Error>,
) {
    loop {
        let use_core = *flag.read().await;
        let resource = if use_core {
            core_v1_resource()
        } else {
            events_v1_resource()
        };
        let api: Api<DynamicObject> = Api::namespaced_with(client.clone(), &namespace, &resource);
        let mut stream = watcher(api, watcher::Config::default())
            .touched_objects()
            .boxed();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tx.close();
                    return;
                }
                item = stream.next() => match item {
                    Some(Ok(obj)) => {
                        if let Ok(value) = serde_json::to_value(obj) {
                            let record = record_from_value(&value);
                            if filter.matches(&record, clock.now()) {
                                tx.push(record);
                            }
                        }
                    }
                    Some(Err(err)) => {
                        if !use_core && watch_error_is_missing_or_forbidden(&err) {
                            let mut guard = flag.write().await;
                            if !*guard {
                                warn!("events.k8s.io/v1 watch unavailable, falling back to core/v1 events");
                                *guard = true;
                            }
                            drop(guard);
                            break; // rebuild the stream on core/v1
                        }
                        let _ = err_tx.try_send(Error::Unavailable(format!("event watch error: {err}")));
                        // watcher re-lists and resumes on its own
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    None => {
                        let _ = err_tx.try_send(Error::Unavailable("event watch stream closed".into()));
                        tx.close();
                        return;
                    }
                }
            }
        }
    }
}
