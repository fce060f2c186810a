//! Namespace, event and pod-log read tools.

use std::sync::Arc;

use k0rdent_core::Result;
use k0rdent_kube::{EventFilter, LogQuery};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsInput {
    namespace: String,
    #[serde(flatten)]
    filter: EventFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodLogsInput {
    namespace: String,
    pod: String,
    container: String,
    since_seconds: Option<i64>,
    tail_lines: Option<i64>,
}

pub async fn list_namespaces(session: &Arc<Session>) -> Result<Value> {
    let namespaces = session.policy.allowed_namespaces(&session.client).await?;
    Ok(json!({"namespaces": namespaces}))
}

pub async fn list_events(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: EventsInput = serde_json::from_value(args)?;
    let namespace = session.policy.resolve(Some(&input.namespace))?;
    let events = session.events.list(&namespace, &input.filter).await?;
    Ok(json!({"events": events}))
}

pub async fn get_pod_logs(session: &Arc<Session>, args: Value) -> Result<Value> {
    let input: PodLogsInput = serde_json::from_value(args)?;
    let namespace = session.policy.resolve(Some(&input.namespace))?;
    let query = LogQuery {
        namespace: namespace.clone(),
        pod: input.pod,
        container: input.container,
        since_seconds: input.since_seconds,
        tail_lines: input.tail_lines,
    };
    let logs = session.logs.fetch(&query).await?;
    Ok(json!({
        "namespace": namespace,
        "pod": query.pod,
        "container": query.container,
        "logs": logs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_input_flattens_the_filter() {
        let input: EventsInput = serde_json::from_value(json!({
            "namespace": "demo",
            "types": ["Warning"],
            "forKind": "ClusterDeployment",
            "forName": "e2e-az",
            "sinceSeconds": 300,
            "limit": 20
        }))
        .unwrap();
        assert_eq!(input.namespace, "demo");
        assert_eq!(input.filter.types, vec!["Warning"]);
        assert_eq!(input.filter.for_kind.as_deref(), Some("ClusterDeployment"));
        assert_eq!(input.filter.since_seconds, Some(300));
        assert_eq!(input.filter.limit, Some(20));
    }
}
