//! The cluster-monitor producer task.
//!
//! One task per subscription. It merges a polling loop over the cluster
//! deployment with a namespace-scoped event watch; both feed one select so
//! cancellation is honored at every blocking point. The stream is lazy,
//! infinite until a terminal phase, and never restarts: exactly one terminal
//! update is emitted iff the stream closes cleanly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k0rdent_core::{bounded_queue, Clock, Error, QueueReceiver, QueueSender};
use k0rdent_kube::{EventFilter, EventProvider, EventRecord, ObjectRef};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::phase::{detect_phase, estimate_progress, ProvisioningPhase};
use super::significant::{classify_event, event_in_scope, Deduper, Severity};
use crate::deploy::ClusterManager;
use crate::summary::{find_condition, ClusterSummary, Condition};

const MONITOR_QUEUE_CAPACITY: usize = 64;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const RECENT_EVENT_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Event,
    Status,
    Synthesized,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub timestamp: DateTime<Utc>,
    pub phase: ProvisioningPhase,
    pub progress_percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
    pub source: UpdateSource,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_object: Option<ObjectRef>,
    pub terminal: bool,
}

/// Start a monitor for `<namespace>/<name>`. Updates arrive on the returned
/// queue; the queue closes on terminal phase or cancellation.
pub fn spawn_monitor(
    manager: Arc<ClusterManager>,
    events: Arc<EventProvider>,
    clock: Arc<dyn Clock>,
    namespace: String,
    name: String,
    cancel: CancellationToken,
) -> QueueReceiver<ProgressUpdate> {
    let (tx, rx) = bounded_queue(MONITOR_QUEUE_CAPACITY);
    tokio::spawn(async move {
        Monitor {
            manager,
            events,
            clock,
            namespace,
            name,
            tx,
        }
        .run(cancel)
        .await;
    });
    rx
}

struct Monitor {
    manager: Arc<ClusterManager>,
    events: Arc<EventProvider>,
    clock: Arc<dyn Clock>,
    namespace: String,
    name: String,
    tx: QueueSender<ProgressUpdate>,
}

impl Monitor {
    fn emit(
        &self,
        phase: ProvisioningPhase,
        conditions: &[Condition],
        message: String,
        reason: String,
        source: UpdateSource,
        severity: Severity,
        related_object: Option<ObjectRef>,
    ) -> bool {
        let terminal = phase.is_terminal() && source != UpdateSource::Event;
        self.tx.push(ProgressUpdate {
            timestamp: self.clock.now(),
            phase,
            progress_percent: estimate_progress(phase, conditions),
            message,
            reason,
            source,
            severity,
            related_object,
            terminal,
        });
        terminal
    }

    fn status_message(summary: &ClusterSummary, phase: ProvisioningPhase) -> String {
        if !summary.message.is_empty() {
            summary.message.clone()
        } else {
            format!("cluster {} is {}", summary.name, phase)
        }
    }

    fn status_reason(summary: &ClusterSummary) -> String {
        find_condition(&summary.conditions, "Ready")
            .map(|c| c.reason.clone())
            .unwrap_or_default()
    }

    async fn run(self, cancel: CancellationToken) {
        let (mut event_rx, mut event_err_rx) =
            self.events
                .watch(&self.namespace, EventFilter::default(), cancel.child_token());

        let mut dedup = Deduper::new(Arc::clone(&self.clock));
        let mut recent_events: Vec<EventRecord> = Vec::new();
        let mut last_conditions: Vec<Condition> = Vec::new();
        let mut last_phase = ProvisioningPhase::Unknown;
        let mut last_message = String::new();
        let mut events_open = true;
        let mut errors_open = true;

        // synthesized "current state" update
        match self.manager.get_summary(&self.namespace, &self.name).await {
            Ok(summary) => {
                let phase = detect_phase(&summary, &recent_events, self.clock.now());
                let message = Self::status_message(&summary, phase);
                let severity = if phase == ProvisioningPhase::Failed {
                    Severity::Error
                } else {
                    Severity::Info
                };
                last_conditions = summary.conditions.clone();
                last_phase = phase;
                last_message = message.clone();
                if self.emit(
                    phase,
                    &summary.conditions,
                    message,
                    Self::status_reason(&summary),
                    UpdateSource::Synthesized,
                    severity,
                    None,
                ) {
                    self.tx.close();
                    return;
                }
            }
            Err(Error::NotFound(_)) => {
                self.emit(
                    ProvisioningPhase::Failed,
                    &[],
                    format!("cluster deployment {}/{} not found", self.namespace, self.name),
                    "NotFound".to_string(),
                    UpdateSource::Synthesized,
                    Severity::Error,
                    None,
                );
                self.tx.close();
                return;
            }
            Err(err) => {
                warn!(
                    namespace = %self.namespace,
                    name = %self.name,
                    "initial cluster fetch failed: {err}"
                );
            }
        }

        let mut ticker = tokio::time::interval(DEFAULT_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.reset();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // cancelled streams end without a terminal update
                    self.tx.close();
                    return;
                }

                _ = ticker.tick() => {
                    let summary = match self.manager.get_summary(&self.namespace, &self.name).await {
                        Ok(summary) => summary,
                        Err(Error::NotFound(_)) => {
                            self.emit(
                                ProvisioningPhase::Failed,
                                &last_conditions,
                                format!("cluster deployment {}/{} no longer exists", self.namespace, self.name),
                                "NotFound".to_string(),
                                UpdateSource::Status,
                                Severity::Error,
                                None,
                            );
                            self.tx.close();
                            return;
                        }
                        Err(err) => {
                            debug!(name = %self.name, "cluster poll failed: {err}");
                            continue;
                        }
                    };

                    let now = self.clock.now();
                    let window = chrono::Duration::seconds(RECENT_EVENT_WINDOW_SECS);
                    recent_events.retain(|e| {
                        e.last_activity().is_some_and(|ts| now - ts <= window)
                    });

                    let phase = detect_phase(&summary, &recent_events, now);
                    let message = Self::status_message(&summary, phase);
                    last_conditions = summary.conditions.clone();

                    if phase != last_phase || message != last_message {
                        last_phase = phase;
                        last_message = message.clone();
                        let severity = if phase == ProvisioningPhase::Failed {
                            Severity::Error
                        } else {
                            Severity::Info
                        };
                        let terminal = self.emit(
                            phase,
                            &summary.conditions,
                            message,
                            Self::status_reason(&summary),
                            UpdateSource::Status,
                            severity,
                            None,
                        );
                        if terminal {
                            self.tx.close();
                            return;
                        }
                    }
                }

                event = event_rx.recv(), if events_open => {
                    let Some(record) = event else {
                        // the watch ended; polling alone carries the feed
                        events_open = false;
                        continue;
                    };
                    if !event_in_scope(&record, &self.name) {
                        continue;
                    }
                    recent_events.push(record.clone());

                    let Some(significant) = classify_event(&record) else {
                        continue;
                    };
                    if !dedup.should_emit(&record) {
                        continue;
                    }
                    let phase = significant.phase_hint.unwrap_or(last_phase);
                    self.emit(
                        phase,
                        &last_conditions,
                        record.message.clone(),
                        record.reason.clone(),
                        UpdateSource::Event,
                        significant.severity,
                        Some(record.involved_object.clone()),
                    );
                }

                err = event_err_rx.recv(), if errors_open => {
                    match err {
                        Some(err) => debug!(name = %self.name, "monitor event watch error: {err}"),
                        None => errors_open = false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_update_serializes_to_the_wire_shape() {
        let update = ProgressUpdate {
            timestamp: "2026-01-01T00:00:00Z".parse().unwrap(),
            phase: ProvisioningPhase::Provisioning,
            progress_percent: 25,
            message: "infrastructure is being created".into(),
            reason: "Provisioning".into(),
            source: UpdateSource::Status,
            severity: Severity::Info,
            related_object: None,
            terminal: false,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["phase"], "Provisioning");
        assert_eq!(value["source"], "status");
        assert_eq!(value["severity"], "info");
        assert_eq!(value["progressPercent"], 25);
        assert_eq!(value["terminal"], false);
        assert!(value.get("relatedObject").is_none());
    }

    #[test]
    fn terminal_phases() {
        assert!(ProvisioningPhase::Ready.is_terminal());
        assert!(ProvisioningPhase::Failed.is_terminal());
        assert!(!ProvisioningPhase::Installing.is_terminal());
    }
}
