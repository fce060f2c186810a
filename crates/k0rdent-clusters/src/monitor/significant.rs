//! Significant-event classification and deduplication for the monitor feed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use k0rdent_core::Clock;
use k0rdent_kube::EventRecord;
use serde::Serialize;

use super::phase::ProvisioningPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A raw event promoted to the progress feed.
#[derive(Debug, Clone)]
pub struct SignificantEvent {
    pub phase_hint: Option<ProvisioningPhase>,
    pub severity: Severity,
}

/// Reasons that never produce progress updates regardless of scope.
const SUPPRESSED_REASONS: &[&str] = &["ArtifactUpToDate", "OwnerRefNotSet", "GitOperationSucceeded"];

/// Normalized (lowercase, alphanumeric-only) message fragments that never
/// produce progress updates.
const SUPPRESSED_MESSAGE_FRAGMENTS: &[&str] = &[
    "waitingforcontrolplaneinitialization",
    "waitingforclusterinfrastructure",
];

/// Curated `(reason, involved kind, message substrings)` patterns. The first
/// match decides the implied phase and severity. An empty kind or substring
/// list matches anything.
struct EventPattern {
    reason: &'static str,
    kind: &'static str,
    message_contains: &'static [&'static str],
    phase: Option<ProvisioningPhase>,
    severity: Severity,
}

const EVENT_PATTERNS: &[EventPattern] = &[
    EventPattern {
        reason: "CAPIClusterIsProvisioning",
        kind: "",
        message_contains: &[],
        phase: Some(ProvisioningPhase::Provisioning),
        severity: Severity::Info,
    },
    EventPattern {
        reason: "CAPIClusterIsProvisioned",
        kind: "",
        message_contains: &[],
        phase: Some(ProvisioningPhase::Installing),
        severity: Severity::Info,
    },
    EventPattern {
        reason: "SuccessfulCreate",
        kind: "MachineSet",
        message_contains: &[],
        phase: Some(ProvisioningPhase::Scaling),
        severity: Severity::Info,
    },
    EventPattern {
        reason: "ControlPlaneReady",
        kind: "",
        message_contains: &[],
        phase: Some(ProvisioningPhase::Bootstrapping),
        severity: Severity::Info,
    },
    EventPattern {
        reason: "ChartInstallSucceeded",
        kind: "",
        message_contains: &[],
        phase: Some(ProvisioningPhase::Installing),
        severity: Severity::Info,
    },
    EventPattern {
        reason: "ServiceSetCollectServiceStatusesFailed",
        kind: "",
        message_contains: &[],
        phase: Some(ProvisioningPhase::Installing),
        severity: Severity::Warning,
    },
    EventPattern {
        reason: "FailedCreate",
        kind: "",
        message_contains: &[],
        phase: None,
        severity: Severity::Error,
    },
    EventPattern {
        reason: "ReconciliationFailed",
        kind: "",
        message_contains: &[],
        phase: None,
        severity: Severity::Error,
    },
    EventPattern {
        reason: "",
        kind: "Machine",
        message_contains: &["deleted"],
        phase: Some(ProvisioningPhase::Scaling),
        severity: Severity::Warning,
    },
];

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Whether an event concerns this cluster: the involved object name equals
/// the cluster name, is prefixed with `<cluster>-`, contains it, or the
/// message mentions the cluster name.
pub fn event_in_scope(event: &EventRecord, cluster_name: &str) -> bool {
    if cluster_name.is_empty() {
        return false;
    }
    let involved = &event.involved_object.name;
    involved == cluster_name
        || involved.starts_with(&format!("{cluster_name}-"))
        || involved.contains(cluster_name)
        || event.message.contains(cluster_name)
}

/// Classify a scope-matched event. `None` means the event is noise.
pub fn classify_event(event: &EventRecord) -> Option<SignificantEvent> {
    if SUPPRESSED_REASONS.iter().any(|r| *r == event.reason) {
        return None;
    }
    let normalized_message = normalize(&event.message);
    if SUPPRESSED_MESSAGE_FRAGMENTS
        .iter()
        .any(|f| normalized_message.contains(f))
    {
        return None;
    }

    for pattern in EVENT_PATTERNS {
        if !pattern.reason.is_empty() && pattern.reason != event.reason {
            continue;
        }
        if !pattern.kind.is_empty() && pattern.kind != event.involved_object.kind {
            continue;
        }
        if !pattern.message_contains.is_empty()
            && !pattern
                .message_contains
                .iter()
                .any(|needle| normalized_message.contains(&normalize(needle)))
        {
            continue;
        }
        return Some(SignificantEvent {
            phase_hint: pattern.phase,
            severity: pattern.severity,
        });
    }

    // Unmatched warnings still surface; unmatched normal events do not.
    if event.event_type == "Warning" {
        Some(SignificantEvent {
            phase_hint: None,
            severity: Severity::Warning,
        })
    } else {
        None
    }
}

/// Per-subscription deduplication keyed by `(reason, kind, name)`. Reasons
/// with known noisy cadence carry their own window; everything else uses the
/// default.
pub struct Deduper {
    clock: Arc<dyn Clock>,
    default_window: Duration,
    reason_windows: HashMap<&'static str, Duration>,
    last_emitted: HashMap<(String, String, String), Duration>,
}

impl Deduper {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut reason_windows = HashMap::new();
        reason_windows.insert("CAPIClusterIsProvisioning", Duration::from_secs(60));
        reason_windows.insert(
            "ServiceSetCollectServiceStatusesFailed",
            Duration::from_secs(5 * 60),
        );
        Self {
            clock,
            default_window: Self::DEFAULT_WINDOW,
            reason_windows,
            last_emitted: HashMap::new(),
        }
    }

    fn window_for(&self, reason: &str) -> Duration {
        self.reason_windows
            .get(reason)
            .copied()
            .unwrap_or(self.default_window)
    }

    /// Whether an event with this identity may be emitted now. Emitting
    /// records the time; suppressed duplicates do not extend the window.
    pub fn should_emit(&mut self, event: &EventRecord) -> bool {
        let key = (
            event.reason.clone(),
            event.involved_object.kind.clone(),
            event.involved_object.name.clone(),
        );
        let now = self.clock.monotonic();
        let window = self.window_for(&event.reason);
        match self.last_emitted.get(&key) {
            Some(last) if now.saturating_sub(*last) < window => false,
            _ => {
                self.last_emitted.insert(key, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use k0rdent_core::ManualClock;
    use k0rdent_kube::ObjectRef;

    fn event(reason: &str, kind: &str, name: &str, message: &str, event_type: &str) -> EventRecord {
        EventRecord {
            name: "evt".into(),
            namespace: "kcm-system".into(),
            reason: reason.into(),
            message: message.into(),
            event_type: event_type.into(),
            involved_object: ObjectRef {
                kind: kind.into(),
                name: name.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn scope_check_variants() {
        let exact = event("R", "ClusterDeployment", "demo", "", "Normal");
        assert!(event_in_scope(&exact, "demo"));

        let prefixed = event("R", "Machine", "demo-md-0-abcde", "", "Normal");
        assert!(event_in_scope(&prefixed, "demo"));

        let mentioned = event("R", "HelmRelease", "ingress", "installing into demo", "Normal");
        assert!(event_in_scope(&mentioned, "demo"));

        let unrelated = event("R", "Pod", "other-thing", "nothing here", "Normal");
        assert!(!event_in_scope(&unrelated, "demo"));
    }

    #[test]
    fn suppressed_reasons_are_dropped() {
        let ev = event("ArtifactUpToDate", "HelmChart", "demo-chart", "", "Normal");
        assert!(classify_event(&ev).is_none());
    }

    #[test]
    fn suppressed_message_fragments_are_dropped_after_normalization() {
        let ev = event(
            "SomeReason",
            "Cluster",
            "demo",
            "Waiting for control plane initialization",
            "Warning",
        );
        assert!(classify_event(&ev).is_none());
    }

    #[test]
    fn pattern_table_assigns_phase_and_severity() {
        let ev = event("CAPIClusterIsProvisioning", "ClusterDeployment", "demo", "", "Normal");
        let sig = classify_event(&ev).unwrap();
        assert_eq!(sig.phase_hint, Some(ProvisioningPhase::Provisioning));
        assert_eq!(sig.severity, Severity::Info);

        let ev = event("FailedCreate", "MachineSet", "demo-md", "boom", "Warning");
        let sig = classify_event(&ev).unwrap();
        assert_eq!(sig.severity, Severity::Error);
    }

    #[test]
    fn kind_scoped_pattern_requires_kind() {
        let on_machineset = event("SuccessfulCreate", "MachineSet", "demo-md", "", "Normal");
        assert_eq!(
            classify_event(&on_machineset).unwrap().phase_hint,
            Some(ProvisioningPhase::Scaling)
        );
        // the same reason on a Pod is ordinary noise
        let on_pod = event("SuccessfulCreate", "Pod", "demo-pod", "", "Normal");
        assert!(classify_event(&on_pod).is_none());
    }

    #[test]
    fn unmatched_warning_still_surfaces() {
        let ev = event("SomethingOdd", "Cluster", "demo", "odd", "Warning");
        let sig = classify_event(&ev).unwrap();
        assert_eq!(sig.severity, Severity::Warning);
        assert!(sig.phase_hint.is_none());
    }

    #[test]
    fn dedup_default_window() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut dedup = Deduper::new(clock.clone());
        let ev = event("SomeReason", "Cluster", "demo", "", "Warning");

        assert!(dedup.should_emit(&ev));
        assert!(!dedup.should_emit(&ev));
        clock.advance(Duration::from_secs(29));
        assert!(!dedup.should_emit(&ev));
        clock.advance(Duration::from_secs(1));
        assert!(dedup.should_emit(&ev));
    }

    #[test]
    fn dedup_per_reason_window() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut dedup = Deduper::new(clock.clone());
        let ev = event("CAPIClusterIsProvisioning", "ClusterDeployment", "demo", "", "Normal");

        // 20 duplicates within five seconds: exactly one emission
        let mut emitted = 0;
        for _ in 0..20 {
            if dedup.should_emit(&ev) {
                emitted += 1;
            }
            clock.advance(Duration::from_millis(250));
        }
        assert_eq!(emitted, 1);

        clock.advance(Duration::from_secs(60));
        assert!(dedup.should_emit(&ev));
    }

    #[test]
    fn dedup_keys_are_per_object() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut dedup = Deduper::new(clock);
        let a = event("FailedCreate", "MachineSet", "demo-a", "", "Warning");
        let b = event("FailedCreate", "MachineSet", "demo-b", "", "Warning");
        assert!(dedup.should_emit(&a));
        assert!(dedup.should_emit(&b));
        assert!(!dedup.should_emit(&a));
    }
}
