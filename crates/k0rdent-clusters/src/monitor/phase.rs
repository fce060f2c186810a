//! Provisioning phase inference.

use std::fmt;

use chrono::{DateTime, Utc};
use k0rdent_kube::EventRecord;
use serde::{Deserialize, Serialize};

use crate::summary::{condition_is, find_condition, ClusterSummary, Condition};

/// How far back an event still influences phase inference.
const EVENT_RECENCY_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningPhase {
    Unknown,
    Initializing,
    Provisioning,
    Bootstrapping,
    Scaling,
    Installing,
    Ready,
    Failed,
}

impl ProvisioningPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisioningPhase::Ready | ProvisioningPhase::Failed)
    }

    fn from_status_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Some(ProvisioningPhase::Unknown),
            "initializing" | "pending" => Some(ProvisioningPhase::Initializing),
            "provisioning" => Some(ProvisioningPhase::Provisioning),
            "bootstrapping" => Some(ProvisioningPhase::Bootstrapping),
            "scaling" => Some(ProvisioningPhase::Scaling),
            "installing" => Some(ProvisioningPhase::Installing),
            "ready" | "provisioned" => Some(ProvisioningPhase::Ready),
            "failed" => Some(ProvisioningPhase::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ProvisioningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisioningPhase::Unknown => "Unknown",
            ProvisioningPhase::Initializing => "Initializing",
            ProvisioningPhase::Provisioning => "Provisioning",
            ProvisioningPhase::Bootstrapping => "Bootstrapping",
            ProvisioningPhase::Scaling => "Scaling",
            ProvisioningPhase::Installing => "Installing",
            ProvisioningPhase::Ready => "Ready",
            ProvisioningPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

fn looks_failed(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("failed") || text.contains("fatal") || text.contains("error:")
}

fn phase_from_conditions(conditions: &[Condition]) -> Option<ProvisioningPhase> {
    if condition_is(conditions, "InfrastructureReady", "False") {
        return Some(ProvisioningPhase::Provisioning);
    }
    if condition_is(conditions, "ControlPlaneInitialized", "False")
        || condition_is(conditions, "ControlPlaneAvailable", "False")
    {
        return Some(ProvisioningPhase::Bootstrapping);
    }
    if condition_is(conditions, "WorkersAvailable", "False")
        || condition_is(conditions, "WorkerMachinesReady", "False")
    {
        return Some(ProvisioningPhase::Scaling);
    }
    if condition_is(conditions, "ServicesInReadyState", "False")
        || condition_is(conditions, "ServicesInstalled", "False")
    {
        return Some(ProvisioningPhase::Installing);
    }
    None
}

/// Keyword heuristics over a recent event's reason and message.
fn phase_from_event(event: &EventRecord) -> Option<ProvisioningPhase> {
    let text = format!("{} {}", event.reason, event.message).to_ascii_lowercase();
    if text.contains("bootstrap") || text.contains("control plane") || text.contains("controlplane")
    {
        Some(ProvisioningPhase::Bootstrapping)
    } else if text.contains("worker") || text.contains("machineset") || text.contains("scal") {
        Some(ProvisioningPhase::Scaling)
    } else if text.contains("helm") || text.contains("install") || text.contains("servicetemplate")
    {
        Some(ProvisioningPhase::Installing)
    } else if text.contains("provision") || text.contains("infrastructure") {
        Some(ProvisioningPhase::Provisioning)
    } else {
        None
    }
}

/// Infer the provisioning phase from a cluster snapshot plus recent events.
/// Pure: identical inputs always yield the same phase.
pub fn detect_phase(
    summary: &ClusterSummary,
    recent_events: &[EventRecord],
    now: DateTime<Utc>,
) -> ProvisioningPhase {
    // 1. explicit readiness wins
    if summary.ready {
        return ProvisioningPhase::Ready;
    }

    // 2. failure from the status text or the Ready condition
    if looks_failed(&summary.message) {
        return ProvisioningPhase::Failed;
    }
    if let Some(ready) = find_condition(&summary.conditions, "Ready") {
        if ready.status == "False" && (looks_failed(&ready.reason) || looks_failed(&ready.message))
        {
            return ProvisioningPhase::Failed;
        }
    }

    // 3. a literal phase string the status already carries
    if let Some(phase) = ProvisioningPhase::from_status_str(&summary.phase) {
        return phase;
    }

    // 4. condition-driven inference
    if let Some(phase) = phase_from_conditions(&summary.conditions) {
        return phase;
    }

    // 5. recent events
    let cutoff = now - chrono::Duration::seconds(EVENT_RECENCY_WINDOW_SECS);
    for event in recent_events.iter().rev() {
        let recent = event.last_activity().is_some_and(|ts| ts >= cutoff);
        if !recent {
            continue;
        }
        if let Some(phase) = phase_from_event(event) {
            return phase;
        }
    }

    // 6. nothing reported yet
    if summary.conditions.is_empty() {
        ProvisioningPhase::Initializing
    } else {
        ProvisioningPhase::Provisioning
    }
}

/// Phase-keyed completion estimate, lifted modestly when reinforcing
/// sub-conditions already hold.
pub fn estimate_progress(phase: ProvisioningPhase, conditions: &[Condition]) -> u8 {
    let baseline = match phase {
        ProvisioningPhase::Unknown => 0,
        ProvisioningPhase::Initializing => 5,
        ProvisioningPhase::Provisioning => 25,
        ProvisioningPhase::Bootstrapping => 50,
        ProvisioningPhase::Scaling => 75,
        ProvisioningPhase::Installing => 90,
        ProvisioningPhase::Ready => 100,
        ProvisioningPhase::Failed => 0,
    };
    match phase {
        ProvisioningPhase::Provisioning if condition_is(conditions, "InfrastructureReady", "True") => 40,
        ProvisioningPhase::Bootstrapping
            if condition_is(conditions, "ControlPlaneInitialized", "True") =>
        {
            60
        }
        ProvisioningPhase::Scaling if condition_is(conditions, "WorkersAvailable", "True") => 85,
        ProvisioningPhase::Installing if condition_is(conditions, "ServicesInstalled", "True") => 95,
        _ => baseline,
    }
}
