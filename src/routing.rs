//! Routing Engine (C6) — maps `(envelope, triage)` to a `RoutingDecision`
//! (§4.5): destination resolution, priority bit, tier selection, sink
//! selection, and a stable reason code.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::envelope::{Envelope, Kind};
use crate::recognizer::RecognitionResult;
use crate::triage::{Triage, UrgencyLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
    Archive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub priority_bit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub destinations: Vec<Destination>,
    pub sinks: Vec<String>,
    pub tier: Tier,
    pub reason_code: String,
}

/// Hint from the caller about recent-access likelihood — used only for
/// the HOT-tier size/access rule in §4.5.3.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessHints {
    pub recent_access: bool,
    pub retention_days: u64,
}

fn select_tier(envelope: &Envelope, triage: &Triage, hints: &AccessHints) -> Tier {
    if triage.urgency_level >= UrgencyLevel::High {
        return Tier::Hot;
    }
    if envelope.size_bytes < 1024 * 1024 && hints.recent_access {
        return Tier::Hot;
    }
    if hints.retention_days >= 365 {
        return Tier::Cold;
    }
    if hints.retention_days >= 90 {
        return Tier::Warm;
    }
    Tier::Archive
}

fn select_sinks(envelope: &Envelope, known_case_hit: bool) -> Vec<String> {
    let mut sinks = vec!["metadata".to_string(), "recent_log".to_string()];

    let blob_kind = matches!(envelope.kind, Kind::Pdf | Kind::Image | Kind::Video | Kind::Voice);
    if blob_kind || known_case_hit {
        sinks.push("blob".to_string());
    }
    if !envelope.preview.is_empty() {
        sinks.push("vector_index".to_string());
    }
    sinks
}

/// Produce the routing decision for one envelope/triage pair. Destination
/// resolution and the reason code consult the recognizer's output; the
/// destination list always has exactly one entry per destination address
/// the envelope was addressed to that resolved to a forward target.
pub fn route(
    envelope: &Envelope,
    triage: &Triage,
    recognition: &RecognitionResult,
    config: &Config,
    hints: AccessHints,
) -> RoutingDecision {
    let priority_bit = triage.urgency_level >= UrgencyLevel::High;

    let forward_to = crate::recognizer::resolve_forward_to(recognition, &config.default_forward_to);
    let destinations = vec![Destination {
        address: forward_to,
        priority_bit,
    }];

    let tier = select_tier(envelope, triage, &hints);
    let sinks = select_sinks(envelope, recognition.known_case.is_some());

    let reason_code = if let Some(known) = &recognition.known_case {
        format!("known_case:{}", known.canonical_case_name.to_uppercase())
    } else if priority_bit {
        "priority_critical".to_string()
    } else {
        "default_route".to_string()
    };

    RoutingDecision {
        destinations,
        sinks,
        tier,
        reason_code,
    }
}
