//! Metrics & Audit Log (C10) — bounded recent-events ring plus counters,
//! observed by every pipeline stage (§3, §6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::routing::RoutingDecision;
use crate::triage::{Category, Triage, UrgencyLevel};

/// A single audit record (§3). Never contains full body, attachment
/// contents, or more than 200 chars of subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub envelope_id: String,
    pub received_at: DateTime<Utc>,
    pub category: Category,
    pub urgency_level: UrgencyLevel,
    pub score: u32,
    pub content_hash: String,
    pub destinations: Vec<String>,
    pub reasons: Vec<String>,
}

impl LogEntry {
    pub fn from_triage(
        envelope_id: &str,
        received_at: DateTime<Utc>,
        content_hash: &str,
        triage: &Triage,
        routing: &RoutingDecision,
        extra_reasons: &[String],
    ) -> Self {
        let mut reasons = triage.reasons.clone();
        reasons.extend(extra_reasons.iter().cloned());
        Self {
            envelope_id: envelope_id.to_string(),
            received_at,
            category: triage.category,
            urgency_level: triage.urgency_level,
            score: triage.urgency_score,
            content_hash: content_hash.to_string(),
            destinations: routing.destinations.iter().map(|d| d.address.clone()).collect(),
            reasons,
        }
    }
}

/// Aggregate counters, reset daily (§3: `stats` TTL 1 day).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub by_category: HashMap<String, u64>,
    pub by_level: HashMap<String, u64>,
    pub day: String,
}

/// Observes every pipeline run: a bounded `recent_log`, a bounded
/// `urgent_items` ring for HIGH/CRITICAL entries, and running counters.
/// Grounded on the teacher's `CardQueue` bounded `Arc<RwLock<...>>` ring.
pub struct MetricsSink {
    recent_log: crate::store::Ring<LogEntry>,
    urgent_items: crate::store::Ring<LogEntry>,
    stats: RwLock<Stats>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            recent_log: crate::store::Ring::new(100),
            urgent_items: crate::store::Ring::new(50),
            stats: RwLock::new(Stats::default()),
        }
    }

    pub async fn record(&self, entry: LogEntry) {
        let is_urgent = matches!(entry.urgency_level, UrgencyLevel::High | UrgencyLevel::Critical);
        let category = format!("{:?}", entry.category).to_lowercase();
        let level = format!("{:?}", entry.urgency_level).to_uppercase();

        if is_urgent {
            self.urgent_items.push_front(entry.clone()).await;
        }
        self.recent_log.push_front(entry).await;

        let mut stats = self.stats.write().await;
        stats.total += 1;
        *stats.by_category.entry(category).or_insert(0) += 1;
        *stats.by_level.entry(level).or_insert(0) += 1;
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if stats.day != today {
            *stats = Stats { day: today, ..Default::default() };
        }
    }

    pub async fn recent_log(&self) -> Vec<LogEntry> {
        self.recent_log.to_vec().await
    }

    pub async fn urgent_items(&self) -> Vec<LogEntry> {
        self.urgent_items.to_vec().await
    }

    pub async fn stats(&self) -> Stats {
        self.stats.read().await.clone()
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}
