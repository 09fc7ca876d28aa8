//! Rate Limit & Dedup (C8) — sliding per-sender/per-domain windows and the
//! content-hash dedup map, gating admission at the entry of the Pipeline
//! Coordinator (§4.7).

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

/// Why C8 told the coordinator to drop an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDrop {
    RatelimitSender,
    RatelimitDomain,
    Duplicate,
}

impl PolicyDrop {
    pub fn reason_token(&self) -> &'static str {
        match self {
            PolicyDrop::RatelimitSender => "dropped:ratelimit_sender",
            PolicyDrop::RatelimitDomain => "dropped:ratelimit_domain",
            PolicyDrop::Duplicate => "dropped:duplicate",
        }
    }
}

struct Window {
    /// Millisecond timestamps of admitted messages within the last hour.
    timestamps: Vec<i64>,
}

/// A per-key sliding 1-hour counter.
struct SlidingWindowCounter {
    limit: u32,
    windows: RwLock<HashMap<String, Window>>,
}

impl SlidingWindowCounter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Record one message for `key` at `now_ms`, pruning entries older
    /// than an hour. Returns `true` if the message is within the limit.
    async fn admit(&self, key: &str, now_ms: i64) -> bool {
        let hour_ago = now_ms - 3_600_000;
        let mut guard = self.windows.write().await;
        let window = guard.entry(key.to_string()).or_insert_with(|| Window { timestamps: Vec::new() });
        window.timestamps.retain(|&t| t > hour_ago);

        if window.timestamps.len() as u32 >= self.limit {
            return false;
        }
        window.timestamps.push(now_ms);
        true
    }
}

/// The rate-limit and dedup gate the coordinator consults before running
/// the pipeline proper.
pub struct RateLimiter {
    per_sender: SlidingWindowCounter,
    per_domain: SlidingWindowCounter,
    dedup: crate::store::Store<String, i64>,
    dedup_ttl: Duration,
}

impl RateLimiter {
    pub fn new(per_sender_hour_limit: u32, per_domain_hour_limit: u32, dedup_ttl_seconds: u64) -> Self {
        Self {
            per_sender: SlidingWindowCounter::new(per_sender_hour_limit),
            per_domain: SlidingWindowCounter::new(per_domain_hour_limit),
            dedup: crate::store::Store::new(),
            dedup_ttl: Duration::from_secs(dedup_ttl_seconds),
        }
    }

    /// Check dedup first (§4.7 lists it last, but a duplicate should never
    /// also consume rate-limit budget — tested in `dedup_does_not_consume_limit`),
    /// then the per-sender and per-domain windows.
    pub async fn check(&self, sender: &str, content_hash: &str, now_ms: i64) -> Option<PolicyDrop> {
        if self.dedup.get(&content_hash.to_string()).await.is_some() {
            return Some(PolicyDrop::Duplicate);
        }

        let domain = sender.rsplit('@').next().unwrap_or(sender).to_lowercase();
        if !self.per_sender.admit(sender, now_ms).await {
            return Some(PolicyDrop::RatelimitSender);
        }
        if !self.per_domain.admit(&domain, now_ms).await {
            return Some(PolicyDrop::RatelimitDomain);
        }

        self.dedup.put(content_hash.to_string(), now_ms, self.dedup_ttl).await;
        None
    }
}
