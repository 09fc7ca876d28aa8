//! Pipeline Coordinator (C9) — sequences one input through every other
//! component and produces a single terminal outcome (§4.8).
//!
//! State machine: INGEST -> NORMALIZED -> RECOGNIZED -> (CLASSIFIED run
//! concurrently with the rate-limit/dedup check) -> SCORED -> DECIDED ->
//! PERSISTED -> FORWARDED -> DONE, with a DROPPED branch whenever the
//! rate limiter or dedup map rejects the item. Triage scoring is
//! sequenced strictly after classification since it consumes the
//! classifier's urgency hint — only the rate-limit check overlaps with
//! the classifier call, since neither depends on the other's result.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::capabilities::{IdAuthority, PdfExtractor, Transcriber, VisionDescriber};
use crate::classifier::ClassifierAdapter;
use crate::config::Config;
use crate::envelope::Envelope;
use crate::error::{Error, PipelineError};
use crate::forwarder::GuardedForwarder;
use crate::metrics::{LogEntry, MetricsSink};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};
use crate::ratelimit::RateLimiter;
use crate::recognizer::{self, RecognizerTables};
use crate::routing::{self, AccessHints, RoutingDecision};
use crate::sink::SinkManager;
use crate::triage;

/// Transition markers logged at `debug` level as one input moves through
/// the coordinator. Not persisted — `MetricsSink` records the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Ingest,
    Normalized,
    Recognized,
    Classified,
    Scored,
    Decided,
    Persisted,
    Forwarded,
    Done,
    Dropped,
}

/// The terminal result of one `run_one` call.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Rejected by rate-limit/dedup before normalization's output was used
    /// for anything beyond the dedup key.
    Dropped { envelope_id: String, reason_token: String },
    /// Ran the full pipeline; `forwarded` is `false` only when the
    /// envelope carried a hard-reject `drop_reason` (oversize, failed
    /// normalization, no identity) — partial reasons like an oversize
    /// attachment or a missing describer still forward the envelope.
    Delivered {
        envelope_id: String,
        kind: crate::envelope::Kind,
        identity: Option<String>,
        category: triage::Category,
        received_at: chrono::DateTime<chrono::Utc>,
        routing: RoutingDecision,
        forwarded: bool,
    },
    /// An internal invariant was violated or the deadline elapsed.
    Failed { envelope_id: String, detail: String },
}

/// Wires every other component together and owns the admission-control
/// semaphore sized to `config.max_inflight` (§5).
pub struct Coordinator {
    config: Config,
    normalizers: HashMap<crate::envelope::Kind, Arc<dyn Normalizer>>,
    recognizer_tables: RecognizerTables,
    classifier_adapter: ClassifierAdapter,
    rate_limiter: RateLimiter,
    sink_manager: SinkManager,
    forwarder: GuardedForwarder,
    metrics: Arc<MetricsSink>,
    id_authority: Option<Arc<dyn IdAuthority>>,
    pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    vision_describer: Option<Arc<dyn VisionDescriber>>,
    semaphore: Arc<Semaphore>,
}

#[allow(clippy::too_many_arguments)]
impl Coordinator {
    pub fn new(
        config: Config,
        normalizers: HashMap<crate::envelope::Kind, Arc<dyn Normalizer>>,
        recognizer_tables: RecognizerTables,
        classifier_adapter: ClassifierAdapter,
        sink_manager: SinkManager,
        forwarder: GuardedForwarder,
        metrics: Arc<MetricsSink>,
        id_authority: Option<Arc<dyn IdAuthority>>,
        pdf_extractor: Option<Arc<dyn PdfExtractor>>,
        transcriber: Option<Arc<dyn Transcriber>>,
        vision_describer: Option<Arc<dyn VisionDescriber>>,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            config.per_sender_hour_limit,
            config.per_domain_hour_limit,
            config.dedup_ttl_seconds,
        );
        let semaphore = Arc::new(Semaphore::new(config.max_inflight));
        Self {
            config,
            normalizers,
            recognizer_tables,
            classifier_adapter,
            rate_limiter,
            sink_manager,
            forwarder,
            metrics,
            id_authority,
            pdf_extractor,
            transcriber,
            vision_describer,
            semaphore,
        }
    }

    fn normalize_context(&self) -> NormalizeContext {
        NormalizeContext {
            config: self.config.clone(),
            id_authority: self.id_authority.clone(),
            pdf_extractor: self.pdf_extractor.clone(),
            transcriber: self.transcriber.clone(),
            vision_describer: self.vision_describer.clone(),
        }
    }

    /// Run one input through the full pipeline, honoring `max_inflight`
    /// admission control and `pipeline_deadline_ms` as a hard ceiling.
    pub async fn run_one(&self, input: RawInput) -> PipelineOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return PipelineOutcome::Failed {
                    envelope_id: String::new(),
                    detail: "semaphore closed".to_string(),
                }
            }
        };

        let deadline = std::time::Duration::from_millis(self.config.pipeline_deadline_ms);
        match tokio::time::timeout(deadline, self.run_one_inner(input)).await {
            Ok(outcome) => outcome,
            Err(_) => PipelineOutcome::Failed {
                envelope_id: String::new(),
                detail: Error::from(PipelineError::Timeout).to_string(),
            },
        }
    }

    async fn run_one_inner(&self, input: RawInput) -> PipelineOutcome {
        debug!(state = ?PipelineState::Ingest, "pipeline: ingest");

        let cx = self.normalize_context();
        let Some(normalizer) = self.normalizers.get(&input.kind).cloned() else {
            return PipelineOutcome::Failed {
                envelope_id: String::new(),
                detail: "no normalizer registered for kind".to_string(),
            };
        };
        let envelope = normalizer.normalize(input, &cx).await;
        debug!(state = ?PipelineState::Normalized, id = %envelope.id, "pipeline: normalized");

        let sender = envelope.principals.from.first().cloned().unwrap_or_default();
        let now_ms = envelope.received_at.timestamp_millis();
        if let Some(drop) = self.rate_limiter.check(&sender, &envelope.content_hash, now_ms).await {
            debug!(state = ?PipelineState::Dropped, id = %envelope.id, reason = drop.reason_token(), "pipeline: dropped");
            self.metrics
                .record(LogEntry {
                    envelope_id: envelope.id.clone(),
                    received_at: envelope.received_at,
                    category: triage::Category::General,
                    urgency_level: triage::UrgencyLevel::Info,
                    score: 0,
                    content_hash: envelope.content_hash.clone(),
                    destinations: vec![],
                    reasons: vec![drop.reason_token().to_string()],
                })
                .await;
            return PipelineOutcome::Dropped {
                envelope_id: envelope.id,
                reason_token: drop.reason_token().to_string(),
            };
        }

        let recognition = recognizer::recognize(&envelope, &self.recognizer_tables);
        debug!(state = ?PipelineState::Recognized, id = %envelope.id, "pipeline: recognized");

        let classification = self.classifier_adapter.classify(&envelope).await;
        debug!(state = ?PipelineState::Classified, id = %envelope.id, unavailable = classification.unavailable, "pipeline: classified");

        let mut triage = triage::score(&envelope, &classification.output, &recognition);
        if classification.unavailable {
            triage.reasons.push("classifier_unavailable".to_string());
        }
        debug!(state = ?PipelineState::Scored, id = %envelope.id, score = triage.urgency_score, "pipeline: scored");

        let hints = AccessHints {
            recent_access: false,
            retention_days: crate::sink::default_ttl_days(envelope.kind),
        };
        let decision = routing::route(&envelope, &triage, &recognition, &self.config, hints);
        debug!(state = ?PipelineState::Decided, id = %envelope.id, tier = ?decision.tier, "pipeline: decided");

        let key = crate::sink::envelope_key(&envelope);
        let ttl_seconds = crate::sink::default_ttl_days(envelope.kind) * 86_400;
        let metadata = crate::sink::stored_metadata(&envelope, ttl_seconds);
        let full_bytes = serde_json::to_vec(&envelope).unwrap_or_default();
        let reduced_bytes = crate::sink::reduced_record(&envelope);
        let fanout = self
            .sink_manager
            .put_fanout(
                &decision.sinks,
                &key,
                full_bytes,
                reduced_bytes,
                ttl_seconds,
                metadata,
                self.config.retain_full_content,
            )
            .await;
        debug!(state = ?PipelineState::Persisted, id = %envelope.id, primary_ok = fanout.primary_succeeded, "pipeline: persisted");

        let mut extra_reasons = Vec::new();
        if fanout.inconsistency {
            extra_reasons.push("sink_inconsistency".to_string());
        }
        if !fanout.primary_succeeded {
            extra_reasons.push("primary_sink_failed".to_string());
        }
        for reason in &envelope.drop_reasons {
            extra_reasons.push(format!("{reason:?}"));
        }

        // Only a hard-reject reason (oversize body, failed normalization,
        // no identity) suppresses forwarding. Partial reasons — an oversize
        // attachment, a missing describer for one item — still leave a
        // forwardable envelope (§8 scenario 6).
        let mut forwarded = false;
        if envelope.is_hard_rejected() {
            extra_reasons.push("forwarding_suppressed:hard_reject".to_string());
        } else {
            let mut any_forward_failed = false;
            for destination in &decision.destinations {
                match self.forwarder.forward_once(&envelope, &destination.address).await {
                    Ok(sent) => forwarded = forwarded || sent,
                    Err(detail) => {
                        any_forward_failed = true;
                        extra_reasons.push(format!("forward_failed:{detail}"));
                    }
                }
            }
            if !any_forward_failed {
                forwarded = true;
            }
        }
        debug!(state = ?PipelineState::Forwarded, id = %envelope.id, forwarded, "pipeline: forwarded");

        let log = LogEntry::from_triage(
            &envelope.id,
            envelope.received_at,
            &envelope.content_hash,
            &triage,
            &decision,
            &extra_reasons,
        );
        self.metrics.record(log).await;
        debug!(state = ?PipelineState::Done, id = %envelope.id, "pipeline: done");

        PipelineOutcome::Delivered {
            envelope_id: envelope.id,
            kind: envelope.kind,
            identity: envelope.identity,
            category: triage.category,
            received_at: envelope.received_at,
            routing: decision,
            forwarded,
        }
    }
}
