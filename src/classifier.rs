//! Classifier Adapter (C5) — wraps the external Classifier capability with
//! a timeout, a content-hash-keyed cache, and a non-aborting fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyHint {
    Critical,
    High,
    Medium,
    Low,
    /// No signal — distinct from `Low` so a genuine "classifier said low
    /// urgency" can still contribute reasoning separately if needed later.
    None,
}

impl UrgencyHint {
    pub fn token(&self) -> &'static str {
        match self {
            UrgencyHint::Critical => "critical",
            UrgencyHint::High => "high",
            UrgencyHint::Medium => "medium",
            UrgencyHint::Low => "low",
            UrgencyHint::None => "none",
        }
    }
}

/// The external Classifier's response shape (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierOutput {
    pub category: String,
    pub sentiment: String,
    pub urgency_hint: UrgencyHint,
    pub entities: Vec<String>,
}

impl ClassifierOutput {
    /// The zero-value classification returned on timeout/error. Never
    /// aborts the pipeline — `reasons` gets `classifier_unavailable`
    /// appended by the caller.
    pub fn unavailable() -> Self {
        Self {
            category: String::new(),
            sentiment: String::new(),
            urgency_hint: UrgencyHint::None,
            entities: Vec::new(),
        }
    }
}

/// External Classifier capability (spec §6). An opaque model-backed
/// collaborator — this crate only defines the contract and the
/// timeout/cache/fallback wrapper around it, never a concrete backend.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, envelope: &Envelope) -> Result<ClassifierOutput, String>;
}

/// Wraps a `Classifier` with a timeout and a `content_hash`-keyed cache.
pub struct ClassifierAdapter {
    classifier: Arc<dyn Classifier>,
    cache: Store<String, ClassifierOutput>,
    timeout: Duration,
    cache_ttl: Duration,
}

/// Result of an adapter call: the classification plus whether it came from
/// cache or a live call, and whether the fallback path was used.
pub struct AdapterResult {
    pub output: ClassifierOutput,
    pub cache_hit: bool,
    pub unavailable: bool,
}

/// Classifier that always reports unavailable — used when no external
/// classifier endpoint is configured. The adapter's timeout/fallback path
/// absorbs this the same way it absorbs a real timeout (§4.3), so the
/// pipeline still runs entirely on non-classifier signals.
pub struct NullClassifier;

#[async_trait]
impl Classifier for NullClassifier {
    async fn classify(&self, _envelope: &Envelope) -> Result<ClassifierOutput, String> {
        Err("no classifier configured".to_string())
    }
}

/// HTTP-backed `Classifier`: POSTs the envelope to a configured endpoint
/// and expects a JSON body shaped like [`ClassifierOutput`] back. Grounded
/// on the `reqwest::Client` builder/timeout style `normalize::url`'s
/// `UrlNormalizer` uses for its own outbound call.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .expect("reqwest client config is always valid");
        Self { client, endpoint: endpoint.into() }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, envelope: &Envelope) -> Result<ClassifierOutput, String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("classifier endpoint returned {}", response.status()));
        }
        response.json::<ClassifierOutput>().await.map_err(|e| e.to_string())
    }
}

impl ClassifierAdapter {
    pub fn new(classifier: Arc<dyn Classifier>, timeout_ms: u64, cache_ttl_secs: u64) -> Self {
        Self {
            classifier,
            cache: Store::new(),
            timeout: Duration::from_millis(timeout_ms),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
        }
    }

    /// Call budget ≤ `timeout`. On timeout or error, returns the zero-value
    /// classification and `unavailable = true` — never propagates the
    /// error to the pipeline.
    pub async fn classify(&self, envelope: &Envelope) -> AdapterResult {
        if let Some(cached) = self.cache.get(&envelope.content_hash).await {
            return AdapterResult {
                output: cached,
                cache_hit: true,
                unavailable: false,
            };
        }

        match tokio::time::timeout(self.timeout, self.classifier.classify(envelope)).await {
            Ok(Ok(output)) => {
                self.cache
                    .put(envelope.content_hash.clone(), output.clone(), self.cache_ttl)
                    .await;
                AdapterResult {
                    output,
                    cache_hit: false,
                    unavailable: false,
                }
            }
            Ok(Err(_)) | Err(_) => AdapterResult {
                output: ClassifierOutput::unavailable(),
                cache_hit: false,
                unavailable: true,
            },
        }
    }
}
