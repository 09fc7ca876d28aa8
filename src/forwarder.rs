//! Concrete SMTP Forwarder (spec §6's `Forwarder.forward`), plus the
//! at-most-once-per-(envelope, destination) guard described in §4.5: a
//! dedup record is written before invocation and consulted on retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::capabilities::Forwarder;
use crate::envelope::Envelope;
use crate::retry::{retry, RetryPolicy};
use crate::store::Store;

/// SMTP relay configuration for the default Forwarder implementation.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub relay_host: String,
    pub relay_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

/// Forwards envelopes over SMTP via `lettre`. The actual `Transport::send`
/// call is blocking, so it runs on `spawn_blocking` the way the teacher's
/// synchronous `send_email` is invoked from an async context.
pub struct LettreForwarder {
    config: SmtpConfig,
}

impl LettreForwarder {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_blocking(config: &SmtpConfig, to: &str, envelope: &Envelope) -> Result<(), String> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = SmtpTransport::relay(&config.relay_host)
            .map_err(|e| format!("SMTP relay error: {e}"))?
            .port(config.relay_port)
            .credentials(creds)
            .build();

        let subject = envelope.subject.clone().unwrap_or_else(|| "(no subject)".to_string());
        let email = Message::builder()
            .from(config.from_address.parse().map_err(|e| format!("invalid from address: {e}"))?)
            .to(to.parse().map_err(|e| format!("invalid to address: {e}"))?)
            .subject(subject)
            .body(envelope.preview.clone())
            .map_err(|e| format!("failed to build message: {e}"))?;

        transport.send(&email).map_err(|e| format!("SMTP send failed: {e}"))?;
        Ok(())
    }
}

#[async_trait]
impl Forwarder for LettreForwarder {
    async fn forward(&self, destination: &str, envelope: &Envelope) -> Result<(), String> {
        let config = self.config.clone();
        let destination = destination.to_string();
        let envelope = envelope.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &destination, &envelope))
            .await
            .map_err(|e| format!("forwarder task panicked: {e}"))?
    }
}

/// Forwarder used when no SMTP relay is configured. Always fails, so the
/// guarded retry path exhausts its attempts and the failure is recorded in
/// the envelope's log entry — the pipeline never crashes for want of a
/// relay, per §7's non-critical-error-absorption policy.
pub struct NullForwarder;

#[async_trait]
impl Forwarder for NullForwarder {
    async fn forward(&self, _destination: &str, _envelope: &Envelope) -> Result<(), String> {
        Err("no forwarder configured".to_string())
    }
}

/// Wraps any `Forwarder` with the retry policy from §4.5 (base 500ms,
/// factor 2, max 3 attempts, jitter ±20%) and the at-most-once dedup guard
/// keyed on `(envelope_id, destination)`.
pub struct GuardedForwarder {
    inner: Arc<dyn Forwarder>,
    pub policy: RetryPolicy,
    dedup: Store<String, ()>,
}

impl GuardedForwarder {
    pub fn new(inner: Arc<dyn Forwarder>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::forward_default(),
            dedup: Store::new(),
        }
    }

    fn dedup_key(envelope_id: &str, destination: &str) -> String {
        format!("{envelope_id}::{destination}")
    }

    /// Invoke the Forwarder at most once for this (envelope, destination)
    /// pair across retries. Returns `Ok(false)` without calling the
    /// Forwarder if the pair was already recorded as delivered.
    pub async fn forward_once(&self, envelope: &Envelope, destination: &str) -> Result<bool, String> {
        let key = Self::dedup_key(&envelope.id, destination);
        let reserved = self
            .dedup
            .put_if_absent(key.clone(), (), Duration::from_secs(24 * 3600))
            .await;
        if !reserved {
            return Ok(false);
        }

        let inner = Arc::clone(&self.inner);
        let envelope = envelope.clone();
        let destination = destination.to_string();
        retry(&self.policy, move || {
            let inner = Arc::clone(&inner);
            let envelope = envelope.clone();
            let destination = destination.clone();
            async move { inner.forward(&destination, &envelope).await }
        })
        .await
        .map(|_| true)
    }
}
