//! External capability contracts (spec §6) — the collaborators this crate
//! treats as opaque: Forwarder, Sink, IdAuthority, PdfExtractor,
//! Transcriber, VisionDescriber. `Classifier` lives in `classifier.rs`
//! alongside its adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// `Forwarder.forward(destination, envelope) -> ok|error`; retriable by
/// design (see `retry.rs`).
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, destination: &str, envelope: &crate::envelope::Envelope) -> Result<(), String>;
}

/// Metadata accompanying a `Sink::put` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutOptions {
    pub ttl_seconds: u64,
    pub metadata: std::collections::HashMap<String, String>,
}

/// An object a sink has stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub metadata: std::collections::HashMap<String, String>,
}

/// `Sink.put/get/head/delete`; sinks advertise capabilities via
/// `accepts_full_content`/`supports_ttl` rather than the manager probing
/// for them.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;
    fn accepts_full_content(&self) -> bool;
    fn supports_ttl(&self) -> bool;

    async fn put(&self, key: &str, bytes: Vec<u8>, options: PutOptions) -> Result<(), String>;
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, String>;
    async fn head(&self, key: &str) -> Result<bool, String>;
    async fn delete(&self, key: &str) -> Result<(), String>;
}

/// `IdAuthority.mint(purpose) -> identity_string`.
#[async_trait]
pub trait IdAuthority: Send + Sync {
    async fn mint(&self, purpose: &str) -> Result<String, String>;
}

/// Optional: absence yields empty body and a `NoDescriber`/failure
/// `drop_reasons` token, never an aborted pipeline.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String, String>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, bytes: &[u8]) -> Result<(String, Option<String>), String>;
}

#[async_trait]
pub trait VisionDescriber: Send + Sync {
    async fn describe(&self, bytes: &[u8]) -> Result<String, String>;
}
