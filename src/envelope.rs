//! The canonical envelope (C1) — the typed record every input normalizes
//! into before it reaches the recognizer, triage, or routing stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The input variant an envelope was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Kind {
    Email,
    Pdf,
    Voice,
    Api,
    Json,
    Url,
    Sms,
    Image,
    Video,
    Text,
}

/// RFC-5322-shaped address lists. Empty for non-email kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Principals {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

/// A single attachment entry. `content_hash` is absent when the attachment
/// was dropped for size before it could be hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Why some part of normalization was skipped or an input was rejected.
/// Serialized as a snake_case token so logs/metrics can match on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// Envelope size exceeded `max_envelope_bytes`.
    Oversize,
    /// One attachment exceeded `max_attachment_bytes` and was dropped.
    AttachmentOversize { name: String },
    /// Input kind needed a describer capability (vision/transcriber) that
    /// wasn't configured.
    NoDescriber,
    /// A normalizer-internal failure; `detail` is safe to log (no body).
    NormalizeFailed { detail: String },
    /// IdAuthority failed and the deployment doesn't allow a null identity.
    IdentityUnavailable,
}

impl DropReason {
    /// Hard-reject reasons mean the envelope carries no usable body and
    /// forwarding must not run. Partial reasons (a dropped attachment, a
    /// missing describer for one item) still leave a forwardable envelope.
    pub fn is_hard_reject(&self) -> bool {
        matches!(
            self,
            DropReason::Oversize | DropReason::IdentityUnavailable | DropReason::NormalizeFailed { .. }
        )
    }
}

/// The canonical envelope. Immutable after construction — enrichment
/// (triage, routing) is attached as a sibling record, never by mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub kind: Kind,
    pub received_at: DateTime<Utc>,
    pub source: String,
    pub principals: Principals,
    pub subject: Option<String>,
    pub preview: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub headers: std::collections::HashMap<String, String>,
    pub attachments: Vec<Attachment>,
    pub identity: Option<String>,
    pub drop_reasons: Vec<DropReason>,
}

const MAX_SUBJECT_CHARS: usize = 200;
const MAX_PREVIEW_CHARS: usize = 2000;
const ELLIPSIS: &str = "…";

/// Truncate to at most `max_chars` chars (not bytes), appending an ellipsis
/// marker when the source was longer. Character-boundary safe.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let truncated: String = text.chars().take(keep).collect();
    format!("{truncated}{ELLIPSIS}")
}

/// Truncate a subject line to the envelope's 200-char cap.
pub fn truncate_subject(subject: &str) -> String {
    truncate(subject, MAX_SUBJECT_CHARS)
}

/// Truncate body text to the envelope's 2000-char preview cap.
pub fn truncate_preview(body: &str) -> String {
    truncate(body, MAX_PREVIEW_CHARS)
}

/// SHA-256 over the canonical body, hex-encoded. Deterministic: identical
/// normalized bodies always yield identical hashes.
pub fn content_hash(canonical_body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_body);
    format!("{:x}", hasher.finalize())
}

impl Envelope {
    /// Builder used by normalizers once they have every field resolved.
    /// Applies the subject/preview truncation invariants uniformly so no
    /// individual normalizer has to reimplement them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        kind: Kind,
        received_at: DateTime<Utc>,
        source: String,
        principals: Principals,
        subject: Option<String>,
        body: &str,
        size_bytes: u64,
        headers: std::collections::HashMap<String, String>,
        attachments: Vec<Attachment>,
        identity: Option<String>,
        drop_reasons: Vec<DropReason>,
    ) -> Self {
        Self {
            id,
            kind,
            received_at,
            source,
            principals,
            subject: subject.map(|s| truncate_subject(&s)),
            preview: truncate_preview(body),
            content_hash: content_hash(body.as_bytes()),
            size_bytes,
            headers,
            attachments,
            identity,
            drop_reasons,
        }
    }

    pub fn is_dropped(&self) -> bool {
        !self.drop_reasons.is_empty()
    }

    /// True only when a hard-reject reason is present. Partial-failure
    /// reasons (an oversize attachment, a missing describer for one item)
    /// don't prevent the envelope itself from being forwarded.
    pub fn is_hard_rejected(&self) -> bool {
        self.drop_reasons.iter().any(DropReason::is_hard_reject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_adds_ellipsis_at_cap() {
        let long = "a".repeat(250);
        let t = truncate_subject(&long);
        assert_eq!(t.chars().count(), 200);
        assert!(t.ends_with(ELLIPSIS));
    }

    #[test]
    fn truncate_preview_cap_is_2000() {
        let long = "x".repeat(3000);
        let t = truncate_preview(&long);
        assert_eq!(t.chars().count(), 2000);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash(b"hello world");
        let b = content_hash(b"hello world");
        assert_eq!(a, b);
        let c = content_hash(b"hello world!");
        assert_ne!(a, c);
    }

    #[test]
    fn envelope_new_applies_truncation_and_hash() {
        let env = Envelope::new(
            "id-1".into(),
            Kind::Email,
            Utc::now(),
            "alice@example.com".into(),
            Principals::default(),
            Some("hi".into()),
            "body text",
            9,
            std::collections::HashMap::new(),
            vec![],
            Some("identity-1".into()),
            vec![],
        );
        assert_eq!(env.subject.as_deref(), Some("hi"));
        assert_eq!(env.preview, "body text");
        assert!(!env.content_hash.is_empty());
        assert!(!env.is_dropped());
    }

    #[test]
    fn envelope_with_drop_reason_reports_dropped() {
        let env = Envelope::new(
            "id-2".into(),
            Kind::Email,
            Utc::now(),
            "bob@example.com".into(),
            Principals::default(),
            None,
            "",
            0,
            std::collections::HashMap::new(),
            vec![],
            None,
            vec![DropReason::Oversize],
        );
        assert!(env.is_dropped());
    }
}
