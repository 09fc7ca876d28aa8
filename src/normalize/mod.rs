//! Normalizers (C2) — convert any supported input into an `Envelope`.
//! Each kind gets its own `Normalizer` impl behind a shared trait
//! (spec §4.1).

pub mod email;
pub mod image_video;
pub mod json_api;
pub mod pdf;
pub mod sms_text;
pub mod url;
pub mod voice;

use std::sync::Arc;

use async_trait::async_trait;

use crate::capabilities::{IdAuthority, PdfExtractor, Transcriber, VisionDescriber};
use crate::config::Config;
use crate::envelope::{Envelope, Kind};

/// Loosely-typed input the universal intake surface accepts. Re-architected
/// (per §9) as a tagged variant over `Kind` rather than an untyped object:
/// callers that don't know the kind go through `detect_kind` first.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub kind: Kind,
    pub source: String,
    pub bytes: Vec<u8>,
    pub declared_content_type: Option<String>,
    pub file_name: Option<String>,
}

/// Capabilities and limits a normalizer may need. Optional capabilities
/// are `None` when not configured; their absence is not an error.
pub struct NormalizeContext {
    pub config: Config,
    pub id_authority: Option<Arc<dyn IdAuthority>>,
    pub pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub vision_describer: Option<Arc<dyn VisionDescriber>>,
}

impl NormalizeContext {
    pub async fn mint_identity(&self) -> Option<String> {
        let authority = self.id_authority.as_ref()?;
        authority.mint("envelope").await.ok()
    }
}

/// Detect the input kind when not explicit, in the order §4.1 specifies:
/// declared content-type, file extension, URL prefix, email headers,
/// JSON object, else TEXT.
pub fn detect_kind(input: &RawInput) -> Kind {
    if let Some(ct) = &input.declared_content_type {
        if let Some(kind) = kind_from_content_type(ct) {
            return kind;
        }
    }
    if let Some(name) = &input.file_name {
        if let Some(kind) = kind_from_extension(name) {
            return kind;
        }
    }
    if input.source.starts_with("http://") || input.source.starts_with("https://") {
        return Kind::Url;
    }
    if looks_like_email(&input.bytes) {
        return Kind::Email;
    }
    if looks_like_json(&input.bytes) {
        return Kind::Json;
    }
    Kind::Text
}

fn kind_from_content_type(content_type: &str) -> Option<Kind> {
    let ct = content_type.to_lowercase();
    if ct.contains("pdf") {
        return Some(Kind::Pdf);
    }
    if ct.starts_with("audio/") {
        return Some(Kind::Voice);
    }
    if ct.starts_with("image/") {
        return Some(Kind::Image);
    }
    if ct.starts_with("video/") {
        return Some(Kind::Video);
    }
    if ct.contains("json") {
        return Some(Kind::Json);
    }
    if ct.starts_with("message/rfc822") || ct.contains("multipart/mixed") {
        return Some(Kind::Email);
    }
    if ct.starts_with("text/plain") {
        return Some(Kind::Text);
    }
    None
}

fn kind_from_extension(file_name: &str) -> Option<Kind> {
    let lower = file_name.to_lowercase();
    let ext = lower.rsplit('.').next()?;
    match ext {
        "pdf" => Some(Kind::Pdf),
        "eml" | "mime" => Some(Kind::Email),
        "mp3" | "wav" | "m4a" | "ogg" => Some(Kind::Voice),
        "jpg" | "jpeg" | "png" | "gif" | "webp" => Some(Kind::Image),
        "mp4" | "mov" | "webm" => Some(Kind::Video),
        "json" => Some(Kind::Json),
        "txt" => Some(Kind::Text),
        _ => None,
    }
}

fn looks_like_email(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let head: String = text.lines().take(30).collect::<Vec<_>>().join("\n").to_lowercase();
    head.contains("from:") && (head.contains("to:") || head.contains("subject:"))
}

fn looks_like_json(bytes: &[u8]) -> bool {
    let trimmed_start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    matches!(trimmed_start.and_then(|i| bytes.get(i)), Some(b'{'))
}

/// Implemented once per `Kind`; never returns `Err` — failures are
/// encoded as a minimal envelope carrying `drop_reasons` (§4.1).
#[async_trait]
pub trait Normalizer: Send + Sync {
    fn kind(&self) -> Kind;
    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope;
}
