//! EMAIL normalizer (§4.1): raw MIME stream -> Envelope.

use async_trait::async_trait;
use chrono::Utc;
use mail_parser::MessageParser;

use crate::envelope::{Attachment, DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn body_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(&html);
    }
    String::new()
}

fn addresses(parsed: &mail_parser::Message, header: &str) -> Vec<String> {
    let group = match header {
        "from" => parsed.from(),
        "to" => parsed.to(),
        "cc" => parsed.cc(),
        "bcc" => parsed.bcc(),
        _ => None,
    };
    group
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|a| a.address())
                .map(|a| a.to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub struct EmailNormalizer;

#[async_trait]
impl Normalizer for EmailNormalizer {
    fn kind(&self) -> Kind {
        Kind::Email
    }

    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope {
        let received_at = Utc::now();

        if input.bytes.len() as u64 > cx.config.max_envelope_bytes {
            return Envelope::new(
                uuid::Uuid::new_v4().to_string(),
                Kind::Email,
                received_at,
                input.source,
                Principals::default(),
                None,
                "",
                input.bytes.len() as u64,
                std::collections::HashMap::new(),
                vec![],
                None,
                vec![DropReason::Oversize],
            );
        }

        let Some(parsed) = MessageParser::default().parse(&input.bytes) else {
            return Envelope::new(
                uuid::Uuid::new_v4().to_string(),
                Kind::Email,
                received_at,
                input.source,
                Principals::default(),
                None,
                "",
                input.bytes.len() as u64,
                std::collections::HashMap::new(),
                vec![],
                None,
                vec![DropReason::NormalizeFailed { detail: "unparseable MIME stream".to_string() }],
            );
        };

        let principals = Principals {
            from: addresses(&parsed, "from"),
            to: addresses(&parsed, "to"),
            cc: addresses(&parsed, "cc"),
            bcc: addresses(&parsed, "bcc"),
        };

        let subject = parsed.subject().map(|s| s.to_string());
        let body = body_text(&parsed);

        let mut headers = std::collections::HashMap::new();
        for header in parsed.headers() {
            let name = header.name().to_lowercase();
            if let Some(value) = header.value().as_text() {
                headers.entry(name).or_insert_with(|| value.to_string());
            }
        }

        let mut drop_reasons = Vec::new();
        let mut attachments = Vec::new();
        for attachment in parsed.attachments() {
            let name = attachment
                .attachment_name()
                .unwrap_or("attachment")
                .to_string();
            let size = attachment.contents().len() as u64;
            if size > cx.config.max_attachment_bytes {
                drop_reasons.push(DropReason::AttachmentOversize { name: name.clone() });
                continue;
            }
            let mime = attachment
                .content_type()
                .map(|ct| ct.ctype().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            attachments.push(Attachment {
                name,
                mime,
                size_bytes: size,
                content_hash: Some(crate::envelope::content_hash(attachment.contents())),
            });
        }

        let identity = cx.mint_identity().await;
        if identity.is_none() && !cx.config.allow_anonymous {
            drop_reasons.push(DropReason::IdentityUnavailable);
        }

        let message_id = parsed.message_id().map(|s| s.to_string());
        let id = message_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Envelope::new(
            id,
            Kind::Email,
            received_at,
            input.source,
            principals,
            subject,
            &body,
            input.bytes.len() as u64,
            headers,
            attachments,
            identity,
            drop_reasons,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ctx() -> NormalizeContext {
        NormalizeContext {
            config: Config::for_tests(),
            id_authority: None,
            pdf_extractor: None,
            transcriber: None,
            vision_describer: None,
        }
    }

    fn raw_mime(headers_and_body: &str) -> RawInput {
        RawInput {
            kind: Kind::Email,
            source: "judge@superior-court.gov".to_string(),
            bytes: headers_and_body.as_bytes().to_vec(),
            declared_content_type: Some("message/rfc822".to_string()),
            file_name: None,
        }
    }

    #[tokio::test]
    async fn parses_basic_email() {
        let raw = raw_mime(
            "From: judge@superior-court.gov\r\nTo: legal@chitty.cc\r\nSubject: URGENT: Motion\r\n\r\nmotion to compel discovery\r\n",
        );
        let env = EmailNormalizer.normalize(raw, &ctx()).await;
        assert_eq!(env.principals.from, vec!["judge@superior-court.gov"]);
        assert_eq!(env.principals.to, vec!["legal@chitty.cc"]);
        assert_eq!(env.subject.as_deref(), Some("URGENT: Motion"));
        assert!(!env.is_dropped());
    }

    #[tokio::test]
    async fn oversize_input_is_dropped_before_parsing() {
        let mut raw = raw_mime("From: a@b.com\r\nTo: c@d.com\r\n\r\nbody\r\n");
        raw.bytes = vec![0u8; 200];
        let mut cx = ctx();
        cx.config.max_envelope_bytes = 100;
        let env = EmailNormalizer.normalize(raw, &cx).await;
        assert!(env.drop_reasons.contains(&DropReason::Oversize));
    }

    #[tokio::test]
    async fn unparseable_bytes_produce_minimal_envelope() {
        let raw = RawInput {
            kind: Kind::Email,
            source: "unknown".to_string(),
            bytes: vec![],
            declared_content_type: None,
            file_name: None,
        };
        let env = EmailNormalizer.normalize(raw, &ctx()).await;
        assert!(env.is_dropped());
        assert_eq!(env.source, "unknown");
    }
}
