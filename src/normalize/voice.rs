//! VOICE normalizer (§4.1): delegates to a `Transcriber` capability; the
//! detected language (if any) is recorded as header `x-language`.

use async_trait::async_trait;
use chrono::Utc;

use crate::envelope::{DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

pub struct VoiceNormalizer;

#[async_trait]
impl Normalizer for VoiceNormalizer {
    fn kind(&self) -> Kind {
        Kind::Voice
    }

    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope {
        let received_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let size_bytes = input.bytes.len() as u64;

        if size_bytes > cx.config.max_envelope_bytes {
            return Envelope::new(
                id,
                Kind::Voice,
                received_at,
                input.source,
                Principals::default(),
                None,
                "",
                size_bytes,
                std::collections::HashMap::new(),
                vec![],
                None,
                vec![DropReason::Oversize],
            );
        }

        let mut headers = std::collections::HashMap::new();
        let (body, drop_reasons) = match &cx.transcriber {
            Some(transcriber) => match transcriber.transcribe(&input.bytes).await {
                Ok((text, language)) => {
                    if let Some(lang) = language {
                        headers.insert("x-language".to_string(), lang);
                    }
                    (text, vec![])
                }
                Err(detail) => (String::new(), vec![DropReason::NormalizeFailed { detail }]),
            },
            None => (String::new(), vec![DropReason::NoDescriber]),
        };

        let identity = cx.mint_identity().await;

        Envelope::new(
            id,
            Kind::Voice,
            received_at,
            input.source,
            Principals::default(),
            None,
            &body,
            size_bytes,
            headers,
            vec![],
            identity,
            drop_reasons,
        )
    }
}
