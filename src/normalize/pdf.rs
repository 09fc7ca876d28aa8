//! PDF normalizer (§4.1): delegates extraction to a `PdfExtractor`
//! capability; body is the concatenation of page text.

use async_trait::async_trait;
use chrono::Utc;

use crate::envelope::{DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

pub struct PdfNormalizer;

#[async_trait]
impl Normalizer for PdfNormalizer {
    fn kind(&self) -> Kind {
        Kind::Pdf
    }

    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope {
        let received_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let size_bytes = input.bytes.len() as u64;

        if size_bytes > cx.config.max_envelope_bytes {
            return Envelope::new(
                id,
                Kind::Pdf,
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

        let (body, drop_reasons) = match &cx.pdf_extractor {
            Some(extractor) => match extractor.extract_text(&input.bytes).await {
                Ok(text) => (text, vec![]),
                Err(detail) => (String::new(), vec![DropReason::NormalizeFailed { detail }]),
            },
            None => (String::new(), vec![DropReason::NoDescriber]),
        };

        let identity = cx.mint_identity().await;
        let subject = input.file_name.clone();

        Envelope::new(
            id,
            Kind::Pdf,
            received_at,
            input.source,
            Principals::default(),
            subject,
            &body,
            size_bytes,
            std::collections::HashMap::new(),
            vec![],
            identity,
            drop_reasons,
        )
    }
}
