//! IMAGE/VIDEO normalizer (§4.1): delegates to a `VisionDescriber`
//! capability; if unavailable the body is empty and `drop_reasons`
//! records `no_describer`.

use async_trait::async_trait;
use chrono::Utc;

use crate::envelope::{DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

pub struct ImageVideoNormalizer {
    kind: Kind,
}

impl ImageVideoNormalizer {
    pub fn image() -> Self {
        Self { kind: Kind::Image }
    }

    pub fn video() -> Self {
        Self { kind: Kind::Video }
    }
}

#[async_trait]
impl Normalizer for ImageVideoNormalizer {
    fn kind(&self) -> Kind {
        self.kind
    }

    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope {
        let received_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let size_bytes = input.bytes.len() as u64;

        if size_bytes > cx.config.max_envelope_bytes {
            return Envelope::new(
                id,
                self.kind,
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

        let (body, drop_reasons) = match &cx.vision_describer {
            Some(describer) => match describer.describe(&input.bytes).await {
                Ok(text) => (text, vec![]),
                Err(detail) => (String::new(), vec![DropReason::NormalizeFailed { detail }]),
            },
            None => (String::new(), vec![DropReason::NoDescriber]),
        };

        let identity = cx.mint_identity().await;
        let subject = input.file_name.clone();

        Envelope::new(
            id,
            self.kind,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    struct FakeDescriber;

    #[async_trait]
    impl crate::capabilities::VisionDescriber for FakeDescriber {
        async fn describe(&self, _bytes: &[u8]) -> Result<String, String> {
            Ok("a photograph of a signed contract on a desk".to_string())
        }
    }

    fn ctx(describer: Option<std::sync::Arc<dyn crate::capabilities::VisionDescriber>>) -> NormalizeContext {
        NormalizeContext {
            config: Config::for_tests(),
            id_authority: None,
            pdf_extractor: None,
            transcriber: None,
            vision_describer: describer,
        }
    }

    #[tokio::test]
    async fn describes_image_via_capability() {
        let raw = RawInput {
            kind: Kind::Image,
            source: "upload".to_string(),
            bytes: vec![1, 2, 3],
            declared_content_type: Some("image/png".to_string()),
            file_name: Some("contract.png".to_string()),
        };
        let env = ImageVideoNormalizer::image()
            .normalize(raw, &ctx(Some(std::sync::Arc::new(FakeDescriber))))
            .await;
        assert!(env.preview.contains("signed contract"));
        assert!(!env.is_dropped());
    }

    #[tokio::test]
    async fn missing_describer_drops_with_no_describer() {
        let raw = RawInput {
            kind: Kind::Video,
            source: "upload".to_string(),
            bytes: vec![1, 2, 3],
            declared_content_type: None,
            file_name: None,
        };
        let env = ImageVideoNormalizer::video().normalize(raw, &ctx(None)).await;
        assert!(env.drop_reasons.contains(&DropReason::NoDescriber));
        assert!(env.preview.is_empty());
    }
}
