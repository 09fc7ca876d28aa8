//! SMS/TEXT normalizer (§4.1): body = input text verbatim.

use async_trait::async_trait;
use chrono::Utc;

use crate::envelope::{DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

pub struct SmsTextNormalizer {
    kind: Kind,
}

impl SmsTextNormalizer {
    pub fn sms() -> Self {
        Self { kind: Kind::Sms }
    }

    pub fn text() -> Self {
        Self { kind: Kind::Text }
    }
}

#[async_trait]
impl Normalizer for SmsTextNormalizer {
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

        let body = String::from_utf8_lossy(&input.bytes).to_string();
        let identity = cx.mint_identity().await;

        Envelope::new(
            id,
            self.kind,
            received_at,
            input.source,
            Principals::default(),
            None,
            &body,
            size_bytes,
            std::collections::HashMap::new(),
            vec![],
            identity,
            vec![],
        )
    }
}
