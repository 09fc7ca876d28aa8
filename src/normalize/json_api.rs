//! JSON/API normalizer (§4.1): body = canonical JSON encoding (sorted
//! keys); subject = `kind + ":" + (data.type | "unknown")`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::envelope::{DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

/// Re-encode a JSON value with object keys sorted, for a deterministic
/// canonical body regardless of the caller's key order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Handles both JSON and API inputs — the only difference between the two
/// kinds is the `kind` literal embedded in the derived subject (§4.1:
/// `subject = kind + ":" + (data.type | "unknown")`), so one normalizer
/// parameterized by `Kind` covers both, the same way `SmsTextNormalizer`
/// covers SMS/TEXT.
pub struct JsonApiNormalizer {
    kind: Kind,
}

impl JsonApiNormalizer {
    pub fn json() -> Self {
        Self { kind: Kind::Json }
    }

    pub fn api() -> Self {
        Self { kind: Kind::Api }
    }

    fn kind_token(&self) -> &'static str {
        match self.kind {
            Kind::Api => "api",
            _ => "json",
        }
    }
}

#[async_trait]
impl Normalizer for JsonApiNormalizer {
    fn kind(&self) -> Kind {
        self.kind
    }

    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope {
        let received_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let size_bytes = input.bytes.len() as u64;

        let (body, subject, drop_reasons) = match serde_json::from_slice::<Value>(&input.bytes) {
            Ok(value) => {
                let canonical = canonicalize(&value);
                let data_type = canonical
                    .get("data")
                    .and_then(|d| d.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown");
                let subject = format!("{}:{}", self.kind_token(), data_type);
                (canonical.to_string(), Some(subject), vec![])
            }
            Err(e) => (String::new(), None, vec![DropReason::NormalizeFailed { detail: e.to_string() }]),
        };

        let identity = cx.mint_identity().await;

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
