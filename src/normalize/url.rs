//! URL normalizer (§4.1): one HTTP GET with a ≤5s connect / ≤15s total
//! budget; body = HTML stripped of tags; subject = `<title>` or
//! `"Untitled"`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::envelope::{DropReason, Envelope, Kind, Principals};
use crate::normalize::{NormalizeContext, Normalizer, RawInput};

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let start = lower.find("<title>")? + "<title>".len();
    let end = lower[start..].find("</title>")? + start;
    Some(html[start..end].trim().to_string())
}

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

pub struct UrlNormalizer {
    client: reqwest::Client,
}

impl UrlNormalizer {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client config is always valid");
        Self { client }
    }
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Normalizer for UrlNormalizer {
    fn kind(&self) -> Kind {
        Kind::Url
    }

    async fn normalize(&self, input: RawInput, cx: &NormalizeContext) -> Envelope {
        let received_at = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        let fetched = self.client.get(&input.source).send().await;
        let (body, subject, size_bytes, drop_reasons) = match fetched {
            Ok(response) => match response.text().await {
                Ok(html) => {
                    let size = html.len() as u64;
                    let subject = extract_title(&html).unwrap_or_else(|| "Untitled".to_string());
                    (strip_html(&html), Some(subject), size, vec![])
                }
                Err(e) => (String::new(), None, 0, vec![DropReason::NormalizeFailed { detail: e.to_string() }]),
            },
            Err(e) => (String::new(), None, 0, vec![DropReason::NormalizeFailed { detail: e.to_string() }]),
        };

        let identity = cx.mint_identity().await;

        Envelope::new(
            id,
            Kind::Url,
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

    #[test]
    fn extract_title_finds_tag_contents() {
        let html = "<html><head><title>  Hello World </title></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Hello World"));
    }

    #[test]
    fn extract_title_missing_returns_none() {
        assert_eq!(extract_title("<html></html>"), None);
    }

    #[test]
    fn strip_html_removes_tags() {
        let html = "<p>Hello <b>World</b></p>";
        assert_eq!(strip_html(html), "Hello World");
    }
}
