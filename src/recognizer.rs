//! Address & Pattern Recognizer (C3) — case-address extraction and
//! destination routing lookups, applied before triage/routing.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::envelope::Envelope;

/// One entry in the known-case table: exact destination address ->
/// canonical case name, forward target, and an optional default priority.
#[derive(Debug, Clone, Deserialize)]
pub struct KnownCaseEntry {
    pub canonical_case_name: String,
    pub forward_to: String,
    #[serde(default)]
    pub default_priority: Option<crate::triage::UrgencyLevel>,
}

/// Configuration consulted by the recognizer: the known-case table and the
/// plain address-route table, both keyed by exact destination address.
///
/// Treated as plain data (§9: "do not use source-language class
/// inheritance to express variants") and loaded from a JSON document of
/// `{known_cases: {...}, address_routes: {...}}` when configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognizerTables {
    #[serde(default)]
    pub known_cases: HashMap<String, KnownCaseEntry>,
    #[serde(default)]
    pub address_routes: HashMap<String, String>,
}

impl RecognizerTables {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Recognizer output — extracted case key, resolved forward target (if a
/// table matched), and any reason tokens to merge into the triage result.
#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    pub case_key: Option<String>,
    pub known_case: Option<KnownCaseEntry>,
    pub address_route: Option<String>,
    pub reasons: Vec<String>,
}

static CASE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([a-z0-9]+(?:-[a-z0-9]+)*)-v-([a-z0-9]+(?:-[a-z0-9]+)*)@").unwrap()
});

fn extract_case_key(address: &str) -> Option<String> {
    let caps = CASE_ADDRESS.captures(address)?;
    let plaintiff = caps.get(1)?.as_str().to_lowercase();
    let defendant = caps.get(2)?.as_str().to_lowercase();
    Some(format!("{plaintiff}_v_{defendant}"))
}

/// Run the recognizer over `to` then `cc`, in that order, first match wins
/// for both case-key extraction and table lookups. Later matches only
/// contribute additional reason tokens.
pub fn recognize(envelope: &Envelope, tables: &RecognizerTables) -> RecognitionResult {
    let mut result = RecognitionResult::default();
    let addresses = envelope
        .principals
        .to
        .iter()
        .chain(envelope.principals.cc.iter());

    for address in addresses {
        let lower = address.to_lowercase();

        if let Some(key) = extract_case_key(&lower) {
            if result.case_key.is_none() {
                result.case_key = Some(key.clone());
                result.reasons.push(format!("case_address:{key}"));
            } else {
                result.reasons.push(format!("case_address:{key}"));
            }
        }

        if result.known_case.is_none() {
            if let Some(entry) = tables.known_cases.get(&lower) {
                result.known_case = Some(entry.clone());
                result.reasons.push(format!("case:{}", entry.canonical_case_name));
            }
        }

        if result.address_route.is_none() {
            if let Some(forward_to) = tables.address_routes.get(&lower) {
                result.address_route = Some(forward_to.clone());
            }
        }
    }

    result
}

/// Resolve a destination address to its forward target: known-case table
/// overrides the plain address-route table, which overrides the default.
pub fn resolve_forward_to(result: &RecognitionResult, default_forward_to: &str) -> String {
    if let Some(known) = &result.known_case {
        return known.forward_to.clone();
    }
    if let Some(route) = &result.address_route {
        return route.clone();
    }
    default_forward_to.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Kind, Principals};
    use chrono::Utc;

    fn envelope_with_to(to: &[&str]) -> Envelope {
        Envelope::new(
            "id-1".into(),
            Kind::Email,
            Utc::now(),
            "sender@example.com".into(),
            Principals {
                from: vec!["sender@example.com".into()],
                to: to.iter().map(|s| s.to_string()).collect(),
                cc: vec![],
                bcc: vec![],
            },
            Some("subject".into()),
            "body",
            4,
            HashMap::new(),
            vec![],
            Some("identity".into()),
            vec![],
        )
    }

    #[test]
    fn extracts_case_key_from_address() {
        let env = envelope_with_to(&["arias-v-bianchi@chitty.cc"]);
        let result = recognize(&env, &RecognizerTables::default());
        assert_eq!(result.case_key.as_deref(), Some("arias_v_bianchi"));
        assert!(result.reasons.contains(&"case_address:arias_v_bianchi".to_string()));
    }

    #[test]
    fn case_insensitive_extraction() {
        let env = envelope_with_to(&["Arias-V-Bianchi@Chitty.cc"]);
        let result = recognize(&env, &RecognizerTables::default());
        assert_eq!(result.case_key.as_deref(), Some("arias_v_bianchi"));
    }

    #[test]
    fn first_case_address_wins_others_add_reasons_only() {
        let env = envelope_with_to(&["arias-v-bianchi@chitty.cc", "smith-v-jones@chitty.cc"]);
        let result = recognize(&env, &RecognizerTables::default());
        assert_eq!(result.case_key.as_deref(), Some("arias_v_bianchi"));
        assert!(result.reasons.contains(&"case_address:smith_v_jones".to_string()));
    }

    #[test]
    fn known_case_overrides_routing_not_case_key() {
        let mut tables = RecognizerTables::default();
        tables.known_cases.insert(
            "arias-v-bianchi@chitty.cc".into(),
            KnownCaseEntry {
                canonical_case_name: "ARIAS_v_BIANCHI".into(),
                forward_to: "nick@chitty.cc".into(),
                default_priority: None,
            },
        );
        let env = envelope_with_to(&["arias-v-bianchi@chitty.cc"]);
        let result = recognize(&env, &tables);
        assert_eq!(result.case_key.as_deref(), Some("arias_v_bianchi"));
        assert_eq!(
            resolve_forward_to(&result, "default@chitty.cc"),
            "nick@chitty.cc"
        );
    }

    #[test]
    fn address_route_table_used_when_no_known_case() {
        let mut tables = RecognizerTables::default();
        tables
            .address_routes
            .insert("legal@chitty.cc".into(), "nick@chitty.cc".into());
        let env = envelope_with_to(&["legal@chitty.cc"]);
        let result = recognize(&env, &tables);
        assert_eq!(
            resolve_forward_to(&result, "default@chitty.cc"),
            "nick@chitty.cc"
        );
    }

    #[test]
    fn falls_back_to_default_route() {
        let env = envelope_with_to(&["random@chitty.cc"]);
        let result = recognize(&env, &RecognizerTables::default());
        assert_eq!(
            resolve_forward_to(&result, "default@chitty.cc"),
            "default@chitty.cc"
        );
    }

    #[test]
    fn to_examined_before_cc() {
        let mut tables = RecognizerTables::default();
        tables
            .address_routes
            .insert("to-route@chitty.cc".into(), "to-target@chitty.cc".into());
        tables
            .address_routes
            .insert("cc-route@chitty.cc".into(), "cc-target@chitty.cc".into());

        let env = Envelope::new(
            "id-2".into(),
            Kind::Email,
            Utc::now(),
            "sender@example.com".into(),
            Principals {
                from: vec!["sender@example.com".into()],
                to: vec!["to-route@chitty.cc".into()],
                cc: vec!["cc-route@chitty.cc".into()],
                bcc: vec![],
            },
            Some("subject".into()),
            "body",
            4,
            HashMap::new(),
            vec![],
            Some("identity".into()),
            vec![],
        );
        let result = recognize(&env, &tables);
        assert_eq!(
            resolve_forward_to(&result, "default@chitty.cc"),
            "to-target@chitty.cc"
        );
    }

    #[test]
    fn loads_tables_from_json() {
        let json = r#"{
            "known_cases": {
                "arias-v-bianchi@chitty.cc": {
                    "canonical_case_name": "ARIAS_v_BIANCHI",
                    "forward_to": "nick@chitty.cc",
                    "default_priority": "CRITICAL"
                }
            },
            "address_routes": {
                "legal@chitty.cc": "nick@chitty.cc"
            }
        }"#;
        let tables = RecognizerTables::from_json(json).unwrap();
        assert_eq!(tables.known_cases.len(), 1);
        assert_eq!(tables.address_routes.get("legal@chitty.cc").unwrap(), "nick@chitty.cc");
        let entry = &tables.known_cases["arias-v-bianchi@chitty.cc"];
        assert_eq!(entry.default_priority, Some(crate::triage::UrgencyLevel::Critical));
    }
}
