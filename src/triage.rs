//! Triage Scorer (C4) — deterministic, additive urgency scoring over an
//! envelope and the classifier's output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierOutput, UrgencyHint};
use crate::envelope::Envelope;
use crate::recognizer::RecognitionResult;

/// Destination category, in the priority order §4.4 resolves ties with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Case,
    Evidence,
    Compliance,
    Financial,
    Legal,
    Emergency,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    /// `<10 → INFO`, `10-24 → LOW`, `25-49 → MEDIUM`, `50-79 → HIGH`,
    /// `>=80 → CRITICAL`. Boundaries are inclusive-left.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=9 => UrgencyLevel::Info,
            10..=24 => UrgencyLevel::Low,
            25..=49 => UrgencyLevel::Medium,
            50..=79 => UrgencyLevel::High,
            _ => UrgencyLevel::Critical,
        }
    }

    pub fn is_priority(&self) -> bool {
        matches!(self, UrgencyLevel::High | UrgencyLevel::Critical)
    }
}

/// Triage Scorer output, attached to an envelope as a sibling record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triage {
    pub category: Category,
    pub urgency_score: u32,
    pub urgency_level: UrgencyLevel,
    pub reasons: Vec<String>,
    pub case_key: Option<String>,
}

static COURT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(court|filing|motion|subpoena|hearing)\b").unwrap()
});
static URGENT_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(urgent|asap|immediate|deadline|critical|emergency)\b").unwrap()
});
static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})\b").unwrap()
});
static CREDITOR_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(past due|final notice|collections|debt)\b").unwrap()
});
static COMPLIANCE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(annual report|filing deadline|secretary of state)\b").unwrap()
});
static GOV_OR_COURT_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\.gov$|court)").unwrap()
});

fn haystack(envelope: &Envelope) -> String {
    format!(
        "{} {}",
        envelope.subject.as_deref().unwrap_or(""),
        envelope.preview
    )
}

fn sender_domain(envelope: &Envelope) -> Option<String> {
    let from = envelope.principals.from.first()?;
    from.rsplit('@').next().map(|s| s.to_lowercase())
}

fn header_priority(envelope: &Envelope) -> bool {
    let importance = envelope
        .headers
        .get("importance")
        .map(|v| v.eq_ignore_ascii_case("high"))
        .unwrap_or(false);
    let x_priority = envelope
        .headers
        .get("x-priority")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("high"))
        .unwrap_or(false);
    importance || x_priority
}

/// Score and categorize an envelope. Deterministic: identical inputs
/// (including identical classifier output) always yield the identical
/// score, category, and ordered reasons.
pub fn score(
    envelope: &Envelope,
    classifier: &ClassifierOutput,
    recognition: &RecognitionResult,
) -> Triage {
    let text = haystack(envelope);
    let mut points: u32 = 0;
    let mut reasons = Vec::new();

    let mut has_court = false;
    let mut has_important_sender = false;

    if COURT_WORDS.is_match(&text) {
        points += 25;
        reasons.push("court".to_string());
        has_court = true;
    }
    if URGENT_WORDS.is_match(&text) {
        points += 20;
        reasons.push("urgent".to_string());
    }
    if let Some(domain) = sender_domain(envelope) {
        if GOV_OR_COURT_DOMAIN.is_match(&domain) {
            points += 15;
            let token = if domain.ends_with(".gov") { "gov" } else { "court" };
            reasons.push(format!("important_sender:{token}"));
            has_important_sender = true;
        }
    }
    if DATE_LIKE.is_match(&text) {
        points += 5;
        reasons.push("contains_date".to_string());
    }
    if header_priority(envelope) {
        points += 10;
        reasons.push("header_priority".to_string());
    }

    let mut is_case = false;
    if let Some(case_key) = &recognition.case_key {
        points += 20;
        reasons.push(format!("case_address:{case_key}"));
        is_case = true;
    }

    let mut known_case_critical = false;
    if let Some(known) = &recognition.known_case {
        if known.default_priority == Some(UrgencyLevel::Critical) {
            points += 25;
            reasons.push(format!("case:{}", known.canonical_case_name));
            known_case_critical = true;
        }
    }

    let mut has_creditor = false;
    if CREDITOR_WORDS.is_match(&text) {
        points += 15;
        reasons.push("creditor".to_string());
        has_creditor = true;
    }

    let mut has_compliance = false;
    if COMPLIANCE_WORDS.is_match(&text) {
        points += 10;
        reasons.push("compliance".to_string());
        has_compliance = true;
    }

    let classifier_points = match classifier.urgency_hint {
        UrgencyHint::Critical => 30,
        UrgencyHint::High => 20,
        UrgencyHint::Medium => 10,
        UrgencyHint::Low | UrgencyHint::None => 0,
    };
    if classifier_points > 0 {
        points += classifier_points;
        reasons.push(format!("classifier:{}", classifier.urgency_hint.token()));
    }

    // §4.2: every case-address match beyond the first, and the known-case
    // table entry regardless of its priority, "contribute reasons only" —
    // surface them without re-scoring or duplicating the primary token.
    for reason in &recognition.reasons {
        if !reasons.contains(reason) {
            reasons.push(reason.clone());
        }
    }

    let clamped = points.min(100);
    let urgency_level = UrgencyLevel::from_score(clamped);

    let is_evidence_destination = envelope
        .principals
        .to
        .iter()
        .chain(envelope.principals.cc.iter())
        .any(|addr| addr.to_lowercase().starts_with("evidence@"));

    let category = if is_case || known_case_critical {
        Category::Case
    } else if is_evidence_destination {
        Category::Evidence
    } else if has_compliance {
        Category::Compliance
    } else if has_creditor {
        Category::Financial
    } else if has_court {
        Category::Legal
    } else if URGENT_WORDS.is_match(&text) && has_important_sender {
        Category::Emergency
    } else {
        Category::General
    };

    Triage {
        category,
        urgency_score: clamped,
        urgency_level,
        reasons,
        case_key: recognition.case_key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierOutput;
    use crate::envelope::{Kind, Principals};
    use chrono::Utc;
    use std::collections::HashMap;

    fn base_envelope(subject: &str, body: &str, from: &str) -> Envelope {
        let mut headers = HashMap::new();
        headers.insert("importance".to_string(), "high".to_string());
        Envelope::new(
            "id-1".into(),
            Kind::Email,
            Utc::now(),
            from.into(),
            Principals {
                from: vec![from.to_string()],
                to: vec!["legal@chitty.cc".into()],
                cc: vec![],
                bcc: vec![],
            },
            Some(subject.into()),
            body,
            body.len() as u64,
            headers,
            vec![],
            Some("identity".into()),
            vec![],
        )
    }

    #[test]
    fn urgent_court_deadline_scores_high_or_critical() {
        let env = base_envelope(
            "URGENT: Response Due Tomorrow - Motion to Compel",
            "motion to compel discovery is due by 5:00 PM tomorrow",
            "judge@superior-court.gov",
        );
        let triage = score(&env, &ClassifierOutput::unavailable(), &RecognitionResult::default());
        assert_eq!(triage.category, Category::Legal);
        assert!(triage.urgency_score >= 60);
        assert!(matches!(
            triage.urgency_level,
            UrgencyLevel::High | UrgencyLevel::Critical
        ));
        for expected in ["court", "urgent", "important_sender:gov", "header_priority"] {
            assert!(
                triage.reasons.iter().any(|r| r == expected),
                "missing reason {expected}, got {:?}",
                triage.reasons
            );
        }
    }

    #[test]
    fn creditor_notice_scores_in_financial_band() {
        let env = base_envelope(
            "Final Notice - Account Past Due",
            "90 days past due. Payment of $5,000 required",
            "billing@collections.example.com",
        );
        let triage = score(&env, &ClassifierOutput::unavailable(), &RecognitionResult::default());
        assert_eq!(triage.category, Category::Financial);
        assert!(triage.reasons.contains(&"creditor".to_string()));
        assert!(triage.urgency_score >= 25 && triage.urgency_score <= 80);
    }

    #[test]
    fn case_address_sets_category_case() {
        let mut recognition = RecognitionResult::default();
        recognition.case_key = Some("arias_v_bianchi".to_string());
        recognition.reasons.push("case_address:arias_v_bianchi".to_string());
        let env = base_envelope("Discovery Request", "please produce documents", "a@b.com");
        let triage = score(&env, &ClassifierOutput::unavailable(), &recognition);
        assert_eq!(triage.category, Category::Case);
        assert_eq!(triage.case_key.as_deref(), Some("arias_v_bianchi"));
    }

    #[test]
    fn score_is_clamped_to_100() {
        let mut env = base_envelope(
            "URGENT court filing motion subpoena hearing deadline emergency",
            "past due final notice collections debt annual report filing deadline secretary of state 2024-01-01",
            "x@superior-court.gov",
        );
        env.headers.insert("x-priority".into(), "1".into());
        let classifier = ClassifierOutput {
            category: "legal".into(),
            sentiment: "negative".into(),
            urgency_hint: UrgencyHint::Critical,
            entities: vec![],
        };
        let triage = score(&env, &classifier, &RecognitionResult::default());
        assert_eq!(triage.urgency_score, 100);
    }

    #[test]
    fn determinism_same_inputs_same_output() {
        let env = base_envelope("Urgent", "court filing deadline", "a@court.gov");
        let classifier = ClassifierOutput::unavailable();
        let recognition = RecognitionResult::default();
        let t1 = score(&env, &classifier, &recognition);
        let t2 = score(&env, &classifier, &recognition);
        assert_eq!(t1.urgency_score, t2.urgency_score);
        assert_eq!(t1.category, t2.category);
        assert_eq!(t1.reasons, t2.reasons);
    }

    #[test]
    fn secondary_case_address_and_known_case_reasons_are_merged_without_duplication() {
        let mut recognition = RecognitionResult::default();
        recognition.case_key = Some("arias_v_bianchi".to_string());
        recognition.known_case = Some(crate::recognizer::KnownCaseEntry {
            canonical_case_name: "ARIAS_v_BIANCHI".to_string(),
            forward_to: "nick@chitty.cc".to_string(),
            default_priority: None,
        });
        recognition.reasons = vec![
            "case_address:arias_v_bianchi".to_string(),
            "case:ARIAS_v_BIANCHI".to_string(),
            "case_address:smith_v_jones".to_string(),
        ];
        let env = base_envelope("Discovery Request", "please produce documents", "a@b.com");
        let triage = score(&env, &ClassifierOutput::unavailable(), &recognition);

        // the primary case_address token is added once by the scorer itself
        assert_eq!(
            triage.reasons.iter().filter(|r| *r == "case_address:arias_v_bianchi").count(),
            1
        );
        // the known-case token and the secondary case_address token are
        // "contribute reasons only" — surfaced even though default_priority
        // isn't Critical, with no separate score contribution.
        assert!(triage.reasons.contains(&"case:ARIAS_v_BIANCHI".to_string()));
        assert!(triage.reasons.contains(&"case_address:smith_v_jones".to_string()));
    }

    #[test]
    fn urgency_level_boundaries() {
        assert_eq!(UrgencyLevel::from_score(9), UrgencyLevel::Info);
        assert_eq!(UrgencyLevel::from_score(10), UrgencyLevel::Low);
        assert_eq!(UrgencyLevel::from_score(24), UrgencyLevel::Low);
        assert_eq!(UrgencyLevel::from_score(25), UrgencyLevel::Medium);
        assert_eq!(UrgencyLevel::from_score(49), UrgencyLevel::Medium);
        assert_eq!(UrgencyLevel::from_score(50), UrgencyLevel::High);
        assert_eq!(UrgencyLevel::from_score(79), UrgencyLevel::High);
        assert_eq!(UrgencyLevel::from_score(80), UrgencyLevel::Critical);
    }
}
