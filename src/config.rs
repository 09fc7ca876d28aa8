//! Gateway configuration — typed environment-variable loading with defaults.
//!
//! Mirrors the teacher's `EmailConfig::from_env` pattern: every recognized
//! setting has a default, and `Config::from_map` rejects anything outside
//! the known key set instead of silently ignoring typos.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;

/// Recognized configuration, with defaults matching spec §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_envelope_bytes: u64,
    pub max_attachment_bytes: u64,
    pub classifier_timeout_ms: u64,
    pub classifier_cache_ttl_secs: u64,
    pub pipeline_deadline_ms: u64,
    pub max_inflight: usize,
    pub retain_full_content: bool,
    pub allow_anonymous: bool,
    pub per_sender_hour_limit: u32,
    pub per_domain_hour_limit: u32,
    pub dedup_ttl_seconds: u64,
    pub content_truncate_length: usize,
    /// Destination used when no address-route/known-case entry matches.
    pub default_forward_to: String,
}

/// Keys `Config::from_map` recognizes — anything else is rejected.
const RECOGNIZED_KEYS: &[&str] = &[
    "max_envelope_bytes",
    "max_attachment_bytes",
    "classifier_timeout_ms",
    "classifier_cache_ttl_secs",
    "pipeline_deadline_ms",
    "max_inflight",
    "retain_full_content",
    "allow_anonymous",
    "per_sender_hour_limit",
    "per_domain_hour_limit",
    "dedup_ttl_seconds",
    "content_truncate_length",
    "default_forward_to",
];

impl Default for Config {
    fn default() -> Self {
        Self {
            max_envelope_bytes: 50 * 1024 * 1024,
            max_attachment_bytes: 25 * 1024 * 1024,
            classifier_timeout_ms: 2000,
            classifier_cache_ttl_secs: 30 * 60,
            pipeline_deadline_ms: 30_000,
            max_inflight: 100,
            retain_full_content: false,
            allow_anonymous: false,
            per_sender_hour_limit: 200,
            per_domain_hour_limit: 500,
            dedup_ttl_seconds: 86_400,
            content_truncate_length: 2000,
            default_forward_to: "intake@chitty.cc".to_string(),
        }
    }
}

impl Config {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset. Env vars are the upper-snake-case form
    /// of the recognized key (e.g. `MAX_ENVELOPE_BYTES`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut map = HashMap::new();
        for key in RECOGNIZED_KEYS {
            let env_name = key.to_uppercase();
            if let Ok(val) = std::env::var(&env_name) {
                map.insert((*key).to_string(), val);
            }
        }
        Self::from_map(&map)
    }

    /// Build configuration from an explicit key/value map, rejecting any
    /// key outside [`RECOGNIZED_KEYS`].
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let recognized: HashSet<&str> = RECOGNIZED_KEYS.iter().copied().collect();
        let mut config = Config::default();

        for (key, value) in map {
            if !recognized.contains(key.as_str()) {
                return Err(ConfigError::UnrecognizedKey(key.clone()));
            }
            apply(&mut config, key, value)?;
        }

        Ok(config)
    }

    /// Defaults suitable for unit/integration tests.
    pub fn for_tests() -> Self {
        Config::default()
    }
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };
    let parse_u64 = |v: &str| v.parse::<u64>().map_err(|e| invalid(e.to_string()));
    let parse_usize = |v: &str| v.parse::<usize>().map_err(|e| invalid(e.to_string()));
    let parse_u32 = |v: &str| v.parse::<u32>().map_err(|e| invalid(e.to_string()));
    let parse_bool = |v: &str| v.parse::<bool>().map_err(|e| invalid(e.to_string()));

    match key {
        "max_envelope_bytes" => config.max_envelope_bytes = parse_u64(value)?,
        "max_attachment_bytes" => config.max_attachment_bytes = parse_u64(value)?,
        "classifier_timeout_ms" => config.classifier_timeout_ms = parse_u64(value)?,
        "classifier_cache_ttl_secs" => config.classifier_cache_ttl_secs = parse_u64(value)?,
        "pipeline_deadline_ms" => config.pipeline_deadline_ms = parse_u64(value)?,
        "max_inflight" => config.max_inflight = parse_usize(value)?,
        "retain_full_content" => config.retain_full_content = parse_bool(value)?,
        "allow_anonymous" => config.allow_anonymous = parse_bool(value)?,
        "per_sender_hour_limit" => config.per_sender_hour_limit = parse_u32(value)?,
        "per_domain_hour_limit" => config.per_domain_hour_limit = parse_u32(value)?,
        "dedup_ttl_seconds" => config.dedup_ttl_seconds = parse_u64(value)?,
        "content_truncate_length" => {
            let n = parse_usize(value)?;
            if !(1000..=2000).contains(&n) {
                return Err(invalid(format!(
                    "content_truncate_length must be in 1000..=2000, got {n}"
                )));
            }
            config.content_truncate_length = n;
        }
        "default_forward_to" => config.default_forward_to = value.to_string(),
        other => return Err(ConfigError::UnrecognizedKey(other.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.max_envelope_bytes, 50 * 1024 * 1024);
        assert_eq!(c.max_attachment_bytes, 25 * 1024 * 1024);
        assert_eq!(c.classifier_timeout_ms, 2000);
        assert_eq!(c.pipeline_deadline_ms, 30_000);
        assert_eq!(c.max_inflight, 100);
        assert!(!c.retain_full_content);
        assert!(!c.allow_anonymous);
        assert_eq!(c.per_sender_hour_limit, 200);
        assert_eq!(c.per_domain_hour_limit, 500);
        assert_eq!(c.dedup_ttl_seconds, 86_400);
    }

    #[test]
    fn rejects_unrecognized_key() {
        let mut map = HashMap::new();
        map.insert("totally_made_up".to_string(), "1".to_string());
        let result = Config::from_map(&map);
        assert!(matches!(result, Err(ConfigError::UnrecognizedKey(_))));
    }

    #[test]
    fn rejects_invalid_truncate_length() {
        let mut map = HashMap::new();
        map.insert("content_truncate_length".to_string(), "50".to_string());
        let result = Config::from_map(&map);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn overrides_apply() {
        let mut map = HashMap::new();
        map.insert("max_inflight".to_string(), "7".to_string());
        map.insert("allow_anonymous".to_string(), "true".to_string());
        let c = Config::from_map(&map).unwrap();
        assert_eq!(c.max_inflight, 7);
        assert!(c.allow_anonymous);
    }
}
