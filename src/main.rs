//! Binary entry point: wires configuration, every pipeline dependency, and
//! the axum HTTP ingress surface together, then serves `/intake` until
//! terminated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chitty_gateway::capabilities::{Forwarder, Sink};
use chitty_gateway::classifier::{Classifier, ClassifierAdapter, HttpClassifier, NullClassifier};
use chitty_gateway::config::Config;
use chitty_gateway::envelope::Kind;
use chitty_gateway::forwarder::{GuardedForwarder, LettreForwarder, NullForwarder, SmtpConfig};
use chitty_gateway::http::{routes, AppState};
use chitty_gateway::metrics::MetricsSink;
use chitty_gateway::normalize::email::EmailNormalizer;
use chitty_gateway::normalize::image_video::ImageVideoNormalizer;
use chitty_gateway::normalize::json_api::JsonApiNormalizer;
use chitty_gateway::normalize::pdf::PdfNormalizer;
use chitty_gateway::normalize::sms_text::SmsTextNormalizer;
use chitty_gateway::normalize::url::UrlNormalizer;
use chitty_gateway::normalize::voice::VoiceNormalizer;
use chitty_gateway::normalize::Normalizer;
use chitty_gateway::pipeline::Coordinator;
use chitty_gateway::recognizer::RecognizerTables;
use chitty_gateway::sink::{FsBlobSink, InMemorySink, SinkManager};

/// Exit codes for the CLI harness (spec §6): `0` success, `64` config
/// error, `69` dependency unavailable at startup, `70` internal error.
const EXIT_CONFIG_ERROR: i32 = 64;
const EXIT_DEPENDENCY_UNAVAILABLE: i32 = 69;
const EXIT_INTERNAL_ERROR: i32 = 70;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let recognizer_tables = match load_recognizer_tables() {
        Ok(tables) => tables,
        Err(e) => {
            tracing::error!(error = %e, "failed to load recognizer tables");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let normalizers = build_normalizers();

    let classifier: Arc<dyn Classifier> = match std::env::var("CLASSIFIER_ENDPOINT") {
        Ok(endpoint) => {
            tracing::info!(endpoint, "classifier: HTTP endpoint configured");
            Arc::new(HttpClassifier::new(endpoint, Duration::from_secs(5)))
        }
        Err(_) => {
            tracing::warn!(
                "CLASSIFIER_ENDPOINT not set; every item scores classifier_unavailable"
            );
            Arc::new(NullClassifier)
        }
    };
    let classifier_adapter = ClassifierAdapter::new(
        classifier,
        config.classifier_timeout_ms,
        config.classifier_cache_ttl_secs,
    );

    let sink_manager = build_sink_manager();

    let forwarder: Arc<dyn Forwarder> = match smtp_config_from_env() {
        Some(smtp) => {
            tracing::info!(host = %smtp.relay_host, "forwarder: SMTP relay configured");
            Arc::new(LettreForwarder::new(smtp))
        }
        None => {
            tracing::warn!("SMTP relay not configured; forwards will fail and be logged as such");
            Arc::new(NullForwarder)
        }
    };
    let guarded_forwarder = GuardedForwarder::new(forwarder);

    let metrics = Arc::new(MetricsSink::new());

    let coordinator = Arc::new(Coordinator::new(
        config,
        normalizers,
        recognizer_tables,
        classifier_adapter,
        sink_manager,
        guarded_forwarder,
        metrics.clone(),
        None, // IdAuthority: opaque external capability, not wired by default
        None, // PdfExtractor
        None, // Transcriber
        None, // VisionDescriber
    ));

    let state = AppState { coordinator, metrics };
    let app = routes(state);

    let port: u16 = std::env::var("GATEWAY_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port, "failed to bind intake listener");
            std::process::exit(EXIT_INTERNAL_ERROR);
        }
    };

    tracing::info!(port, "chitty-gateway listening on /intake");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(EXIT_INTERNAL_ERROR);
    }
}

/// Registers one `Normalizer` per `Kind` the intake surface accepts.
fn build_normalizers() -> HashMap<Kind, Arc<dyn Normalizer>> {
    let mut normalizers: HashMap<Kind, Arc<dyn Normalizer>> = HashMap::new();
    normalizers.insert(Kind::Email, Arc::new(EmailNormalizer));
    normalizers.insert(Kind::Pdf, Arc::new(PdfNormalizer));
    normalizers.insert(Kind::Voice, Arc::new(VoiceNormalizer));
    normalizers.insert(Kind::Api, Arc::new(JsonApiNormalizer::api()));
    normalizers.insert(Kind::Json, Arc::new(JsonApiNormalizer::json()));
    normalizers.insert(Kind::Url, Arc::new(UrlNormalizer::new()));
    normalizers.insert(Kind::Sms, Arc::new(SmsTextNormalizer::sms()));
    normalizers.insert(Kind::Text, Arc::new(SmsTextNormalizer::text()));
    normalizers.insert(Kind::Image, Arc::new(ImageVideoNormalizer::image()));
    normalizers.insert(Kind::Video, Arc::new(ImageVideoNormalizer::video()));
    normalizers
}

/// Loads the known-case/address-route tables from `GATEWAY_TABLES_PATH`
/// when set (§4.2/§9: "treat as configuration with the exact set of
/// enumerated entries"), falling back to empty tables otherwise.
fn load_recognizer_tables() -> Result<RecognizerTables, String> {
    match std::env::var("GATEWAY_TABLES_PATH") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"))?;
            RecognizerTables::from_json(&text).map_err(|e| format!("{path}: {e}"))
        }
        Err(_) => Ok(RecognizerTables::default()),
    }
}

/// The reference sink wiring: in-memory metadata/recent-log/vector-index
/// sinks plus a filesystem-backed blob sink rooted at `GATEWAY_BLOB_ROOT`.
/// A production deployment swaps these for real Sink capabilities (§1,
/// §6) without touching the pipeline.
fn build_sink_manager() -> SinkManager {
    let blob_root =
        std::env::var("GATEWAY_BLOB_ROOT").unwrap_or_else(|_| "./data/blobs".to_string());
    let sinks: Vec<Arc<dyn Sink>> = vec![
        Arc::new(InMemorySink::new("metadata")),
        Arc::new(InMemorySink::new("recent_log")),
        Arc::new(InMemorySink::new("vector_index")),
        Arc::new(FsBlobSink::new("blob", blob_root)),
    ];
    SinkManager::new(sinks)
}

fn smtp_config_from_env() -> Option<SmtpConfig> {
    Some(SmtpConfig {
        relay_host: std::env::var("SMTP_RELAY_HOST").ok()?,
        relay_port: std::env::var("SMTP_RELAY_PORT").ok()?.parse().ok()?,
        username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
        password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
        from_address: std::env::var("SMTP_FROM_ADDRESS").ok()?,
    })
}
