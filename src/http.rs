//! Universal intake surface (§6): `POST /intake` accepts any supported
//! input kind, plus health and observability endpoints over the same
//! `MetricsSink` every pipeline run populates.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::envelope::Kind;
use crate::normalize::{detect_kind, RawInput};
use crate::pipeline::{Coordinator, PipelineOutcome};

/// Shared state for every intake route.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub metrics: Arc<crate::metrics::MetricsSink>,
}

/// Build the Axum router for the intake surface.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/intake", post(intake))
        .route("/intake/health", get(intake_health))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn supported_types() -> Vec<&'static str> {
    vec![
        "EMAIL", "PDF", "VOICE", "API", "JSON", "URL", "SMS", "IMAGE", "VIDEO", "TEXT",
    ]
}

/// `GET /health` (§6): process liveness. Degrades to `degraded` only when
/// a dependency this process owns directly (the metrics sink) can't be
/// reached; the pipeline's own capabilities are opaque and report their
/// own unavailability per-request instead of here.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.metrics.stats().await;
    Json(serde_json::json!({
        "status": "healthy",
        "services": {
            "pipeline": "ok",
            "metrics": "ok",
            "processed_total": stats.total,
        },
        "version": VERSION,
        "timestamp": chrono::Utc::now(),
    }))
}

/// `GET /intake/health` (§6): capability advertisement for the universal
/// intake surface, distinct from the process-liveness `/health`.
async fn intake_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "supportedTypes": supported_types(),
        "version": VERSION,
        "timestamp": chrono::Utc::now(),
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.metrics.stats().await;
    let urgent = state.metrics.urgent_items().await;
    Json(serde_json::json!({ "stats": stats, "urgent_items": urgent }))
}

/// The JSON envelope the intake endpoint accepts. `kind` is optional —
/// when absent, `detect_kind` runs the §4.1 ordered detection rule.
#[derive(Debug, Deserialize)]
struct IntakeRequest {
    kind: Option<String>,
    source: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    /// Base64-encoded payload bytes.
    body: String,
}

fn parse_kind(token: &str) -> Option<Kind> {
    match token.to_lowercase().as_str() {
        "email" => Some(Kind::Email),
        "pdf" => Some(Kind::Pdf),
        "voice" => Some(Kind::Voice),
        "api" => Some(Kind::Api),
        "json" => Some(Kind::Json),
        "url" => Some(Kind::Url),
        "sms" => Some(Kind::Sms),
        "image" => Some(Kind::Image),
        "video" => Some(Kind::Video),
        "text" => Some(Kind::Text),
        _ => None,
    }
}

async fn intake(State(state): State<AppState>, Json(req): Json<IntakeRequest>) -> impl IntoResponse {
    let bytes = match base64::engine::general_purpose::STANDARD.decode(&req.body) {
        Ok(bytes) => bytes,
        Err(detail) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "success": false, "error": "invalid_body_encoding", "detail": detail.to_string() })),
            )
                .into_response();
        }
    };

    let mut raw = RawInput {
        kind: Kind::Text,
        source: req.source,
        bytes,
        declared_content_type: req.content_type,
        file_name: req.file_name,
    };
    raw.kind = match req.kind.as_deref().and_then(parse_kind) {
        Some(kind) => kind,
        None => detect_kind(&raw),
    };

    match state.coordinator.run_one(raw).await {
        PipelineOutcome::Delivered {
            envelope_id,
            kind,
            identity,
            category,
            received_at,
            routing,
            forwarded,
        } => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": envelope_id,
                "kind": kind,
                "identity": identity,
                "attribution": category,
                "storage": {
                    "tier": routing.tier,
                    "sinks": routing.sinks,
                },
                "routing": {
                    "destinations": routing.destinations,
                },
                "forwarded": forwarded,
                "reason_code": routing.reason_code,
                "timestamp": received_at,
            })),
        )
            .into_response(),
        PipelineOutcome::Dropped { envelope_id, reason_token } => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "id": envelope_id,
                "error": reason_token,
            })),
        )
            .into_response(),
        PipelineOutcome::Failed { envelope_id, detail } => {
            warn!(id = %envelope_id, %detail, "intake pipeline failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "id": envelope_id,
                    "error": "internal_error",
                })),
            )
                .into_response()
        }
    }
}
