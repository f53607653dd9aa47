// HTTP API routes: health, scoreboard and Prometheus metrics. Read-only.

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::Database;
use crate::metrics;
use crate::scoreboard::Scoreboard;
use crate::scoring::ScoringPolicy;

pub const SERVICE_NAME: &str = "pwnts-collector";

#[derive(Clone)]
pub struct AppState {
    pub scoreboard: Arc<Scoreboard>,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(db: Arc<Database>, policy: ScoringPolicy) -> Router {
    let state = AppState {
        scoreboard: Arc::new(Scoreboard::new(db, policy)),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/scoreboard", get(get_scoreboard))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

async fn get_scoreboard(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp();
    match state.scoreboard.compute(now).await {
        Ok(standings) => (StatusCode::OK, Json(json!(standings))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
