//! HTTP diagnostics surface: `/health`, `/ready`, `/status`, `/diagnostics`.
//!
//! Served on its own axum router, independent of the pub/sub consumption
//! loop, per the supervisor's "external collaborator" contract. None of
//! these routes touch notification semantics.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use nf_db::SharedDatabase;
use nf_queue::QueueConsumer;
use nf_status::ServiceStatus;
use serde_json::json;

#[derive(Clone)]
pub struct HealthState {
    pub status: Arc<ServiceStatus>,
    pub db: SharedDatabase,
    pub consumer: Arc<dyn QueueConsumer>,
    pub known_processor_types: Vec<String>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<serde_json::Value>) {
    if state.status.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "mode": state.status.mode() })),
        )
    }
}

async fn status_handler(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(json!(state.status.snapshot()))
}

async fn diagnostics_handler(State(state): State<HealthState>) -> Json<serde_json::Value> {
    let snapshot = state.status.snapshot();
    let pool = state.db.pool_snapshot();

    Json(json!({
        "mode": snapshot.mode,
        "pool": {
            "size": pool.size,
            "idle": pool.idle,
            "num_waiting": pool.num_waiting,
            "last_success_epoch_ms": pool.last_success_epoch_ms,
            "last_error_epoch_ms": pool.last_error_epoch_ms,
        },
        "consumer": {
            "identifier": state.consumer.identifier(),
            "healthy": state.consumer.is_healthy(),
        },
        "processors": state.known_processor_types,
    }))
}
