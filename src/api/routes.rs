//! REST 接口

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::api::AppState;
use crate::error::AppError;
use crate::models::Job;
use crate::orchestrator::job_engine::STAGE_RECEIVED_REST;

pub async fn health() -> Json<JsonValue> {
    Json(json!({
        "ok": true,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// 提交任务
pub async fn submit(State(state): State<AppState>, Json(job): Json<Job>) -> Response {
    state.engine.ensure_started();
    match state.engine.submit(job, None, STAGE_RECEIVED_REST) {
        Ok(id) => {
            info!("📥 收到任务 {}", id);
            Json(json!({ "id": id, "status": "queued" })).into_response()
        }
        Err(e) => bad_request(&e),
    }
}

/// 轮询结果
pub async fn poll(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.result(&id) {
        Some(result) => Json(result.to_response(&id)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" }))).into_response(),
    }
}

fn bad_request(err: &AppError) -> Response {
    warn!("⚠️ 拒绝任务: {}", err);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": err.to_string(), "error_type": err.kind() })),
    )
        .into_response()
}
