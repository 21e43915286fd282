//! HTTP / WebSocket 接口
//!
//! 只做协议转换：解析请求、提交到任务引擎、返回结果

pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::orchestrator::JobEngine;

/// 各个 handler 共享的状态
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<JobEngine>,
}

pub fn router(engine: Arc<JobEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health).head(routes::health))
        .route("/translate", post(routes::submit))
        .route("/translate/:id", get(routes::poll))
        .route("/ws", get(ws::upgrade))
        .with_state(AppState { engine })
        .layer(cors)
}
