//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了促销查询和重建管理的HTTP接口。

mod error;

pub use error::ApiError;

use crate::error::Result;
use crate::metrics::get_metrics_string;
use crate::sync::{RebuildCoordinator, RebuildStatus, ReadGate};
use axum::extract::{Path, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// 查询结果来自正在重建的存储时附带的响应头
pub const REBUILD_IN_PROGRESS_HEADER: HeaderName = HeaderName::from_static("x-rebuild-in-progress");

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub gate: ReadGate,
    pub coordinator: Arc<RebuildCoordinator>,
}

#[derive(Debug, Serialize)]
struct RebuildAccepted {
    generation: u64,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/promotions/{id}", get(get_promotion))
        .route("/admin/rebuild", post(trigger_rebuild))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动HTTP服务，直到 `shutdown` 被取消
pub async fn serve(listen_addr: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn get_promotion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let lookup = state.gate.lookup(&id).await?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        lookup.raw,
    )
        .into_response();
    if lookup.partial {
        response
            .headers_mut()
            .insert(REBUILD_IN_PROGRESS_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

async fn trigger_rebuild(
    State(state): State<AppState>,
) -> std::result::Result<(StatusCode, Json<RebuildAccepted>), ApiError> {
    let generation = state.coordinator.spawn_rebuild()?;
    Ok((StatusCode::ACCEPTED, Json(RebuildAccepted { generation })))
}

async fn status(State(state): State<AppState>) -> Json<RebuildStatus> {
    Json(state.coordinator.status().await)
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        get_metrics_string(),
    )
}

async fn health() -> StatusCode {
    StatusCode::OK
}
