//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了HTTP接口的错误响应映射。

use crate::error::CacheError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// HTTP接口错误
#[derive(Debug)]
pub struct ApiError(pub CacheError);

impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            CacheError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CacheError::RebuildInProgress { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "REBUILD_IN_PROGRESS")
            }
            CacheError::RebuildAlreadyInProgress { .. } => {
                (StatusCode::CONFLICT, "REBUILD_IN_PROGRESS")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {}", self.0);
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.0.to_string(),
            },
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
