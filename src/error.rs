use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        limit: u32,
        reset_at: Option<DateTime<Utc>>,
        retry_after: Option<u64>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::RateLimited {
                message,
                limit,
                reset_at,
                retry_after,
            } => {
                let body = Json(json!({
                    "error": message,
                    "limit": limit,
                    "resetAt": reset_at.map(|t| t.to_rfc3339()),
                    "retryAfter": retry_after,
                }));

                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                    headers.insert("X-RateLimit-Limit", value);
                }
                headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
                if let Some(reset) = reset_at {
                    if let Ok(value) = HeaderValue::from_str(&reset.to_rfc3339()) {
                        headers.insert("X-RateLimit-Reset", value);
                    }
                }
                response
            }
            other => {
                let (status, message) = match other {
                    AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
                    AppError::Cache(_) | AppError::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
                    }
                    AppError::Parse(_) => (StatusCode::BAD_GATEWAY, other.to_string()),
                    AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
                    AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, other.to_string()),
                    AppError::RateLimited { .. } => unreachable!(),
                };

                let body = Json(json!({
                    "error": message
                }));

                (status, body).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
