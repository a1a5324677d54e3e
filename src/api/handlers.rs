use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::{FilterObject, RateLimitState, ResultMovie};
use crate::services::pipeline::DiscoverState;

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub prompt: String,
}

/// Full discovery view: the last prompt, what the model understood, the
/// movies it matched, and the rate-limit status
#[derive(Debug, Serialize)]
pub struct DiscoverView {
    pub prompt: String,
    pub filters: Option<FilterObject>,
    /// Human-readable explanation of the active filters
    pub reasons: Vec<String>,
    pub movies: Vec<ResultMovie>,
    pub error: Option<String>,
    pub rate_limit: RateLimitView,
}

impl DiscoverView {
    fn from_snapshot(state: DiscoverState, rate_limit: RateLimitState) -> Self {
        Self {
            prompt: state.prompt,
            reasons: state
                .filters
                .as_ref()
                .map(FilterObject::describe)
                .unwrap_or_default(),
            filters: state.filters,
            movies: state.movies,
            error: state.error,
            rate_limit: RateLimitView::from(rate_limit),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RateLimitView {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Option<String>,
    pub exhausted: bool,
    pub low: bool,
}

impl From<RateLimitState> for RateLimitView {
    fn from(state: RateLimitState) -> Self {
        Self {
            exhausted: state.is_exhausted(),
            low: state.is_low(),
            limit: state.limit,
            remaining: state.remaining,
            reset_at: state.reset_at.map(|t| t.to_rfc3339()),
        }
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Run the discovery pipeline for a prompt.
///
/// Empty prompts and submissions that overlap an in-flight request are
/// ignored; the current view is returned unchanged.
pub async fn discover(
    State(state): State<AppState>,
    Json(request): Json<DiscoverRequest>,
) -> AppResult<Json<DiscoverView>> {
    state.pipeline.submit(&request.prompt).await?;

    let (discover_state, rate_limit) = state.pipeline.snapshot().await;
    Ok(Json(DiscoverView::from_snapshot(discover_state, rate_limit)))
}

/// Current session view (restored from storage at startup when still live)
pub async fn get_session(State(state): State<AppState>) -> Json<DiscoverView> {
    let (discover_state, rate_limit) = state.pipeline.snapshot().await;
    Json(DiscoverView::from_snapshot(discover_state, rate_limit))
}

/// Clear the saved session and reset the in-memory view
pub async fn clear_session(State(state): State<AppState>) -> Json<DiscoverView> {
    state.pipeline.clear().await;

    let (discover_state, rate_limit) = state.pipeline.snapshot().await;
    Json(DiscoverView::from_snapshot(discover_state, rate_limit))
}

/// Current rate-limit status
pub async fn get_rate_limit(State(state): State<AppState>) -> Json<RateLimitView> {
    let (_, rate_limit) = state.pipeline.snapshot().await;
    Json(RateLimitView::from(rate_limit))
}
