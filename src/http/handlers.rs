use super::state::AppState;
use crate::session::SessionStats;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// GET /sessions
/// Statistics for every live recognition session
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionStats>> {
    Json(state.handler.stats().await)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
