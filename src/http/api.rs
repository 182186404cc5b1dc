//! Axum handlers for `/api/*` routes.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use super::ApiState;
use crate::agent::response::Request;

/// POST /api/request
pub(super) async fn request(State(state): State<ApiState>, Json(req): Json<Request>) -> Response {
    let id = req.id;
    match state.agent.answer(req).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            error!(id, error = %e, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": format!("Ошибка обработки запроса: {e}") })),
            )
                .into_response()
        }
    }
}

/// GET /api/health
pub(super) async fn health(State(state): State<ApiState>) -> Response {
    let provider = state.agent.provider();
    let body = json!({
        "status": "ok",
        "provider": provider.name(),
        "model": provider.model(),
        "search_enabled": state.agent.search_enabled(),
    });
    (StatusCode::OK, Json(body)).into_response()
}
