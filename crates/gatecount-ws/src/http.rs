use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use gatecount_domain::{CountUpdate, DomainError, OccupancyService};
use std::sync::Arc;
use tracing::error;

pub struct ApiState {
    occupancy: Arc<OccupancyService>,
    update_token: String,
}

impl ApiState {
    pub fn new(occupancy: Arc<OccupancyService>, update_token: String) -> Self {
        Self {
            occupancy,
            update_token,
        }
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/update", post(update_handler))
        .with_state(state)
}

/// Device-facing count-update endpoint: bearer token, JSON batch, "ACK".
async fn update_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Result<Json<CountUpdate>, JsonRejection>,
) -> Response {
    if !authorized(&headers, &state.update_token) {
        return (StatusCode::UNAUTHORIZED, "unauthorized to send update").into_response();
    }

    let Json(update) = match body {
        Ok(update) => update,
        Err(rejection) => {
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    match state.occupancy.record_update(update).await {
        Ok(()) => (StatusCode::OK, "ACK").into_response(),
        Err(err @ (DomainError::ValidationError(_) | DomainError::InvalidUpdate(_))) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err) => {
            error!(error = %err, "count update failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn authorized(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|presented| presented == token)
        .unwrap_or(false)
}
