//! Read-only REST endpoints over stored notifications.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::DatabaseError;
use crate::pipeline::types::NotificationRecord;
use crate::store::{Database, NotificationFilter};

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<dyn Database>,
}

/// Errors returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Notification {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(e) => {
                error!(error = %e, "Notification query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Build the router for the notification query API.
pub fn notification_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/{id}", get(get_notification))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_notifications(
    State(state): State<ApiState>,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<Vec<NotificationRecord>>, ApiError> {
    let records = state.db.list_notifications(&filter.normalized()).await?;
    Ok(Json(records))
}

async fn get_notification(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecord>, ApiError> {
    state
        .db
        .get_notification(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}
