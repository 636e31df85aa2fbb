//! HTTP surface of the notification service.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware as axum_middleware,
    response::Response,
    routing::get,
};
use picshare_api_types::NotificationsResponse;

use crate::application::notifications::NotificationService;
use crate::domain::types::UserId;

use super::error::ApiError;
use super::middleware::{log_responses, set_request_context};
use super::{HealthCheck, health_response};

#[derive(Clone)]
pub struct NotifierState {
    pub notifications: Arc<NotificationService>,
    pub health: Arc<dyn HealthCheck>,
}

pub fn build_notifier_router(state: NotifierState) -> Router {
    Router::new()
        .route("/likes/{user_id}", get(list_likes))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn list_likes(
    State(state): State<NotifierState>,
    Path(user_id): Path<i64>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    Ok(Json(
        state
            .notifications
            .list_for_user(UserId::new(user_id))
            .await?,
    ))
}

async fn health(State(state): State<NotifierState>) -> Response {
    health_response(state.health.check().await)
}
