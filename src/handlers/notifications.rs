use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;

use crate::error::AppError;
use crate::identity::CurrentUser;
use crate::models::{CreateNotificationRequest, ListQuery, Notification};
use crate::state::AppState;

const MAX_PAGE_SIZE: usize = 200;

pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(state.stream.page_size)
        .clamp(1, MAX_PAGE_SIZE);
    let notifications = state.hub.get_notifications(user.id(), limit).await?;
    Ok(Json(notifications))
}

pub async fn unread_count_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let count = state.hub.get_unread_count(user.id()).await?;
    Ok(Json(json!({ "count": count })))
}

pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.hub.mark_as_read(id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.hub.mark_all_as_read(user.id()).await?;
    Ok(Json(json!({ "updated": updated })))
}

// Entry point for business logic that raises a notification on behalf of the caller
pub async fn create_notification_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor_id): CurrentUser,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("userId is required".to_string()));
    }
    if payload.kind.trim().is_empty() {
        return Err(AppError::BadRequest("type is required".to_string()));
    }

    let created = state
        .hub
        .create_notification(payload.into_new(actor_id))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}
