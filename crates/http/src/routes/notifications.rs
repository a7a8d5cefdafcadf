use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relaykit_common::types::{Notification, PaginationMeta};
use relaykit_common::Error;

use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread_count", get(unread_count))
        .route("/notifications/mark_all_read", patch(mark_all_read))
        .route("/notifications/{id}/read", patch(mark_read))
}

#[derive(Deserialize)]
struct ListNotificationsQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    unread: Option<bool>,
}

#[derive(Serialize)]
struct NotificationListResponse {
    notifications: Vec<Notification>,
    meta: PaginationMeta,
}

async fn list_notifications(State(state): State<AppState>, auth: AuthUser, Query(query): Query<ListNotificationsQuery>) -> Result<Json<NotificationListResponse>, AppError> {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(20);
    let unread_only = query.unread.unwrap_or(false);

    let (notifications, total) = state.engine.store.list_notifications(auth.user_id, page, per_page, unread_only).await?;
    Ok(Json(NotificationListResponse { notifications, meta: PaginationMeta::new(page.max(1), per_page, total) }))
}

#[derive(Serialize)]
struct UnreadCountResponse {
    unread_count: i64,
}

async fn unread_count(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UnreadCountResponse>, AppError> {
    let unread_count = state.engine.store.unread_count(auth.user_id).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

async fn mark_read(State(state): State<AppState>, auth: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Notification>, AppError> {
    let notification = state.engine.store.get_notification(id).await?.ok_or(Error::NotFound("notification".into()))?;
    if notification.recipient_id != auth.user_id {
        return Err(Error::NotFound("notification".into()).into());
    }
    state.engine.mark_notification_read(auth.user_id, id).await?;
    let notification = state.engine.store.get_notification(id).await?.ok_or(Error::NotFound("notification".into()))?;
    Ok(Json(notification))
}

#[derive(Serialize)]
struct MarkAllReadResponse {
    marked_count: i64,
}

async fn mark_all_read(State(state): State<AppState>, auth: AuthUser) -> Result<Json<MarkAllReadResponse>, AppError> {
    let marked_count = state.engine.mark_all_notifications_read(auth.user_id).await?;
    Ok(Json(MarkAllReadResponse { marked_count }))
}
