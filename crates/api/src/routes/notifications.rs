//! Notification inbox and settings handlers.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use orchard_core::NotificationId;

use super::{ApiJson, ApiPath, ApiResponse};
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Notification, SettingView};
use crate::state::AppState;

/// Body of the unread-count response.
#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct SettingEntry {
    pub id: i64,
    pub enabled: bool,
}

/// Body of `PUT /api/notifications/settings`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub notification_settings: Vec<SettingEntry>,
}

/// GET /api/notifications
///
/// # Errors
///
/// Returns `AppError` if the inbox cannot be read.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
) -> Result<ApiResponse<Vec<Notification>>> {
    let notifications = state.inbox().list(principal.user_id).await?;
    Ok(ApiResponse::ok(
        "Notifications retrieved successfully",
        notifications,
    ))
}

/// GET /api/notifications/unread-count
///
/// # Errors
///
/// Returns `AppError` if the inbox cannot be read.
pub async fn unread_count(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
) -> Result<ApiResponse<UnreadCount>> {
    let count = state.inbox().unread_count(principal.user_id).await?;
    Ok(ApiResponse::ok(
        "Unread count retrieved successfully",
        UnreadCount { count },
    ))
}

/// POST /api/notifications/{id}/read
///
/// # Errors
///
/// Returns 404 unless the notification belongs to the caller.
pub async fn mark_as_read(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<()>> {
    state
        .inbox()
        .mark_read(principal.user_id, NotificationId::new(id))
        .await?;
    Ok(ApiResponse::ok("Notification marked as read", ()))
}

/// GET /api/notifications/settings
///
/// # Errors
///
/// Returns `AppError` if the settings cannot be loaded.
pub async fn settings(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
) -> Result<ApiResponse<Vec<SettingView>>> {
    let settings = state.settings().get_or_create(principal.user_id).await?;
    Ok(ApiResponse::ok(
        "Notification settings retrieved successfully",
        settings.views(),
    ))
}

/// PUT /api/notifications/settings
///
/// # Errors
///
/// Returns 422 for a setting id other than 1 or 2.
pub async fn update_settings(
    State(state): State<AppState>,
    RequireAuth(principal): RequireAuth,
    ApiJson(body): ApiJson<UpdateSettingsRequest>,
) -> Result<ApiResponse<Vec<SettingView>>> {
    let entries: Vec<(i64, bool)> = body
        .notification_settings
        .iter()
        .map(|entry| (entry.id, entry.enabled))
        .collect();
    let settings = state
        .settings()
        .update(principal.user_id, &entries)
        .await?;
    Ok(ApiResponse::ok(
        "Notification settings updated successfully",
        settings.views(),
    ))
}
