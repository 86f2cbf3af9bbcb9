//! Admin dashboard notifications and their live SSE feed.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use nurture_core::types::{AdminNotification, NotificationStatus};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    pub status: Option<String>,
}

/// GET /api/v1/admin/notifications
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<NotificationParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<AdminNotification>>, ApiError> {
    let Query(params) = params?;
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase().parse::<NotificationStatus>())
        .transpose()?;
    let notifications = state.notifications.list(status)?;
    Ok(ApiResponse::ok(notifications, "Notifications fetched successfully"))
}

/// PUT /api/v1/admin/notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<ApiResponse<AdminNotification>, ApiError> {
    let Path(id) = id?;
    let notification = state
        .notifications
        .set_status(id, NotificationStatus::Read)?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;
    Ok(ApiResponse::ok(notification, "Notification marked as read"))
}

/// GET /api/v1/admin/notifications/stream
///
/// Server-Sent Events, one `notification` event per new notification.
/// Subscribers that fall behind the broadcast buffer skip the missed events.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.event_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(value) => {
            let data = value.get("data").cloned().unwrap_or(value);
            let data = serde_json::to_string(&data).unwrap_or_default();
            Some(Ok(Event::default().event("notification").data(data)))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Notification subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
