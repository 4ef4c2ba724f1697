use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use tracing::info;

use crate::audit::{AuditEntry, AuditLogger};
use crate::auth::Caller;
use crate::backend::{find_by_id, from_row, from_rows, to_row, Database, Filter};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::PortalState;

pub const NOTIFICATIONS_TABLE: &str = "notifications";
pub const SEND_NOTIFICATION_ACTION: &str = "SEND_NOTIFICATION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationFeed {
    pub unread: usize,
    pub notifications: Vec<Notification>,
}

pub struct NotificationService {
    database: Arc<dyn Database>,
    audit: AuditLogger,
}

impl NotificationService {
    pub fn new(database: Arc<dyn Database>, audit: AuditLogger) -> Self {
        Self { database, audit }
    }

    /// Newest first.
    pub async fn feed(&self, caller: &Caller) -> Result<NotificationFeed, ApiError> {
        let filter = Filter::new()
            .equals("user_id", caller.user_id.as_str())
            .order_desc("created_at");
        let notifications: Vec<Notification> =
            from_rows(self.database.select(NOTIFICATIONS_TABLE, &filter).await?)?;
        let unread = notifications.iter().filter(|n| !n.read).count();
        Ok(NotificationFeed {
            unread,
            notifications,
        })
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<usize, ApiError> {
        let filter = Filter::new()
            .equals("user_id", user_id)
            .equals("read", false);
        Ok(self.database.select(NOTIFICATIONS_TABLE, &filter).await?.len())
    }

    pub async fn mark_read(&self, caller: &Caller, id: &str) -> Result<Notification, ApiError> {
        let row = find_by_id(self.database.as_ref(), NOTIFICATIONS_TABLE, id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("notification {id} not found")))?;
        let notification: Notification = from_row(row)?;
        if notification.user_id != caller.user_id {
            return Err(ApiError::forbidden("notification belongs to another user"));
        }

        let mut patch = Map::new();
        patch.insert("read".to_string(), json!(true));
        let row = self
            .database
            .update(NOTIFICATIONS_TABLE, id, patch)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("notification {id} not found")))?;
        Ok(from_row(row)?)
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, caller: &Caller) -> Result<usize, ApiError> {
        let filter = Filter::new()
            .equals("user_id", caller.user_id.as_str())
            .equals("read", false);
        let unread: Vec<Notification> =
            from_rows(self.database.select(NOTIFICATIONS_TABLE, &filter).await?)?;

        let mut updated = 0;
        for notification in unread {
            let mut patch = Map::new();
            patch.insert("read".to_string(), json!(true));
            if self
                .database
                .update(NOTIFICATIONS_TABLE, &notification.id, patch)
                .await?
                .is_some()
            {
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub async fn send(
        &self,
        caller: &Caller,
        user_id: &str,
        draft: NotificationDraft,
    ) -> Result<Notification, ApiError> {
        caller.require_admin()?;
        let title = required(draft.title, "title")?;
        let message = required(draft.message, "message")?;

        let row = to_row(&json!({
            "user_id": user_id,
            "title": title,
            "message": message,
            "read": false,
        }))?;
        let notification: Notification =
            from_row(self.database.insert(NOTIFICATIONS_TABLE, row).await?)?;

        self.audit
            .record(
                AuditEntry::new(&caller.user_id, SEND_NOTIFICATION_ACTION, "notification")
                    .entity(notification.id.as_str())
                    .after(json!({ "user_id": user_id, "title": notification.title })),
            )
            .await;
        info!(notification_id = %notification.id, user_id, "notification sent");
        Ok(notification)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{field} is required")))
}

pub fn notification_routes() -> Router<PortalState> {
    Router::new()
        .route("/api/notifications", get(feed_handler))
        .route("/api/notifications/read-all", post(read_all_handler))
        .route("/api/notifications/:notification_id/read", post(read_handler))
        .route(
            "/api/admin/users/:user_id/notifications",
            post(send_handler),
        )
}

fn service(state: &PortalState, caller: &Caller) -> NotificationService {
    NotificationService::new(caller.database(state), state.audit.clone())
}

pub(crate) async fn feed_handler(
    State(state): State<PortalState>,
    caller: Caller,
) -> Result<Json<NotificationFeed>, ApiError> {
    Ok(Json(service(&state, &caller).feed(&caller).await?))
}

pub(crate) async fn read_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>, ApiError> {
    Ok(Json(
        service(&state, &caller)
            .mark_read(&caller, &notification_id)
            .await?,
    ))
}

pub(crate) async fn read_all_handler(
    State(state): State<PortalState>,
    caller: Caller,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = service(&state, &caller).mark_all_read(&caller).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

pub(crate) async fn send_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(user_id): Path<String>,
    JsonBody(draft): JsonBody<NotificationDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = service(&state, &caller)
        .send(&caller, &user_id, draft)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "notification": notification })),
    ))
}
