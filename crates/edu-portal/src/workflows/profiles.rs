//! Profile rows keyed by the auth user id, plus admin role management.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::audit::{AuditEntry, AuditLogger};
use crate::auth::{Caller, Role};
use crate::backend::{find_by_id, from_row, from_rows, timestamp, Database, Filter};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::PortalState;

pub const PROFILES_TABLE: &str = "profiles";
pub const UPDATE_USER_ROLE_ACTION: &str = "UPDATE_USER_ROLE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "crate::auth::stored_role")]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Profile {
    /// Stand-in for a user who has never saved a profile.
    fn placeholder(caller: &Caller) -> Self {
        Self {
            id: caller.user_id.clone(),
            email: caller.email.clone(),
            full_name: None,
            phone: None,
            country: None,
            role: caller.role,
            created_at: None,
        }
    }
}

/// Self-service profile edit; the role is not editable here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl ProfileUpdate {
    fn into_patch(self) -> Map<String, Value> {
        let mut patch = Map::new();
        for (column, value) in [
            ("full_name", self.full_name),
            ("phone", self.phone),
            ("country", self.country),
        ] {
            if let Some(value) = value {
                let value = value.trim();
                let value = if value.is_empty() {
                    Value::Null
                } else {
                    Value::String(value.to_string())
                };
                patch.insert(column.to_string(), value);
            }
        }
        patch
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleChange {
    #[serde(default)]
    pub role: Option<String>,
}

pub struct ProfileService {
    database: Arc<dyn Database>,
    audit: AuditLogger,
}

impl ProfileService {
    pub fn new(database: Arc<dyn Database>, audit: AuditLogger) -> Self {
        Self { database, audit }
    }

    pub async fn current(&self, caller: &Caller) -> Result<Profile, ApiError> {
        match find_by_id(self.database.as_ref(), PROFILES_TABLE, &caller.user_id).await? {
            Some(row) => Ok(from_row(row)?),
            None => Ok(Profile::placeholder(caller)),
        }
    }

    /// Updates the caller's own row, creating it on first save.
    pub async fn update_current(
        &self,
        caller: &Caller,
        update: ProfileUpdate,
    ) -> Result<Profile, ApiError> {
        let mut patch = update.into_patch();
        if patch.is_empty() {
            return self.current(caller).await;
        }

        let existing = find_by_id(self.database.as_ref(), PROFILES_TABLE, &caller.user_id).await?;
        let row = if existing.is_some() {
            patch.insert("updated_at".to_string(), Value::String(timestamp()));
            self.database
                .update(PROFILES_TABLE, &caller.user_id, patch)
                .await?
                .ok_or_else(|| ApiError::not_found("profile not found"))?
        } else {
            patch.insert("id".to_string(), json!(caller.user_id));
            patch.insert("email".to_string(), json!(caller.email));
            patch.insert("role".to_string(), json!(caller.role));
            self.database.insert(PROFILES_TABLE, patch).await?
        };

        info!(user_id = %caller.user_id, "profile updated");
        Ok(from_row(row)?)
    }

    pub async fn list(&self, caller: &Caller) -> Result<Vec<Profile>, ApiError> {
        caller.require_admin()?;
        let filter = Filter::new().order_desc("created_at");
        Ok(from_rows(self.database.select(PROFILES_TABLE, &filter).await?)?)
    }

    pub async fn change_role(
        &self,
        caller: &Caller,
        user_id: &str,
        change: RoleChange,
    ) -> Result<Profile, ApiError> {
        caller.require_admin()?;
        let raw = change
            .role
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ApiError::validation("role is required"))?;
        let role = Role::parse(&raw)
            .ok_or_else(|| ApiError::validation(format!("unknown role '{raw}'")))?;

        let previous: Profile = from_row(
            find_by_id(self.database.as_ref(), PROFILES_TABLE, user_id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("profile {user_id} not found")))?,
        )?;

        let mut patch = Map::new();
        patch.insert("role".to_string(), json!(role));
        patch.insert("updated_at".to_string(), Value::String(timestamp()));
        let row = self
            .database
            .update(PROFILES_TABLE, user_id, patch)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("profile {user_id} not found")))?;
        let updated: Profile = from_row(row)?;

        self.audit
            .record(
                AuditEntry::new(&caller.user_id, UPDATE_USER_ROLE_ACTION, "profile")
                    .entity(user_id)
                    .before(json!({ "role": previous.role }))
                    .after(json!({ "role": updated.role })),
            )
            .await;
        info!(user_id, role = role.label(), "role changed");
        Ok(updated)
    }
}

pub fn profile_routes() -> Router<PortalState> {
    Router::new()
        .route("/api/profile", get(current_handler).patch(update_handler))
        .route("/api/admin/users", get(list_handler))
        .route("/api/admin/users/:user_id/role", patch(role_handler))
}

fn service(state: &PortalState, caller: &Caller) -> ProfileService {
    ProfileService::new(caller.database(state), state.audit.clone())
}

pub(crate) async fn current_handler(
    State(state): State<PortalState>,
    caller: Caller,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(service(&state, &caller).current(&caller).await?))
}

pub(crate) async fn update_handler(
    State(state): State<PortalState>,
    caller: Caller,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<Json<Value>, ApiError> {
    let profile = service(&state, &caller)
        .update_current(&caller, update)
        .await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub(crate) async fn list_handler(
    State(state): State<PortalState>,
    caller: Caller,
) -> Result<Json<Vec<Profile>>, ApiError> {
    Ok(Json(service(&state, &caller).list(&caller).await?))
}

pub(crate) async fn role_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(user_id): Path<String>,
    JsonBody(change): JsonBody<RoleChange>,
) -> Result<Json<Value>, ApiError> {
    let profile = service(&state, &caller)
        .change_role(&caller, &user_id, change)
        .await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}
