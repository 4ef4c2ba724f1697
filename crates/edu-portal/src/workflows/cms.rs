//! Table-agnostic content management. Authorization is left to the
//! backend's row-level policies on the caller-scoped handle.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::info;

use crate::audit::{table_action, AuditEntry, AuditLogger};
use crate::auth::Caller;
use crate::backend::{find_by_id, Database, Filter, Row};
use crate::error::ApiError;
use crate::extract::{JsonBody, QueryParams};
use crate::state::PortalState;

pub struct ContentService {
    database: Arc<dyn Database>,
    audit: AuditLogger,
}

impl ContentService {
    pub fn new(database: Arc<dyn Database>, audit: AuditLogger) -> Self {
        Self { database, audit }
    }

    pub async fn list(
        &self,
        table: &str,
        filters: HashMap<String, String>,
    ) -> Result<Vec<Row>, ApiError> {
        let mut columns: Vec<_> = filters.into_iter().collect();
        columns.sort();
        let filter = columns
            .into_iter()
            .fold(Filter::new(), |filter, (column, value)| {
                filter.equals(column, value)
            });
        Ok(self.database.select(table, &filter).await?)
    }

    pub async fn create(&self, caller: &Caller, table: &str, body: Value) -> Result<Row, ApiError> {
        let row = object_body(body)?;
        let created = self.database.insert(table, row).await?;

        let mut entry = AuditEntry::new(&caller.user_id, table_action("CREATE", table), table)
            .after(Value::Object(created.clone()));
        if let Some(id) = row_id(&created) {
            entry = entry.entity(id);
        }
        self.audit.record(entry).await;

        info!(table, actor = %caller.user_id, "content created");
        Ok(created)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        table: &str,
        id: &str,
        body: Value,
    ) -> Result<Row, ApiError> {
        let patch = object_body(body)?;
        let before = self.snapshot(table, id).await;
        let updated = self
            .database
            .update(table, id, patch)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("{table} row {id} not found")))?;

        let mut entry = AuditEntry::new(&caller.user_id, table_action("UPDATE", table), table)
            .entity(id)
            .after(Value::Object(updated.clone()));
        if let Some(before) = before {
            entry = entry.before(before);
        }
        self.audit.record(entry).await;

        info!(table, id, actor = %caller.user_id, "content updated");
        Ok(updated)
    }

    pub async fn delete(&self, caller: &Caller, table: &str, id: &str) -> Result<(), ApiError> {
        let before = self.snapshot(table, id).await;
        if !self.database.delete(table, id).await? {
            return Err(ApiError::not_found(format!("{table} row {id} not found")));
        }

        let mut entry =
            AuditEntry::new(&caller.user_id, table_action("DELETE", table), table).entity(id);
        if let Some(before) = before {
            entry = entry.before(before);
        }
        self.audit.record(entry).await;

        info!(table, id, actor = %caller.user_id, "content deleted");
        Ok(())
    }

    /// Prior row for the audit trail; unreadable rows are simply not captured.
    async fn snapshot(&self, table: &str, id: &str) -> Option<Value> {
        find_by_id(self.database.as_ref(), table, id)
            .await
            .ok()
            .flatten()
            .map(Value::Object)
    }
}

fn object_body(body: Value) -> Result<Row, ApiError> {
    match body {
        Value::Object(row) => Ok(row),
        _ => Err(ApiError::validation("request body must be a JSON object")),
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

pub fn cms_routes() -> Router<PortalState> {
    Router::new()
        .route("/api/cms/:table", get(list_handler).post(create_handler))
        .route(
            "/api/cms/:table/:id",
            patch(update_handler).delete(delete_handler),
        )
}

fn service(state: &PortalState, caller: &Caller) -> ContentService {
    ContentService::new(caller.database(state), state.audit.clone())
}

pub(crate) async fn list_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(table): Path<String>,
    QueryParams(filters): QueryParams<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let rows = service(&state, &caller).list(&table, filters).await?;
    Ok(Json(json!({ "success": true, "data": rows })))
}

pub(crate) async fn create_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(table): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let row = service(&state, &caller)
        .create(&caller, &table, body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": row })),
    ))
}

pub(crate) async fn update_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path((table, id)): Path<(String, String)>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Value>, ApiError> {
    let row = service(&state, &caller)
        .update(&caller, &table, &id, body)
        .await?;
    Ok(Json(json!({ "success": true, "data": row })))
}

pub(crate) async fn delete_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path((table, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    service(&state, &caller)
        .delete(&caller, &table, &id)
        .await?;
    Ok(Json(json!({ "success": true })))
}
