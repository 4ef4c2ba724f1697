//! Best-effort audit trail for administrative mutations.
//!
//! Writes never fail the calling operation: errors are logged and dropped.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Caller;
use crate::backend::{from_rows, to_row, BackendError, Database, Filter};
use crate::error::ApiError;
use crate::extract::QueryParams;
use crate::state::PortalState;

pub const AUDIT_LOGS_TABLE: &str = "audit_logs";

/// `CREATE_PAGES`, `DELETE_BLOG_POSTS`, ...
pub fn table_action(verb: &str, table: &str) -> String {
    format!("{}_{}", verb, table.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl AuditEntry {
    pub fn new(
        actor_id: impl Into<String>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            before: None,
            after: None,
        }
    }

    pub fn entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }
}

/// Stored audit row as returned to admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub created_at: Option<String>,
}

#[derive(Clone)]
pub struct AuditLogger {
    database: Arc<dyn Database>,
}

impl AuditLogger {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database }
    }

    /// Appends an audit row. Never returns an error.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        let entity_type = entry.entity_type.clone();
        let actor_id = entry.actor_id.clone();

        let result = match to_row(&entry) {
            Ok(row) => self.database.insert(AUDIT_LOGS_TABLE, row).await.map(|_| ()),
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => debug!(%action, %entity_type, %actor_id, "audit entry recorded"),
            Err(err) => warn!(
                %action,
                %entity_type,
                %actor_id,
                error = %err,
                "failed to record audit entry"
            ),
        }
    }

    /// Newest first.
    pub async fn list(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, BackendError> {
        let mut filter = Filter::new().order_desc("created_at");
        if let Some(entity_type) = &query.entity_type {
            filter = filter.equals("entity_type", entity_type.as_str());
        }
        if let Some(entity_id) = &query.entity_id {
            filter = filter.equals("entity_id", entity_id.as_str());
        }
        if let Some(actor_id) = &query.actor_id {
            filter = filter.equals("actor_id", actor_id.as_str());
        }
        let rows = self.database.select(AUDIT_LOGS_TABLE, &filter).await?;
        from_rows(rows)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<String>,
}

pub(crate) async fn list_audit_logs(
    State(state): State<PortalState>,
    caller: Caller,
    QueryParams(query): QueryParams<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    caller.require_admin()?;
    Ok(Json(state.audit.list(&query).await?))
}
