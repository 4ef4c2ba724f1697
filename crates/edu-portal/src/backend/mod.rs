//! Ports onto the managed database, auth and object-storage service.
//!
//! Everything the portal persists lives behind these traits. The in-memory
//! adapters back development, the CLI demo and the test suite; the REST
//! adapters speak the hosted backend's HTTP API.

pub mod memory;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use memory::{MemoryAuth, MemoryBackend, MemoryDatabase, MemoryStorage};
pub use rest::RestBackend;

/// A table row as exchanged with the backend.
pub type Row = Map<String, Value>;

/// Equality filters and ordering for a `select`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub eq: Vec<(String, Value)>,
    pub order_by: Option<Ordering>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub column: String,
    pub descending: bool,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(Ordering {
            column: column.into(),
            descending: false,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(Ordering {
            column: column.into(),
            descending: true,
        });
        self
    }

    /// In-memory evaluation. A text filter value is compared against the
    /// text form of boolean and numeric columns, as the REST adapter's
    /// `eq.<value>` does.
    pub fn matches(&self, row: &Row) -> bool {
        self.eq
            .iter()
            .all(|(column, wanted)| column_equals(row.get(column), wanted))
    }
}

fn column_equals(stored: Option<&Value>, wanted: &Value) -> bool {
    match (stored, wanted) {
        (None, wanted) => wanted.is_null(),
        (Some(stored @ (Value::Bool(_) | Value::Number(_))), Value::String(text)) => {
            stored.to_string() == *text
        }
        (Some(stored), wanted) => stored == wanted,
    }
}

/// Failure reported by, or while talking to, the managed backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend rejected the request; the message is passed through verbatim.
    #[error("{0}")]
    Request(String),
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid table name '{0}'")]
    InvalidTable(String),
    #[error("unexpected backend payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, BackendError>;

    /// Inserts a row and returns it as stored, with backend defaults filled in.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError>;

    /// Applies `patch` to the row with the given id. `Ok(None)` when no row
    /// matched (or row-level policies hid it).
    async fn update(&self, table: &str, id: &str, patch: Row)
        -> Result<Option<Row>, BackendError>;

    /// Returns whether a row was removed.
    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError>;

    /// A handle that runs requests with the caller's credentials so the
    /// backend's row-level access policies apply.
    fn for_caller(&self, access_token: &str) -> Arc<dyn Database>;
}

/// Identity returned by the auth service for a valid access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` for unknown, expired or revoked tokens.
    async fn user_for_token(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError>;

    async fn download(&self, bucket: &str, path: &str) -> Result<StoredObject, BackendError>;

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), BackendError>;
}

/// Bundle of backend handles shared by every request.
#[derive(Clone)]
pub struct Backend {
    pub database: Arc<dyn Database>,
    pub auth: Arc<dyn AuthProvider>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backend {
    pub fn new(
        database: Arc<dyn Database>,
        auth: Arc<dyn AuthProvider>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            database,
            auth,
            storage,
        }
    }
}

/// Serializes a record into a row. Records in this crate are plain structs,
/// so anything other than a JSON object is a programming error surfaced as
/// a decode failure.
pub fn to_row<T: Serialize>(value: &T) -> Result<Row, BackendError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::Decode(serde::de::Error::custom(format!(
            "expected object, got {other}"
        )))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, BackendError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, BackendError> {
    rows.into_iter().map(from_row::<T>).collect()
}

/// Current time in the fixed-width form used for `created_at`/`updated_at`
/// columns, so string order matches time order.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Fetches the single row whose `id` matches.
pub async fn find_by_id(
    database: &dyn Database,
    table: &str,
    id: &str,
) -> Result<Option<Row>, BackendError> {
    let rows = database
        .select(table, &Filter::new().equals("id", id))
        .await?;
    Ok(rows.into_iter().next())
}
