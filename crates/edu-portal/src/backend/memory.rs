use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{
    timestamp, AuthProvider, AuthUser, Backend, BackendError, Database, Filter, ObjectStorage,
    Row, StoredObject,
};

/// Process-local table store. Mirrors the managed backend's column defaults
/// (`id`, `created_at`) but enforces no row-level policies.
#[derive(Default, Clone)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<BTreeMap<String, Vec<Row>>>>,
}

impl MemoryDatabase {
    /// Snapshot of a table in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let guard = self.tables.lock().expect("database mutex poisoned");
        guard.get(table).cloned().unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        let guard = self.tables.lock().expect("database mutex poisoned");
        guard.get(table).map_or(0, Vec::len)
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> CmpOrdering {
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(CmpOrdering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, BackendError> {
        let guard = self.tables.lock().expect("database mutex poisoned");
        let mut rows: Vec<Row> = guard
            .get(table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default();
        drop(guard);

        if let Some(order) = &filter.order_by {
            // Stable sort keeps insertion order for ties.
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, BackendError> {
        if !matches!(row.get("id"), Some(Value::String(_))) {
            row.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if !matches!(row.get("created_at"), Some(Value::String(_))) {
            row.insert(
                "created_at".to_string(),
                Value::String(timestamp()),
            );
        }

        let mut guard = self.tables.lock().expect("database mutex poisoned");
        let rows = guard.entry(table.to_string()).or_default();
        if rows.iter().any(|existing| existing.get("id") == row.get("id")) {
            return Err(BackendError::Request(format!(
                "duplicate key value violates unique constraint \"{table}_pkey\""
            )));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Row,
    ) -> Result<Option<Row>, BackendError> {
        let mut guard = self.tables.lock().expect("database mutex poisoned");
        let Some(row) = guard.get_mut(table).and_then(|rows| {
            rows.iter_mut()
                .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
        }) else {
            return Ok(None);
        };

        for (column, value) in patch {
            if column != "id" {
                row.insert(column, value);
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        let mut guard = self.tables.lock().expect("database mutex poisoned");
        let Some(rows) = guard.get_mut(table) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| row.get("id").and_then(Value::as_str) != Some(id));
        Ok(rows.len() != before)
    }

    fn for_caller(&self, _access_token: &str) -> Arc<dyn Database> {
        Arc::new(self.clone())
    }
}

/// Token table standing in for the hosted auth service.
#[derive(Default, Clone)]
pub struct MemoryAuth {
    sessions: Arc<Mutex<HashMap<String, AuthUser>>>,
}

impl MemoryAuth {
    pub fn issue(&self, access_token: impl Into<String>, user: AuthUser) {
        let mut guard = self.sessions.lock().expect("auth mutex poisoned");
        guard.insert(access_token.into(), user);
    }

    pub fn revoke(&self, access_token: &str) {
        let mut guard = self.sessions.lock().expect("auth mutex poisoned");
        guard.remove(access_token);
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn user_for_token(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        let guard = self.sessions.lock().expect("auth mutex poisoned");
        Ok(guard.get(access_token).cloned())
    }
}

#[derive(Default, Clone)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<(String, String), StoredObject>>>,
}

impl MemoryStorage {
    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("storage mutex poisoned").len()
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        let guard = self.objects.lock().expect("storage mutex poisoned");
        guard.contains_key(&(bucket.to_string(), path.to_string()))
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError> {
        let mut guard = self.objects.lock().expect("storage mutex poisoned");
        let key = (bucket.to_string(), path.to_string());
        if guard.contains_key(&key) {
            return Err(BackendError::Request("The resource already exists".to_string()));
        }
        guard.insert(
            key,
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<StoredObject, BackendError> {
        let guard = self.objects.lock().expect("storage mutex poisoned");
        guard
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| BackendError::Request("Object not found".to_string()))
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), BackendError> {
        let mut guard = self.objects.lock().expect("storage mutex poisoned");
        guard.remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }
}

/// All three in-memory adapters, with typed access kept for seeding and
/// assertions.
#[derive(Default, Clone)]
pub struct MemoryBackend {
    pub database: MemoryDatabase,
    pub auth: MemoryAuth,
    pub storage: MemoryStorage,
}

impl MemoryBackend {
    pub fn backend(&self) -> Backend {
        Backend::new(
            Arc::new(self.database.clone()),
            Arc::new(self.auth.clone()),
            Arc::new(self.storage.clone()),
        )
    }
}
