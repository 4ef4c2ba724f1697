//! HTTP adapters for the hosted backend (PostgREST tables, GoTrue auth,
//! Storage objects), all served from one base URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    AuthProvider, AuthUser, Backend, BackendError, Database, Filter, ObjectStorage, Row,
    StoredObject,
};
use crate::config::RemoteBackendConfig;

#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestBackend {
    pub fn new(config: &RemoteBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: None,
        })
    }

    /// One client shared by the database, auth and storage ports.
    pub fn backend(&self) -> Backend {
        let shared = Arc::new(self.clone());
        Backend::new(shared.clone(), shared.clone(), shared)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    fn table_url(&self, table: &str) -> Result<String, BackendError> {
        validate_table(table)?;
        Ok(format!("{}/rest/v1/{}", self.base_url, table))
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket,
            path.trim_start_matches('/')
        )
    }
}

/// Table names end up in the request path, so only plain identifiers pass.
pub(crate) fn validate_table(table: &str) -> Result<(), BackendError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidTable(table.to_string()))
    }
}

/// Translates a filter into PostgREST query parameters.
pub(crate) fn query_pairs(filter: &Filter) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    for (column, value) in &filter.eq {
        let condition = match value {
            Value::Null => "is.null".to_string(),
            Value::String(text) => format!("eq.{text}"),
            other => format!("eq.{other}"),
        };
        pairs.push((column.clone(), condition));
    }
    if let Some(order) = &filter.order_by {
        let direction = if order.descending { "desc" } else { "asc" };
        pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    pairs
}

/// Pulls the human-readable message out of a backend error body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.to_string()
    }
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Request(error_message(status, &body)))
}

#[async_trait]
impl Database for RestBackend {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, BackendError> {
        let url = self.table_url(table)?;
        debug!(table, "select");
        let response = self
            .authorize(self.client.get(url))
            .query(&query_pairs(filter))
            .send()
            .await?;
        Ok(check(response).await?.json::<Vec<Row>>().await?)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        let url = self.table_url(table)?;
        debug!(table, "insert");
        let response = self
            .authorize(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::Request(format!("insert into {table} returned no row")))
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: Row,
    ) -> Result<Option<Row>, BackendError> {
        let url = self.table_url(table)?;
        debug!(table, id, "update");
        let response = self
            .authorize(self.client.patch(url))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        Ok(rows.into_iter().next())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        let url = self.table_url(table)?;
        debug!(table, id, "delete");
        let response = self
            .authorize(self.client.delete(url))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows = check(response).await?.json::<Vec<Row>>().await?;
        Ok(!rows.is_empty())
    }

    fn for_caller(&self, access_token: &str) -> Arc<dyn Database> {
        Arc::new(Self {
            access_token: Some(access_token.to_string()),
            ..self.clone()
        })
    }
}

#[async_trait]
impl AuthProvider for RestBackend {
    async fn user_for_token(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json::<AuthUser>().await?))
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError> {
        debug!(bucket, path, size = bytes.len(), "storage upload");
        let response = self
            .authorize(self.client.post(self.object_url(bucket, path)))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<StoredObject, BackendError> {
        let response = self
            .authorize(self.client.get(self.object_url(bucket, path)))
            .send()
            .await?;
        let response = check(response).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(StoredObject {
            content_type,
            bytes,
        })
    }

    async fn remove(&self, bucket: &str, path: &str) -> Result<(), BackendError> {
        let response = self
            .authorize(
                self.client
                    .delete(format!("{}/storage/v1/object/{}", self.base_url, bucket)),
            )
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(validate_table("blog_posts").is_ok());
        assert!(validate_table("Pages2").is_ok());
        for bad in ["", "pages?select=*", "../auth", "pages;drop", "a b"] {
            assert!(
                matches!(validate_table(bad), Err(BackendError::InvalidTable(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn filters_become_postgrest_conditions() {
        let filter = Filter::new()
            .equals("user_id", "u1")
            .equals("read", false)
            .equals("reviewed_at", Value::Null)
            .order_desc("created_at");

        assert_eq!(
            query_pairs(&filter),
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("read".to_string(), "eq.false".to_string()),
                ("reviewed_at".to_string(), "is.null".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
            ]
        );
    }

    #[test]
    fn error_messages_pass_through_verbatim() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert_eq!(
            error_message(StatusCode::CONFLICT, body),
            "duplicate key value violates unique constraint"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"Invalid mime type"}"#),
            "Invalid mime type"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "500 Internal Server Error"
        );
    }
}
