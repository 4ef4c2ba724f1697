use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};

use crate::audit::AuditLogger;
use crate::auth::{resolve_caller, Caller};
use crate::backend::{
    to_row, AuthUser, BackendError, Database, Filter, MemoryBackend, Row,
};
use crate::config::{PortalConfig, UploadConfig};
use crate::router::portal_router;
use crate::state::PortalState;
use crate::workflows::applications::{Application, ApplicationDraft, ApplicationService};
use crate::workflows::profiles::PROFILES_TABLE;

pub(super) const ADMIN_ID: &str = "admin-1";
pub(super) const STUDENT_ID: &str = "student-1";
pub(super) const OTHER_STUDENT_ID: &str = "student-2";

pub(super) const ADMIN_TOKEN: &str = "admin-token";
pub(super) const STUDENT_TOKEN: &str = "student-token";
pub(super) const OTHER_STUDENT_TOKEN: &str = "other-student-token";

pub(super) const BUCKET: &str = "documents";

pub(super) struct Fixture {
    pub(super) memory: MemoryBackend,
    pub(super) state: PortalState,
}

impl Fixture {
    pub(super) fn router(&self) -> Router {
        portal_router(self.state.clone())
    }

    pub(super) async fn caller(&self, token: &str) -> Caller {
        resolve_caller(&self.state, token)
            .await
            .expect("caller resolves")
            .expect("session is live")
    }

    pub(super) fn applications(&self) -> ApplicationService {
        ApplicationService::new(
            self.state.backend.database.clone(),
            self.state.audit.clone(),
        )
    }

    pub(super) async fn draft_for(&self, token: &str) -> Application {
        let caller = self.caller(token).await;
        self.applications()
            .create(
                &caller,
                ApplicationDraft {
                    program: Some("MSc Data Science".to_string()),
                    institution: Some("University of Toronto".to_string()),
                    intake: Some("Fall 2026".to_string()),
                    notes: None,
                },
            )
            .await
            .expect("draft created")
    }

    pub(super) fn rows(&self, table: &str) -> Vec<Row> {
        self.memory.database.rows(table)
    }

    /// Points audit writes at a database whose `audit_logs` inserts fail.
    pub(super) fn with_failing_audit(mut self) -> Self {
        let failing = FailingTables::new(
            Arc::new(self.memory.database.clone()),
            &[crate::audit::AUDIT_LOGS_TABLE],
        );
        self.state = self.state.with_audit(AuditLogger::new(Arc::new(failing)));
        self
    }
}

pub(super) async fn fixture() -> Fixture {
    fixture_with_uploads(UploadConfig::default()).await
}

pub(super) async fn fixture_with_uploads(uploads: UploadConfig) -> Fixture {
    let memory = MemoryBackend::default();
    for (id, token, email, role) in [
        (ADMIN_ID, ADMIN_TOKEN, "admin@example.com", "admin"),
        (STUDENT_ID, STUDENT_TOKEN, "ada@example.com", "student"),
        (OTHER_STUDENT_ID, OTHER_STUDENT_TOKEN, "grace@example.com", "student"),
    ] {
        memory.auth.issue(
            token,
            AuthUser {
                id: id.to_string(),
                email: Some(email.to_string()),
            },
        );
        memory
            .database
            .insert(
                PROFILES_TABLE,
                to_row(&json!({ "id": id, "email": email, "role": role })).expect("row"),
            )
            .await
            .expect("profile seeded");
    }

    let state = PortalState::new(
        memory.backend(),
        &uploads,
        BUCKET,
        &PortalConfig::default(),
    );
    Fixture { memory, state }
}

/// Delegates to `inner` except for writes to the listed tables.
pub(super) struct FailingTables {
    inner: Arc<dyn Database>,
    tables: Vec<String>,
}

impl FailingTables {
    pub(super) fn new(inner: Arc<dyn Database>, tables: &[&str]) -> Self {
        Self {
            inner,
            tables: tables.iter().map(|table| table.to_string()).collect(),
        }
    }

    fn check(&self, table: &str) -> Result<(), BackendError> {
        if self.tables.iter().any(|blocked| blocked == table) {
            Err(BackendError::Request(format!(
                "permission denied for table {table}"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Database for FailingTables {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, BackendError> {
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        self.check(table)?;
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Option<Row>, BackendError> {
        self.check(table)?;
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<bool, BackendError> {
        self.check(table)?;
        self.inner.delete(table, id).await
    }

    fn for_caller(&self, access_token: &str) -> Arc<dyn Database> {
        Arc::new(FailingTables {
            inner: self.inner.for_caller(access_token),
            tables: self.tables.clone(),
        })
    }
}

pub(super) fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("json body")))
        .expect("request builds")
}

pub(super) fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request builds")
}

pub(super) const BOUNDARY: &str = "portal-test-boundary";

pub(super) struct FilePart<'a> {
    pub(super) file_name: &'a str,
    pub(super) content_type: Option<&'a str>,
    pub(super) bytes: &'a [u8],
}

/// Hand-built `multipart/form-data` body with text fields and one file part.
pub(super) fn multipart_request(
    token: &str,
    fields: &[(&str, &str)],
    file: Option<FilePart<'_>>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file.file_name
            )
            .as_bytes(),
        );
        if let Some(content_type) = file.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/documents")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn actions(rows: &[Row]) -> Vec<&str> {
    rows.iter()
        .filter_map(|row| row.get("action").and_then(Value::as_str))
        .collect()
}
