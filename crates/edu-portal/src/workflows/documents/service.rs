use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;

use super::domain::{
    Document, DocumentType, NewDocumentRow, RequiredDocument, RequirementRequest, ReviewRequest,
    ReviewStatus, UploadForm, DOCUMENTS_TABLE, DOCUMENT_TYPES_TABLE, REQUIRED_DOCUMENTS_TABLE,
};
use super::policy::{sanitize_file_name, UploadPolicy, UploadRejection};
use crate::audit::{AuditEntry, AuditLogger};
use crate::auth::Caller;
use crate::backend::{
    find_by_id, from_row, from_rows, timestamp, to_row, BackendError, Database, Filter,
    ObjectStorage, StoredObject,
};
use crate::error::ApiError;
use crate::workflows::applications::{ApplicationError, ApplicationId, ApplicationService};

pub const REVIEW_DOCUMENT_ACTION: &str = "REVIEW_DOCUMENT";
pub const DELETE_DOCUMENT_ACTION: &str = "DELETE_DOCUMENT";
pub const CREATE_REQUIREMENT_ACTION: &str = "CREATE_REQUIRED_DOCUMENT";

/// Upload, review and retrieval of application documents.
pub struct DocumentService {
    database: Arc<dyn Database>,
    storage: Arc<dyn ObjectStorage>,
    audit: AuditLogger,
    policy: Arc<UploadPolicy>,
    bucket: Arc<str>,
}

impl DocumentService {
    pub fn new(
        database: Arc<dyn Database>,
        storage: Arc<dyn ObjectStorage>,
        audit: AuditLogger,
        policy: Arc<UploadPolicy>,
        bucket: Arc<str>,
    ) -> Self {
        Self {
            database,
            storage,
            audit,
            policy,
            bucket,
        }
    }

    fn applications(&self) -> ApplicationService {
        ApplicationService::new(self.database.clone(), self.audit.clone())
    }

    /// Stores the file and records a pending document row. Every rejection
    /// happens before the storage write.
    pub async fn upload(
        &self,
        caller: &Caller,
        form: UploadForm,
    ) -> Result<Document, DocumentError> {
        let application_id = required(form.application_id, "application_id")?;
        let document_type_id = required(form.document_type_id, "document_type_id")?;
        let bytes = form.bytes.ok_or(DocumentError::MissingField("file"))?;
        let file_name = sanitize_file_name(form.file_name.as_deref().unwrap_or_default());
        let required_document_id = form
            .required_document_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let content_type =
            self.policy
                .check(&file_name, form.declared_type.as_deref(), bytes.len() as u64)?;

        let application_id = ApplicationId(application_id);
        let application = self
            .applications()
            .fetch_visible(caller, &application_id)
            .await?;

        let storage_path = format!(
            "{}/{}/{}-{}",
            application.user_id,
            application.id,
            uuid::Uuid::new_v4(),
            file_name
        );
        let size_bytes = bytes.len() as u64;
        self.storage
            .upload(&self.bucket, &storage_path, &content_type, bytes)
            .await?;

        let row = to_row(&NewDocumentRow {
            application_id: &application.id,
            required_document_id: required_document_id.as_deref(),
            document_type_id: &document_type_id,
            user_id: &application.user_id,
            file_name: &file_name,
            storage_path: &storage_path,
            mime_type: &content_type,
            size_bytes,
            status: ReviewStatus::Pending,
        })?;
        let document: Document = from_row(self.database.insert(DOCUMENTS_TABLE, row).await?)?;

        info!(
            document_id = %document.id,
            application_id = %application.id,
            size_bytes,
            mime_type = %content_type,
            "document uploaded"
        );
        Ok(document)
    }

    pub async fn list_for_application(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<Vec<Document>, DocumentError> {
        self.applications()
            .fetch_visible(caller, application_id)
            .await?;
        let filter = Filter::new()
            .equals("application_id", application_id.as_str())
            .order_desc("created_at");
        Ok(from_rows(self.database.select(DOCUMENTS_TABLE, &filter).await?)?)
    }

    pub async fn required_documents(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<Vec<RequiredDocument>, DocumentError> {
        self.applications()
            .fetch_visible(caller, application_id)
            .await?;
        let filter = Filter::new()
            .equals("application_id", application_id.as_str())
            .order_asc("created_at");
        Ok(from_rows(
            self.database
                .select(REQUIRED_DOCUMENTS_TABLE, &filter)
                .await?,
        )?)
    }

    pub async fn add_requirement(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
        request: RequirementRequest,
    ) -> Result<RequiredDocument, DocumentError> {
        if !caller.is_admin() {
            return Err(DocumentError::Forbidden("admin access required"));
        }
        let document_type_id = required(request.document_type_id, "document_type_id")?;
        self.applications().fetch(application_id).await?;

        let row = to_row(&json!({
            "application_id": application_id,
            "document_type_id": document_type_id,
        }))?;
        let requirement: RequiredDocument =
            from_row(self.database.insert(REQUIRED_DOCUMENTS_TABLE, row).await?)?;

        self.audit
            .record(
                AuditEntry::new(&caller.user_id, CREATE_REQUIREMENT_ACTION, "required_document")
                    .entity(requirement.id.as_str())
                    .after(json!(requirement)),
            )
            .await;
        Ok(requirement)
    }

    pub async fn document_types(&self) -> Result<Vec<DocumentType>, DocumentError> {
        let filter = Filter::new().order_asc("name");
        Ok(from_rows(
            self.database.select(DOCUMENT_TYPES_TABLE, &filter).await?,
        )?)
    }

    pub async fn download(
        &self,
        caller: &Caller,
        document_id: &str,
    ) -> Result<(Document, StoredObject), DocumentError> {
        let document = self.fetch_visible(caller, document_id).await?;
        let object = self
            .storage
            .download(&self.bucket, &document.storage_path)
            .await?;
        Ok((document, object))
    }

    /// Owners may delete while the document is still pending; admins always.
    pub async fn delete(&self, caller: &Caller, document_id: &str) -> Result<(), DocumentError> {
        let document = self.fetch_visible(caller, document_id).await?;
        if !caller.is_admin() && document.status != ReviewStatus::Pending {
            return Err(DocumentError::NotPending(document.status));
        }

        self.storage
            .remove(&self.bucket, &document.storage_path)
            .await?;
        self.database.delete(DOCUMENTS_TABLE, &document.id).await?;

        if caller.is_admin() {
            self.audit
                .record(
                    AuditEntry::new(&caller.user_id, DELETE_DOCUMENT_ACTION, "document")
                        .entity(document.id.as_str())
                        .before(json!(document)),
                )
                .await;
        }
        info!(document_id = %document.id, "document deleted");
        Ok(())
    }

    /// Admin approval, or rejection with a mandatory reason.
    pub async fn review(
        &self,
        caller: &Caller,
        document_id: &str,
        request: ReviewRequest,
    ) -> Result<Document, DocumentError> {
        if !caller.is_admin() {
            return Err(DocumentError::Forbidden("admin access required"));
        }
        let raw_status = required(request.status, "status")?;
        let reason = request
            .reason
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let (status, reason) = match raw_status.to_ascii_lowercase().as_str() {
            "approved" => (ReviewStatus::Approved, None),
            "rejected" => (
                ReviewStatus::Rejected,
                Some(reason.ok_or(DocumentError::MissingReason)?),
            ),
            _ => return Err(DocumentError::InvalidReviewStatus(raw_status)),
        };

        let previous = self.fetch(document_id).await?;

        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(status));
        patch.insert("rejection_reason".to_string(), json!(reason));
        patch.insert("reviewed_by".to_string(), json!(caller.user_id));
        patch.insert("reviewed_at".to_string(), Value::String(timestamp()));
        let row = self
            .database
            .update(DOCUMENTS_TABLE, document_id, patch)
            .await?
            .ok_or_else(|| DocumentError::NotFound(document_id.to_string()))?;
        let updated: Document = from_row(row)?;

        self.audit
            .record(
                AuditEntry::new(&caller.user_id, REVIEW_DOCUMENT_ACTION, "document")
                    .entity(document_id)
                    .before(json!({
                        "status": previous.status,
                        "rejection_reason": previous.rejection_reason,
                    }))
                    .after(json!({
                        "status": updated.status,
                        "rejection_reason": updated.rejection_reason,
                    })),
            )
            .await;

        info!(document_id, status = status.label(), "document reviewed");
        Ok(updated)
    }

    async fn fetch(&self, document_id: &str) -> Result<Document, DocumentError> {
        let row = find_by_id(self.database.as_ref(), DOCUMENTS_TABLE, document_id)
            .await?
            .ok_or_else(|| DocumentError::NotFound(document_id.to_string()))?;
        Ok(from_row(row)?)
    }

    async fn fetch_visible(
        &self,
        caller: &Caller,
        document_id: &str,
    ) -> Result<Document, DocumentError> {
        let document = self.fetch(document_id).await?;
        if caller.is_admin() || document.user_id == caller.user_id {
            Ok(document)
        } else {
            Err(DocumentError::Forbidden(
                "you do not have access to this document",
            ))
        }
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DocumentError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(DocumentError::MissingField(field))
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Rejected(#[from] UploadRejection),
    #[error("review status must be 'approved' or 'rejected', got '{0}'")]
    InvalidReviewStatus(String),
    #[error("a reason is required when rejecting a document")]
    MissingReason,
    #[error("document {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("only pending documents can be deleted (current status: {0})")]
    NotPending(ReviewStatus),
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<DocumentError> for ApiError {
    fn from(value: DocumentError) -> Self {
        match value {
            DocumentError::Application(err) => err.into(),
            DocumentError::Backend(err) => ApiError::Backend(err),
            DocumentError::NotFound(_) => ApiError::not_found(value.to_string()),
            DocumentError::Forbidden(message) => ApiError::forbidden(message),
            DocumentError::MissingField(_)
            | DocumentError::Rejected(_)
            | DocumentError::InvalidReviewStatus(_)
            | DocumentError::MissingReason
            | DocumentError::NotPending(_) => ApiError::validation(value.to_string()),
        }
    }
}
