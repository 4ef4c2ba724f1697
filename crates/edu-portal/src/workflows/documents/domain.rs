use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workflows::applications::ApplicationId;

pub const DOCUMENTS_TABLE: &str = "documents";
pub const REQUIRED_DOCUMENTS_TABLE: &str = "required_documents";
pub const DOCUMENT_TYPES_TABLE: &str = "document_types";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata row for an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub application_id: ApplicationId,
    #[serde(default)]
    pub required_document_id: Option<String>,
    pub document_type_id: String,
    /// Owner of the application the file belongs to.
    pub user_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub status: ReviewStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewDocumentRow<'a> {
    pub application_id: &'a ApplicationId,
    pub required_document_id: Option<&'a str>,
    pub document_type_id: &'a str,
    pub user_id: &'a str,
    pub file_name: &'a str,
    pub storage_path: &'a str,
    pub mime_type: &'a str,
    pub size_bytes: u64,
    pub status: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A document type an application must supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredDocument {
    pub id: String,
    pub application_id: ApplicationId,
    pub document_type_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Parsed multipart upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadForm {
    pub file_name: Option<String>,
    pub declared_type: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub application_id: Option<String>,
    pub document_type_id: Option<String>,
    pub required_document_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementRequest {
    #[serde(default)]
    pub document_type_id: Option<String>,
}
