//! Document upload, review and download for applications.

pub mod domain;
pub mod policy;
pub mod router;
pub mod service;

pub use domain::{
    Document, DocumentType, RequiredDocument, RequirementRequest, ReviewRequest, ReviewStatus,
    UploadForm, DOCUMENTS_TABLE, DOCUMENT_TYPES_TABLE, REQUIRED_DOCUMENTS_TABLE,
};
pub use policy::{sanitize_file_name, UploadPolicy, UploadRejection};
pub use router::document_routes;
pub use service::{
    DocumentError, DocumentService, CREATE_REQUIREMENT_ACTION, DELETE_DOCUMENT_ACTION,
    REVIEW_DOCUMENT_ACTION,
};
