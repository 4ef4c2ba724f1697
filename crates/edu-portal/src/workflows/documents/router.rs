use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::json;

use super::domain::{
    Document, DocumentType, RequiredDocument, RequirementRequest, ReviewRequest, UploadForm,
};
use super::service::DocumentService;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::PortalState;
use crate::workflows::applications::ApplicationId;

/// Room for multipart boundaries and the text fields next to the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn document_routes(max_upload_bytes: u64) -> Router<PortalState> {
    let body_limit = usize::try_from(max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(
            "/api/documents",
            post(upload_handler).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/documents/:document_id", delete(delete_handler))
        .route(
            "/api/documents/:document_id/download",
            get(download_handler),
        )
        .route("/api/document-types", get(document_types_handler))
        .route(
            "/api/applications/:application_id/documents",
            get(list_handler),
        )
        .route(
            "/api/applications/:application_id/required-documents",
            get(required_documents_handler),
        )
        .route(
            "/api/admin/applications/:application_id/required-documents",
            post(add_requirement_handler),
        )
        .route(
            "/api/admin/documents/:document_id/review",
            patch(review_handler),
        )
}

fn service(state: &PortalState, caller: &Caller) -> DocumentService {
    DocumentService::new(
        caller.database(state),
        state.backend.storage.clone(),
        state.audit.clone(),
        state.uploads.clone(),
        state.storage_bucket.clone(),
    )
}

fn malformed(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::validation(format!("invalid multipart body: {}", err.body_text()))
}

/// Collects the known form fields; unknown parts are skipped.
async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.declared_type = field.content_type().map(str::to_string);
                form.bytes = Some(field.bytes().await.map_err(malformed)?.to_vec());
            }
            "application_id" => form.application_id = Some(field.text().await.map_err(malformed)?),
            "document_type_id" => {
                form.document_type_id = Some(field.text().await.map_err(malformed)?)
            }
            "required_document_id" => {
                form.required_document_id = Some(field.text().await.map_err(malformed)?)
            }
            _ => {}
        }
    }

    Ok(form)
}

pub(crate) async fn upload_handler(
    State(state): State<PortalState>,
    caller: Caller,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_upload_form(&mut multipart).await?;
    let document = service(&state, &caller).upload(&caller, form).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "document": document })),
    ))
}

pub(crate) async fn list_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let id = ApplicationId(application_id);
    let documents = service(&state, &caller)
        .list_for_application(&caller, &id)
        .await?;
    Ok(Json(documents))
}

pub(crate) async fn required_documents_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
) -> Result<Json<Vec<RequiredDocument>>, ApiError> {
    let id = ApplicationId(application_id);
    let required = service(&state, &caller)
        .required_documents(&caller, &id)
        .await?;
    Ok(Json(required))
}

pub(crate) async fn add_requirement_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
    JsonBody(request): JsonBody<RequirementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = ApplicationId(application_id);
    let requirement = service(&state, &caller)
        .add_requirement(&caller, &id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(requirement)))
}

pub(crate) async fn document_types_handler(
    State(state): State<PortalState>,
    caller: Caller,
) -> Result<Json<Vec<DocumentType>>, ApiError> {
    Ok(Json(service(&state, &caller).document_types().await?))
}

pub(crate) async fn download_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(document_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (document, object) = service(&state, &caller)
        .download(&caller, &document_id)
        .await?;
    let disposition = format!("attachment; filename=\"{}\"", document.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, object.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        object.bytes,
    ))
}

pub(crate) async fn delete_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(document_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    service(&state, &caller)
        .delete(&caller, &document_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub(crate) async fn review_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(document_id): Path<String>,
    JsonBody(request): JsonBody<ReviewRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let document = service(&state, &caller)
        .review(&caller, &document_id, request)
        .await?;
    Ok(Json(json!({ "success": true, "document": document })))
}
