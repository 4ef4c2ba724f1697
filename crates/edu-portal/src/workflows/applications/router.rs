use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;

use super::domain::{
    Application, ApplicationDetail, ApplicationDraft, ApplicationId, StatusUpdate,
    WithdrawalRequest,
};
use super::service::ApplicationService;
use crate::auth::Caller;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::PortalState;

/// Student and admin routes for the application lifecycle.
pub fn application_routes() -> Router<PortalState> {
    Router::new()
        .route(
            "/api/applications",
            get(list_handler).post(create_handler),
        )
        .route("/api/applications/:application_id", get(detail_handler))
        .route(
            "/api/applications/:application_id/submit",
            post(submit_handler),
        )
        .route(
            "/api/applications/:application_id/withdraw",
            post(withdraw_handler),
        )
        .route(
            "/api/admin/applications/:application_id/status",
            patch(status_handler),
        )
}

fn service(state: &PortalState, caller: &Caller) -> ApplicationService {
    ApplicationService::new(caller.database(state), state.audit.clone())
}

pub(crate) async fn list_handler(
    State(state): State<PortalState>,
    caller: Caller,
) -> Result<Json<Vec<Application>>, ApiError> {
    let applications = service(&state, &caller).list(&caller).await?;
    Ok(Json(applications))
}

pub(crate) async fn create_handler(
    State(state): State<PortalState>,
    caller: Caller,
    JsonBody(draft): JsonBody<ApplicationDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let application = service(&state, &caller).create(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub(crate) async fn detail_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
) -> Result<Json<ApplicationDetail>, ApiError> {
    let id = ApplicationId(application_id);
    let detail = service(&state, &caller).detail(&caller, &id).await?;
    Ok(Json(detail))
}

pub(crate) async fn submit_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ApplicationId(application_id);
    let application = service(&state, &caller).submit(&caller, &id).await?;
    Ok(Json(json!({ "success": true, "application": application })))
}

pub(crate) async fn withdraw_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
    request: Option<JsonBody<WithdrawalRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ApplicationId(application_id);
    let request = request.map(|JsonBody(body)| body).unwrap_or_default();
    let application = service(&state, &caller)
        .withdraw(&caller, &id, request)
        .await?;
    Ok(Json(json!({ "success": true, "application": application })))
}

pub(crate) async fn status_handler(
    State(state): State<PortalState>,
    caller: Caller,
    Path(application_id): Path<String>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = ApplicationId(application_id);
    let application = service(&state, &caller)
        .update_status(&caller, &id, update)
        .await?;
    Ok(Json(json!({ "success": true, "application": application })))
}
