use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::auth::{Caller, MaybeCaller};
use crate::error::ApiError;
use crate::state::PortalState;
use crate::workflows::applications::{Application, ApplicationService};
use crate::workflows::notifications::NotificationService;
use crate::workflows::profiles::{Profile, ProfileService};

pub const PORTAL_PATH: &str = "/portal";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub profile: Profile,
    pub applications: Vec<Application>,
    pub unread_notifications: usize,
}

pub async fn dashboard(state: &PortalState, caller: &Caller) -> Result<Dashboard, ApiError> {
    let database = caller.database(state);
    let profile = ProfileService::new(database.clone(), state.audit.clone())
        .current(caller)
        .await?;
    let applications = ApplicationService::new(database.clone(), state.audit.clone())
        .list(caller)
        .await?;
    let unread_notifications = NotificationService::new(database, state.audit.clone())
        .unread_count(&caller.user_id)
        .await?;

    Ok(Dashboard {
        profile,
        applications,
        unread_notifications,
    })
}

/// `/sign-in?next=/portal`
pub fn sign_in_redirect(sign_in_path: &str) -> Redirect {
    Redirect::to(&format!("{sign_in_path}?next={PORTAL_PATH}"))
}

pub fn portal_routes() -> Router<PortalState> {
    Router::new().route(PORTAL_PATH, get(portal_handler))
}

pub(crate) async fn portal_handler(
    State(state): State<PortalState>,
    MaybeCaller(caller): MaybeCaller,
) -> Result<Response, ApiError> {
    let Some(caller) = caller else {
        return Ok(sign_in_redirect(&state.sign_in_path).into_response());
    };
    Ok(Json(dashboard(&state, &caller).await?).into_response())
}
