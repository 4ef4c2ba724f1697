use axum::{routing::get, Router};

use crate::audit::list_audit_logs;
use crate::state::PortalState;
use crate::workflows::applications::application_routes;
use crate::workflows::cms::cms_routes;
use crate::workflows::documents::document_routes;
use crate::workflows::inquiries::inquiry_routes;
use crate::workflows::notifications::notification_routes;
use crate::workflows::portal::portal_routes;
use crate::workflows::profiles::profile_routes;

/// Every portal endpoint, bound to `state`.
pub fn portal_router(state: PortalState) -> Router {
    let max_upload_bytes = state.uploads.max_bytes();

    Router::new()
        .merge(application_routes())
        .merge(document_routes(max_upload_bytes))
        .merge(cms_routes())
        .merge(notification_routes())
        .merge(profile_routes())
        .merge(inquiry_routes())
        .merge(portal_routes())
        .route("/api/admin/audit-logs", get(list_audit_logs))
        .with_state(state)
}
