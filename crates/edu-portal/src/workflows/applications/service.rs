use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;

use super::domain::{
    Application, ApplicationDetail, ApplicationDraft, ApplicationId, ApplicationStatus,
    NewApplicationRow, StatusHistoryEntry, StatusUpdate, WithdrawalRequest, APPLICATIONS_TABLE,
    STATUS_HISTORY_TABLE,
};
use crate::audit::{AuditEntry, AuditLogger};
use crate::auth::Caller;
use crate::backend::{
    find_by_id, from_row, from_rows, timestamp, to_row, BackendError, Database, Filter,
};
use crate::error::ApiError;

pub const UPDATE_STATUS_ACTION: &str = "UPDATE_APPLICATION_STATUS";

/// Application lifecycle: drafts, submission, withdrawal and admin status
/// changes, each followed by a status-history row.
///
/// History rows are written after the primary update without a transaction;
/// a failure in between leaves the trail one entry short.
pub struct ApplicationService {
    database: Arc<dyn Database>,
    audit: AuditLogger,
}

impl ApplicationService {
    pub fn new(database: Arc<dyn Database>, audit: AuditLogger) -> Self {
        Self { database, audit }
    }

    /// Creates a draft owned by the caller.
    pub async fn create(
        &self,
        caller: &Caller,
        draft: ApplicationDraft,
    ) -> Result<Application, ApplicationError> {
        let program = required(draft.program.as_deref(), "program")?;
        let institution = required(draft.institution.as_deref(), "institution")?;

        let row = to_row(&NewApplicationRow {
            user_id: &caller.user_id,
            program,
            institution,
            intake: non_blank(draft.intake.as_deref()),
            status: ApplicationStatus::Draft,
            notes: non_blank(draft.notes.as_deref()),
        })?;
        let stored: Application = from_row(self.database.insert(APPLICATIONS_TABLE, row).await?)?;

        self.append_history(&stored.id, ApplicationStatus::Draft, None, &caller.user_id)
            .await?;
        info!(application_id = %stored.id.0, user_id = %caller.user_id, "application draft created");
        Ok(stored)
    }

    /// Students and associates see their own applications, admins see all.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<Application>, ApplicationError> {
        let mut filter = Filter::new().order_desc("created_at");
        if !caller.is_admin() {
            filter = filter.equals("user_id", caller.user_id.as_str());
        }
        let rows = self.database.select(APPLICATIONS_TABLE, &filter).await?;
        Ok(from_rows(rows)?)
    }

    pub async fn detail(
        &self,
        caller: &Caller,
        id: &ApplicationId,
    ) -> Result<ApplicationDetail, ApplicationError> {
        let application = self.fetch_visible(caller, id).await?;
        let history = self.history(id).await?;
        Ok(ApplicationDetail {
            application,
            history,
        })
    }

    /// Oldest first.
    pub async fn history(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<StatusHistoryEntry>, ApplicationError> {
        let filter = Filter::new()
            .equals("application_id", id.as_str())
            .order_asc("created_at");
        let rows = self.database.select(STATUS_HISTORY_TABLE, &filter).await?;
        Ok(from_rows(rows)?)
    }

    /// Owner moves a draft to `submitted`.
    pub async fn submit(
        &self,
        caller: &Caller,
        id: &ApplicationId,
    ) -> Result<Application, ApplicationError> {
        let application = self.fetch(id).await?;
        if !application.is_owned_by(&caller.user_id) {
            return Err(ApplicationError::Forbidden(
                "only the applicant can submit this application",
            ));
        }
        if application.status != ApplicationStatus::Draft {
            return Err(ApplicationError::NotDraft(application.status));
        }

        let updated = self
            .write_status(id, ApplicationStatus::Submitted, None, &caller.user_id)
            .await?;
        info!(application_id = %id.0, "application submitted");
        Ok(updated)
    }

    /// Owner withdraws their application. Refused when already withdrawn.
    pub async fn withdraw(
        &self,
        caller: &Caller,
        id: &ApplicationId,
        request: WithdrawalRequest,
    ) -> Result<Application, ApplicationError> {
        let application = self.fetch(id).await?;
        if !application.is_owned_by(&caller.user_id) {
            return Err(ApplicationError::Forbidden(
                "only the applicant can withdraw this application",
            ));
        }
        if application.status == ApplicationStatus::Withdrawn {
            return Err(ApplicationError::AlreadyWithdrawn);
        }

        let note = non_blank(request.reason.as_deref());
        let updated = self
            .write_status(id, ApplicationStatus::Withdrawn, note, &caller.user_id)
            .await?;
        info!(application_id = %id.0, user_id = %caller.user_id, "application withdrawn");
        Ok(updated)
    }

    /// Admin sets any status, with no transition rules. Re-entering the
    /// current status still appends a history row.
    pub async fn update_status(
        &self,
        caller: &Caller,
        id: &ApplicationId,
        update: StatusUpdate,
    ) -> Result<Application, ApplicationError> {
        if !caller.is_admin() {
            return Err(ApplicationError::Forbidden("admin access required"));
        }
        let raw_status = required(update.status.as_deref(), "status")?;
        let status = ApplicationStatus::parse(raw_status)
            .ok_or_else(|| ApplicationError::UnknownStatus(raw_status.to_string()))?;
        let note = non_blank(update.note.as_deref());

        let previous = self.fetch(id).await?;
        let updated = self.write_status(id, status, note, &caller.user_id).await?;

        self.audit
            .record(
                AuditEntry::new(&caller.user_id, UPDATE_STATUS_ACTION, "application")
                    .entity(id.as_str())
                    .before(json!({ "status": previous.status }))
                    .after(json!({ "status": status, "note": note })),
            )
            .await;

        info!(
            application_id = %id.0,
            from = previous.status.label(),
            to = status.label(),
            admin_id = %caller.user_id,
            "application status updated"
        );
        Ok(updated)
    }

    pub(crate) async fn fetch(&self, id: &ApplicationId) -> Result<Application, ApplicationError> {
        let row = find_by_id(self.database.as_ref(), APPLICATIONS_TABLE, id.as_str())
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.clone()))?;
        Ok(from_row(row)?)
    }

    /// Fetches an application the caller owns, or any application for admins.
    pub(crate) async fn fetch_visible(
        &self,
        caller: &Caller,
        id: &ApplicationId,
    ) -> Result<Application, ApplicationError> {
        let application = self.fetch(id).await?;
        if caller.is_admin() || application.is_owned_by(&caller.user_id) {
            Ok(application)
        } else {
            Err(ApplicationError::Forbidden(
                "you do not have access to this application",
            ))
        }
    }

    async fn write_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        note: Option<&str>,
        actor_id: &str,
    ) -> Result<Application, ApplicationError> {
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(status));
        patch.insert(
            "updated_at".to_string(),
            Value::String(timestamp()),
        );

        let row = self
            .database
            .update(APPLICATIONS_TABLE, id.as_str(), patch)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.clone()))?;
        let updated: Application = from_row(row)?;

        self.append_history(id, status, note, actor_id).await?;
        Ok(updated)
    }

    async fn append_history(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        note: Option<&str>,
        actor_id: &str,
    ) -> Result<(), ApplicationError> {
        let entry = StatusHistoryEntry {
            id: None,
            application_id: id.clone(),
            status,
            note: note.map(str::to_string),
            changed_by: actor_id.to_string(),
            created_at: None,
        };
        self.database
            .insert(STATUS_HISTORY_TABLE, to_row(&entry)?)
            .await?;
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ApplicationError> {
    non_blank(value).ok_or(ApplicationError::MissingField(field))
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("unknown application status '{0}'")]
    UnknownStatus(String),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("application already withdrawn")]
    AlreadyWithdrawn,
    #[error("only draft applications can be submitted (current status: {0})")]
    NotDraft(ApplicationStatus),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<ApplicationError> for ApiError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Backend(err) => ApiError::Backend(err),
            ApplicationError::NotFound(_) => ApiError::not_found(value.to_string()),
            ApplicationError::Forbidden(message) => ApiError::forbidden(message),
            ApplicationError::MissingField(_)
            | ApplicationError::UnknownStatus(_)
            | ApplicationError::AlreadyWithdrawn
            | ApplicationError::NotDraft(_) => ApiError::validation(value.to_string()),
        }
    }
}
