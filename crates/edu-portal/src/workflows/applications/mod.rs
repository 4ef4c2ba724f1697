//! Application lifecycle: student drafts, submission and withdrawal, and the
//! admin status update that appends history and audit rows.

pub mod domain;
pub mod router;
pub mod service;

pub use domain::{
    Application, ApplicationDetail, ApplicationDraft, ApplicationId, ApplicationStatus,
    StatusHistoryEntry, StatusUpdate, WithdrawalRequest, APPLICATIONS_TABLE, STATUS_HISTORY_TABLE,
};
pub use router::application_routes;
pub use service::{ApplicationError, ApplicationService, UPDATE_STATUS_ACTION};
