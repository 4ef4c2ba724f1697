use std::fmt;

use serde::{Deserialize, Serialize};

pub const APPLICATIONS_TABLE: &str = "applications";
pub const STATUS_HISTORY_TABLE: &str = "application_status_history";

/// Identifier wrapper for applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status column of an application. Stored as its snake_case label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 6] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Row of the `applications` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user_id: String,
    pub program: String,
    pub institution: String,
    #[serde(default)]
    pub intake: Option<String>,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Application {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Insert shape for a new draft; the backend fills `id` and `created_at`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewApplicationRow<'a> {
    pub user_id: &'a str,
    pub program: &'a str,
    pub institution: &'a str,
    pub intake: Option<&'a str>,
    pub status: ApplicationStatus,
    pub notes: Option<&'a str>,
}

/// Append-only row of `application_status_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub changed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Student request for a new application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub intake: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Admin payload for `PATCH .../status`. Fields are optional so missing
/// values surface as validation errors rather than extractor rejections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Application together with its status trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub history: Vec<StatusHistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_through_parse() {
        for status in ApplicationStatus::ALL {
            assert_eq!(ApplicationStatus::parse(status.label()), Some(status));
        }
        assert_eq!(
            ApplicationStatus::parse(" Under_Review "),
            Some(ApplicationStatus::UnderReview)
        );
        assert_eq!(ApplicationStatus::parse("archived"), None);
    }

    #[test]
    fn status_serializes_as_label() {
        let value = serde_json::to_value(ApplicationStatus::UnderReview).expect("serializes");
        assert_eq!(value, serde_json::json!("under_review"));
    }
}
