//! Public contact form. Submissions land in the `inquiries` table for staff
//! follow-up.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::backend::{to_row, Database};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::PortalState;

pub const INQUIRIES_TABLE: &str = "inquiries";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inquiry {
    pub name: String,
    pub email: String,
    pub message: String,
    pub phone: Option<String>,
    pub destination: Option<String>,
    pub status: &'static str,
}

impl ContactRequest {
    pub fn validate(self) -> Result<Inquiry, ApiError> {
        let name = required(self.name, "name")?;
        let email = required(self.email, "email")?;
        let message = required(self.message, "message")?;
        if !email.contains('@') {
            return Err(ApiError::validation("email must be a valid address"));
        }

        Ok(Inquiry {
            name,
            email,
            message,
            phone: optional(self.phone),
            destination: optional(self.destination),
            status: "new",
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    optional(value).ok_or_else(|| ApiError::validation(format!("{field} is required")))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn submit_inquiry(database: &dyn Database, request: ContactRequest) -> Result<(), ApiError> {
    let inquiry = request.validate()?;
    let row = database.insert(INQUIRIES_TABLE, to_row(&inquiry)?).await?;
    let inquiry_id = row.get("id").and_then(Value::as_str).unwrap_or_default();
    info!(inquiry_id, "inquiry received");
    Ok(())
}

pub fn inquiry_routes() -> Router<PortalState> {
    Router::new().route("/api/contact", post(contact_handler))
}

/// Anonymous; written with the service credentials.
pub(crate) async fn contact_handler(
    State(state): State<PortalState>,
    JsonBody(request): JsonBody<ContactRequest>,
) -> Result<Json<Value>, ApiError> {
    submit_inquiry(state.backend.database.as_ref(), request).await?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDatabase;

    fn request(name: &str, email: &str, message: &str) -> ContactRequest {
        ContactRequest {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            message: Some(message.to_string()),
            ..ContactRequest::default()
        }
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        let err = request("  ", "ada@example.com", "hi")
            .validate()
            .expect_err("name missing");
        assert_eq!(err.to_string(), "name is required");

        let err = ContactRequest::default().validate().expect_err("empty");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn email_needs_an_at_sign() {
        let err = request("Ada", "ada.example.com", "hi")
            .validate()
            .expect_err("bad email");
        assert_eq!(err.to_string(), "email must be a valid address");
    }

    #[tokio::test]
    async fn valid_inquiry_is_stored_as_new() {
        let db = MemoryDatabase::default();
        let mut contact = request("Ada", "ada@example.com", "Study in Canada?");
        contact.destination = Some(" Canada ".to_string());

        submit_inquiry(&db, contact).await.expect("stored");

        let rows = db.rows(INQUIRIES_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], "new");
        assert_eq!(rows[0]["destination"], "Canada");
        assert_eq!(rows[0]["phone"], Value::Null);
    }
}
