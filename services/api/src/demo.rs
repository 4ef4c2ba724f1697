use edu_portal::audit::{AuditLogger, AuditQuery};
use edu_portal::auth::{resolve_caller, Caller};
use edu_portal::backend::{to_row, AuthUser, Database, MemoryBackend};
use edu_portal::config::{PortalConfig, UploadConfig};
use edu_portal::error::{ApiError, AppError};
use edu_portal::state::PortalState;
use edu_portal::workflows::applications::{
    ApplicationDraft, ApplicationService, StatusUpdate, WithdrawalRequest,
};
use edu_portal::workflows::documents::{
    DocumentService, RequirementRequest, ReviewRequest, UploadForm, DOCUMENT_TYPES_TABLE,
};
use edu_portal::workflows::notifications::{NotificationDraft, NotificationService};
use edu_portal::workflows::profiles::PROFILES_TABLE;
use serde_json::json;

const ADMIN_TOKEN: &str = "demo-admin";
const STUDENT_TOKEN: &str = "demo-student";

pub(crate) async fn run_demo() -> Result<(), AppError> {
    let memory = MemoryBackend::default();
    seed(&memory).await?;
    let state = PortalState::new(
        memory.backend(),
        &UploadConfig::default(),
        "documents",
        &PortalConfig::default(),
    );

    println!("Student portal demo (in-memory backend)");
    walkthrough(&state).await?;

    let audit = AuditLogger::new(state.backend.database.clone())
        .list(&AuditQuery::default())
        .await?;
    println!("\nAudit trail ({} entries, newest first)", audit.len());
    for record in audit {
        println!(
            "  - {} {} {} by {}",
            record.entry.action,
            record.entry.entity_type,
            record.entry.entity_id.as_deref().unwrap_or("-"),
            record.entry.actor_id
        );
    }
    println!(
        "\nStorage holds {} object(s)",
        memory.storage.object_count()
    );
    Ok(())
}

async fn seed(memory: &MemoryBackend) -> Result<(), ApiError> {
    for (id, token, email, role, name) in [
        ("admin-1", ADMIN_TOKEN, "advisor@example.com", "admin", "Priya Advisor"),
        ("student-1", STUDENT_TOKEN, "sam@example.com", "student", "Sam Student"),
    ] {
        memory.auth.issue(
            token,
            AuthUser {
                id: id.to_string(),
                email: Some(email.to_string()),
            },
        );
        let row = to_row(&json!({ "id": id, "email": email, "role": role, "full_name": name }))?;
        memory.database.insert(PROFILES_TABLE, row).await?;
    }

    for (id, name) in [("passport", "Passport"), ("transcript", "Academic transcript")] {
        let row = to_row(&json!({ "id": id, "name": name }))?;
        memory.database.insert(DOCUMENT_TYPES_TABLE, row).await?;
    }
    Ok(())
}

async fn caller(state: &PortalState, token: &str) -> Result<Caller, ApiError> {
    resolve_caller(state, token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

async fn walkthrough(state: &PortalState) -> Result<(), ApiError> {
    let admin = caller(state, ADMIN_TOKEN).await?;
    let student = caller(state, STUDENT_TOKEN).await?;

    let applications =
        ApplicationService::new(student.database(state), state.audit.clone());
    let documents = DocumentService::new(
        student.database(state),
        state.backend.storage.clone(),
        state.audit.clone(),
        state.uploads.clone(),
        state.storage_bucket.clone(),
    );
    let notifications = NotificationService::new(admin.database(state), state.audit.clone());

    println!("\n1. Student drafts an application");
    let application = applications
        .create(
            &student,
            ApplicationDraft {
                program: Some("MSc Environmental Engineering".to_string()),
                institution: Some("University of Melbourne".to_string()),
                intake: Some("February 2027".to_string()),
                notes: None,
            },
        )
        .await?;
    println!(
        "  {} at {} -> {}",
        application.program, application.institution, application.status
    );

    println!("\n2. Student submits");
    let application = applications.submit(&student, &application.id).await?;
    println!("  status: {}", application.status);

    println!("\n3. Advisor starts the review and requests a passport copy");
    let application = applications
        .update_status(
            &admin,
            &application.id,
            StatusUpdate {
                status: Some("under_review".to_string()),
                note: Some("Assigned to Priya".to_string()),
            },
        )
        .await?;
    println!("  status: {}", application.status);
    let requirement = documents
        .add_requirement(
            &admin,
            &application.id,
            RequirementRequest {
                document_type_id: Some("passport".to_string()),
            },
        )
        .await?;
    println!("  required document: {}", requirement.document_type_id);

    println!("\n4. Student uploads, advisor rejects, student re-uploads, advisor approves");
    let upload = |file_name: &str| UploadForm {
        file_name: Some(file_name.to_string()),
        declared_type: Some("application/pdf".to_string()),
        bytes: Some(b"%PDF-1.7 demo passport scan".to_vec()),
        application_id: Some(application.id.to_string()),
        document_type_id: Some("passport".to_string()),
        required_document_id: Some(requirement.id.clone()),
    };
    let first = documents.upload(&student, upload("passport-blurry.pdf")).await?;
    let first = documents
        .review(
            &admin,
            &first.id,
            ReviewRequest {
                status: Some("rejected".to_string()),
                reason: Some("Photo page is unreadable".to_string()),
            },
        )
        .await?;
    println!(
        "  {} -> {} ({})",
        first.file_name,
        first.status.label(),
        first.rejection_reason.as_deref().unwrap_or_default()
    );
    let second = documents.upload(&student, upload("passport.pdf")).await?;
    let second = documents
        .review(
            &admin,
            &second.id,
            ReviewRequest {
                status: Some("approved".to_string()),
                reason: None,
            },
        )
        .await?;
    println!("  {} -> {}", second.file_name, second.status.label());

    let rejected_upload = documents
        .upload(
            &student,
            UploadForm {
                file_name: Some("installer.exe".to_string()),
                declared_type: Some("application/x-msdownload".to_string()),
                ..upload("installer.exe")
            },
        )
        .await;
    if let Err(err) = rejected_upload {
        println!("  installer.exe refused: {err}");
    }

    println!("\n5. Advisor notifies the student");
    let notification = notifications
        .send(
            &admin,
            &student.user_id,
            NotificationDraft {
                title: Some("Documents approved".to_string()),
                message: Some("Your passport copy has been accepted.".to_string()),
            },
        )
        .await?;
    println!("  sent: {}", notification.title);

    println!("\n6. Student withdraws, then tries again");
    let application = applications
        .withdraw(
            &student,
            &application.id,
            WithdrawalRequest {
                reason: Some("Accepted an offer elsewhere".to_string()),
            },
        )
        .await?;
    println!("  status: {}", application.status);
    if let Err(err) = applications
        .withdraw(&student, &application.id, WithdrawalRequest::default())
        .await
    {
        println!("  second withdrawal refused: {err}");
    }

    println!("\nStatus history");
    for entry in applications.history(&application.id).await? {
        println!(
            "  - {} by {}{}",
            entry.status,
            entry.changed_by,
            entry
                .note
                .map(|note| format!(" ({note})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
