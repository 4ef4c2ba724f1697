use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::backend::Backend;
use crate::config::{PortalConfig, UploadConfig};
use crate::workflows::documents::UploadPolicy;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct PortalState {
    pub backend: Backend,
    pub audit: AuditLogger,
    pub uploads: Arc<UploadPolicy>,
    pub storage_bucket: Arc<str>,
    pub sign_in_path: Arc<str>,
}

impl PortalState {
    pub fn new(
        backend: Backend,
        uploads: &UploadConfig,
        storage_bucket: &str,
        portal: &PortalConfig,
    ) -> Self {
        // Audit rows are written with the service credentials, not the caller's.
        let audit = AuditLogger::new(backend.database.clone());
        Self {
            backend,
            audit,
            uploads: Arc::new(UploadPolicy::from_config(uploads)),
            storage_bucket: Arc::from(storage_bucket),
            sign_in_path: Arc::from(portal.sign_in_path.as_str()),
        }
    }

    /// Replaces the audit sink, e.g. to point it at a separate database handle.
    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }
}
