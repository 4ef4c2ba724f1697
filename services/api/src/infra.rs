use edu_portal::backend::{Backend, MemoryBackend, RestBackend};
use edu_portal::config::BackendConfig;
use edu_portal::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// REST adapters when a backend URL is configured, otherwise process-local
/// tables that vanish on exit.
pub(crate) fn build_backend(config: &BackendConfig) -> Result<Backend, AppError> {
    match &config.remote {
        Some(remote) => {
            info!(base_url = %remote.base_url, bucket = %config.storage_bucket, "using managed backend");
            Ok(RestBackend::new(remote)?.backend())
        }
        None => {
            warn!("BACKEND_URL not set; using the in-memory backend");
            Ok(MemoryBackend::default().backend())
        }
    }
}
