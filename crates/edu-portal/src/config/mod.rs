use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

pub const DEFAULT_UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_STORAGE_BUCKET: &str = "documents";
pub const DEFAULT_SIGN_IN_PATH: &str = "/sign-in";

/// MIME types accepted by the document upload handler unless overridden.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub backend: BackendConfig,
    pub uploads: UploadConfig,
    pub portal: PortalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let backend = BackendConfig::from_env()?;
        if backend.remote.is_none() && environment == AppEnvironment::Production {
            return Err(ConfigError::MissingBackend);
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            backend,
            uploads: UploadConfig::from_env()?,
            portal: PortalConfig {
                sign_in_path: env::var("PORTAL_SIGN_IN_PATH")
                    .unwrap_or_else(|_| DEFAULT_SIGN_IN_PATH.to_string()),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Connection details for the managed database/auth/storage backend.
///
/// `remote` is `None` when no backend URL is configured, in which case the
/// service runs against the in-memory backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub remote: Option<RemoteBackendConfig>,
    pub storage_bucket: String,
}

#[derive(Debug, Clone)]
pub struct RemoteBackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let storage_bucket =
            env::var("STORAGE_BUCKET").unwrap_or_else(|_| DEFAULT_STORAGE_BUCKET.to_string());

        let remote = match env::var("BACKEND_URL") {
            Ok(url) if !url.trim().is_empty() => {
                let api_key = env::var("BACKEND_API_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or(ConfigError::MissingApiKey)?;
                let timeout_secs = env::var("BACKEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber("BACKEND_TIMEOUT_SECS"))?;
                Some(RemoteBackendConfig {
                    base_url: url.trim().trim_end_matches('/').to_string(),
                    api_key,
                    timeout_secs,
                })
            }
            _ => None,
        };

        Ok(Self {
            remote,
            storage_bucket,
        })
    }
}

/// Limits applied to document uploads before anything reaches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|value| value.to_string())
                .collect(),
        }
    }
}

impl UploadConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("UPLOAD_MAX_BYTES") {
            config.max_bytes = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber("UPLOAD_MAX_BYTES"))?;
        }

        if let Ok(raw) = env::var("UPLOAD_ALLOWED_MIME") {
            let types: Vec<String> = raw
                .split(',')
                .map(|value| value.trim().to_ascii_lowercase())
                .filter(|value| !value.is_empty())
                .collect();
            if !types.is_empty() {
                config.allowed_mime_types = types;
            }
        }

        Ok(config)
    }
}

/// Settings for the browser-facing portal guard.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub sign_in_path: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber(&'static str),
    MissingApiKey,
    MissingBackend,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber(var) => write!(f, "{var} must be a non-negative integer"),
            ConfigError::MissingApiKey => {
                write!(f, "BACKEND_API_KEY is required when BACKEND_URL is set")
            }
            ConfigError::MissingBackend => {
                write!(f, "BACKEND_URL must be set when APP_ENV is production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "BACKEND_URL",
            "BACKEND_API_KEY",
            "BACKEND_TIMEOUT_SECS",
            "STORAGE_BUCKET",
            "UPLOAD_MAX_BYTES",
            "UPLOAD_ALLOWED_MIME",
            "PORTAL_SIGN_IN_PATH",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.backend.remote.is_none());
        assert_eq!(config.backend.storage_bucket, "documents");
        assert_eq!(config.uploads, UploadConfig::default());
        assert_eq!(config.portal.sign_in_path, "/sign-in");
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn remote_backend_requires_api_key() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BACKEND_URL", "https://backend.example.com/");
        let err = AppConfig::load().expect_err("api key missing");
        assert!(matches!(err, ConfigError::MissingApiKey));

        env::set_var("BACKEND_API_KEY", "service-key");
        let config = AppConfig::load().expect("config loads");
        let remote = config.backend.remote.expect("remote backend configured");
        assert_eq!(remote.base_url, "https://backend.example.com");
        assert_eq!(remote.timeout_secs, 10);
        reset_env();
    }

    #[test]
    fn production_refuses_in_memory_backend() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        let err = AppConfig::load().expect_err("backend required");
        assert!(matches!(err, ConfigError::MissingBackend));
        reset_env();
    }

    #[test]
    fn upload_overrides_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("UPLOAD_MAX_BYTES", "2048");
        env::set_var("UPLOAD_ALLOWED_MIME", "application/pdf, IMAGE/PNG ,");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.uploads.max_bytes, 2048);
        assert_eq!(
            config.uploads.allowed_mime_types,
            vec!["application/pdf".to_string(), "image/png".to_string()]
        );
        reset_env();
    }
}
