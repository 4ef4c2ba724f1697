use mime::Mime;

use crate::config::UploadConfig;

/// Size ceiling and MIME allow-list applied before a file reaches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    max_bytes: u64,
    allowed_mime_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("file is empty")]
    Empty,
    #[error("file is {size} bytes; the maximum is {max} bytes")]
    TooLarge { size: u64, max: u64 },
    #[error("file type '{0}' is not allowed")]
    UnsupportedType(String),
}

impl UploadPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|value| value.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Validates a file and returns the content type it will be stored with.
    pub fn check(
        &self,
        file_name: &str,
        declared_type: Option<&str>,
        size: u64,
    ) -> Result<String, UploadRejection> {
        if size == 0 {
            return Err(UploadRejection::Empty);
        }
        if size > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let content_type = resolve_content_type(file_name, declared_type);
        if self
            .allowed_mime_types
            .iter()
            .any(|allowed| *allowed == content_type)
        {
            Ok(content_type)
        } else {
            Err(UploadRejection::UnsupportedType(content_type))
        }
    }
}

/// Uses the declared part type when it is specific, otherwise guesses from
/// the file extension. Parameters such as `charset` are dropped.
fn resolve_content_type(file_name: &str, declared_type: Option<&str>) -> String {
    let declared = declared_type
        .and_then(|value| value.parse::<Mime>().ok())
        .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM);

    let mime = declared.or_else(|| mime_guess::from_path(file_name).first());
    match mime {
        Some(mime) => mime.essence_str().to_ascii_lowercase(),
        None => mime::APPLICATION_OCTET_STREAM.essence_str().to_string(),
    }
}

/// Reduces a client-supplied file name to a safe storage path segment.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_bytes: u64) -> UploadPolicy {
        UploadPolicy::from_config(&UploadConfig {
            max_bytes,
            ..UploadConfig::default()
        })
    }

    #[test]
    fn accepts_allowed_types_within_ceiling() {
        let policy = policy(1024);
        assert_eq!(
            policy.check("transcript.pdf", Some("application/pdf"), 1024),
            Ok("application/pdf".to_string())
        );
        assert_eq!(
            policy.check("photo.JPG", None, 10),
            Ok("image/jpeg".to_string())
        );
    }

    #[test]
    fn rejects_oversize_and_empty_files() {
        let policy = policy(1024);
        assert_eq!(
            policy.check("transcript.pdf", Some("application/pdf"), 1025),
            Err(UploadRejection::TooLarge {
                size: 1025,
                max: 1024
            })
        );
        assert_eq!(
            policy.check("transcript.pdf", Some("application/pdf"), 0),
            Err(UploadRejection::Empty)
        );
    }

    #[test]
    fn rejects_types_outside_allow_list() {
        let policy = policy(1024);
        assert_eq!(
            policy.check("setup.exe", Some("application/x-msdownload"), 10),
            Err(UploadRejection::UnsupportedType(
                "application/x-msdownload".to_string()
            ))
        );
        assert!(matches!(
            policy.check("notes.txt", Some("text/plain; charset=utf-8"), 10),
            Err(UploadRejection::UnsupportedType(kind)) if kind == "text/plain"
        ));
    }

    #[test]
    fn octet_stream_falls_back_to_extension() {
        let policy = policy(1024);
        assert_eq!(
            policy.check("scan.png", Some("application/octet-stream"), 10),
            Ok("image/png".to_string())
        );
        assert!(policy
            .check("blob", Some("application/octet-stream"), 10)
            .is_err());
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\My CV.pdf"), "My_CV.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("résumé.pdf"), "r_sum_.pdf");
    }
}
