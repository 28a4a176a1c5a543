//! Error types for the asset combiner

use thiserror::Error;

/// Result type alias for combiner operations
pub type Result<T> = std::result::Result<T, CombinerError>;

/// Error types that can occur while loading definitions or serving resource sets
#[derive(Error, Debug, Clone)]
pub enum CombinerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Resource set not found: {0}")]
    ResourceSetNotFound(String),

    #[error("Resource not found: {path} ({reason})")]
    ResourceNotFound { path: String, reason: String },

    #[error("Request context required: {0}")]
    MissingRequestContext(String),

    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Change monitor error: {0}")]
    MonitorError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for CombinerError {
    fn from(err: std::io::Error) -> Self {
        CombinerError::IoError(err.to_string())
    }
}

impl CombinerError {
    /// Create a ResourceNotFound error for the given resource path
    pub fn resource_not_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CombinerError::ResourceNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the requested set or one of its resources cannot be resolved
    ///
    /// Only these two kinds are recovered into a clean 404 at the HTTP boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CombinerError::ResourceSetNotFound(_) | CombinerError::ResourceNotFound { .. }
        )
    }

    /// Convert error to HTTP status code
    ///
    /// - Set or resource not found: 404
    /// - Everything else: 500, since masking a misconfiguration or plugin bug
    ///   would produce silently wrong assets
    pub fn to_http_status(&self) -> u16 {
        match self {
            CombinerError::ResourceSetNotFound(_) => 404,
            CombinerError::ResourceNotFound { .. } => 404,

            CombinerError::ConfigError(_) => 500,
            CombinerError::MissingRequestContext(_) => 500,
            CombinerError::PluginError(_) => 500,
            CombinerError::CompressionError(_) => 500,
            CombinerError::IoError(_) => 500,
            CombinerError::HttpError(_) => 500,
            CombinerError::MonitorError(_) => 500,
            CombinerError::InternalError(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kinds_map_to_404() {
        let set = CombinerError::ResourceSetNotFound("siteJs".to_string());
        let res = CombinerError::resource_not_found("~/js/a.js", "missing file");

        assert!(set.is_not_found());
        assert!(res.is_not_found());
        assert_eq!(set.to_http_status(), 404);
        assert_eq!(res.to_http_status(), 404);
    }

    #[test]
    fn test_other_errors_map_to_500() {
        let errors = vec![
            CombinerError::ConfigError("bad".to_string()),
            CombinerError::PluginError("minifier blew up".to_string()),
            CombinerError::MissingRequestContext("cookie".to_string()),
            CombinerError::InternalError("x".to_string()),
        ];
        for err in errors {
            assert!(!err.is_not_found());
            assert_eq!(err.to_http_status(), 500);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CombinerError = io.into();
        assert!(matches!(err, CombinerError::IoError(msg) if msg.contains("gone")));
    }
}
