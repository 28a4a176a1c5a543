//! Path and URL resolution
//!
//! Resource paths come in three shapes: `~/`-relative to the application,
//! absolute URLs, and filesystem paths. [`PathResolver`] turns them into
//! public URLs, absolute fetch URLs, or local files. The base URL is taken
//! from configuration so that background tasks can resolve `~/` paths
//! without a live request.

use crate::error::{CombinerError, Result};
use reqwest::Url;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathResolver {
    app_root: PathBuf,
    base_url: Url,
    virtual_path: String,
}

impl PathResolver {
    /// Create a resolver
    ///
    /// # Arguments
    /// * `app_root` - Directory `~/` maps to on disk
    /// * `base_url` - Absolute URL the application is reachable at
    /// * `virtual_path` - Path prefix `~/` maps to in public URLs
    pub fn new(app_root: impl AsRef<Path>, base_url: &str, virtual_path: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            CombinerError::ConfigError(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        let trimmed = virtual_path.trim_matches('/');
        let virtual_path = if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        };
        Ok(Self {
            app_root: app_root.as_ref().to_path_buf(),
            base_url,
            virtual_path,
        })
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_absolute_url(path: &str) -> bool {
        let lower = path.trim_start().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Public URL path for an app-relative path; other paths are returned unchanged
    ///
    /// `~/js/a.js` with virtual path `/app/` becomes `/app/js/a.js`.
    pub fn resolve_url(&self, path: &str) -> String {
        if let Some(rest) = path.strip_prefix("~/") {
            format!("{}{}", self.virtual_path, rest)
        } else if path == "~" {
            self.virtual_path.clone()
        } else {
            path.to_string()
        }
    }

    /// Absolute URL used to fetch a dynamic resource
    pub fn to_absolute_url(&self, path: &str) -> Result<Url> {
        if Self::is_absolute_url(path) {
            return Url::parse(path.trim()).map_err(|e| {
                CombinerError::resource_not_found(path, format!("invalid URL: {}", e))
            });
        }
        let resolved = self.resolve_url(path);
        self.base_url.join(&resolved).map_err(|e| {
            CombinerError::resource_not_found(path, format!("cannot resolve against base URL: {}", e))
        })
    }

    /// Local file a static resource is read from
    pub fn map_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            return self.app_root.join(rest);
        }
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.app_root.join(candidate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new("/srv/app", "http://localhost:8080/", "app").unwrap()
    }

    #[test]
    fn test_resolve_url() {
        let r = resolver();
        assert_eq!(r.resolve_url("~/js/a.js"), "/app/js/a.js");
        assert_eq!(r.resolve_url("/other.js"), "/other.js");
        assert_eq!(r.resolve_url("http://cdn/x.js"), "http://cdn/x.js");

        let root = PathResolver::new("/srv", "http://localhost", "/").unwrap();
        assert_eq!(root.resolve_url("~/a.css"), "/a.css");
    }

    #[test]
    fn test_absolute_url() {
        let r = resolver();
        assert_eq!(
            r.to_absolute_url("~/handler/data.js").unwrap().as_str(),
            "http://localhost:8080/app/handler/data.js"
        );
        assert_eq!(
            r.to_absolute_url("HTTPS://cdn.example.com/a.js").unwrap().as_str(),
            "https://cdn.example.com/a.js"
        );
    }

    #[test]
    fn test_map_path() {
        let r = resolver();
        assert_eq!(r.map_path("~/js/a.js"), PathBuf::from("/srv/app/js/a.js"));
        assert_eq!(r.map_path("/etc/x.css"), PathBuf::from("/etc/x.css"));
        assert_eq!(r.map_path("css/y.css"), PathBuf::from("/srv/app/css/y.css"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(PathResolver::new(".", "not a url", "/").is_err());
    }
}
