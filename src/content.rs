//! Resource content cache and reader
//!
//! Static resources are read from disk, dynamic ones fetched over HTTP with
//! gzip/deflate accepted and decoded here. The last text read for each
//! resource is kept in a [`ContentCache`] until it is explicitly removed
//! or the whole cache is cleared. Entries never expire on their own.

use crate::error::{CombinerError, Result};
use crate::request::RequestContext;
use crate::resource::{Resource, ResourceKey, ResourceMode};
use crate::url::PathResolver;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use parking_lot::RwLock;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, COOKIE};
use reqwest::Client;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resource identity → last read text
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: RwLock<HashMap<ResourceKey, String>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &Resource) -> Option<String> {
        self.entries.read().get(&resource.key()).cloned()
    }

    pub fn insert(&self, resource: &Resource, content: String) {
        self.entries.write().insert(resource.key(), content);
    }

    pub fn remove(&self, resource: &Resource) -> bool {
        self.entries.write().remove(&resource.key()).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Reads resource content from disk or over HTTP and keeps the content cache current
pub struct ContentReader {
    cache: ContentCache,
    client: Client,
    resolver: Arc<PathResolver>,
}

impl ContentReader {
    /// Create a reader
    ///
    /// # Arguments
    /// * `resolver` - Maps resource paths to files and URLs
    /// * `timeout` - Timeout for each dynamic resource fetch
    pub fn new(resolver: Arc<PathResolver>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CombinerError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            cache: ContentCache::new(),
            client,
            resolver,
        })
    }

    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Cached content of a resource
    ///
    /// # Arguments
    /// * `read_new_if_empty` - Fetch and cache fresh content on a miss
    ///
    /// # Returns
    /// * `Ok(None)` on a miss when `read_new_if_empty` is false
    pub async fn read_from_cache(
        &self,
        resource: &Resource,
        read_new_if_empty: bool,
        ctx: Option<&RequestContext>,
    ) -> Result<Option<String>> {
        if let Some(content) = self.cache.get(resource) {
            return Ok(Some(content));
        }
        if !read_new_if_empty {
            return Ok(None);
        }
        self.read_new_content(resource, ctx).await.map(Some)
    }

    /// Fetch fresh content, bypassing and then updating the cache
    pub async fn read_new_content(
        &self,
        resource: &Resource,
        ctx: Option<&RequestContext>,
    ) -> Result<String> {
        let content = self.fetch(resource, ctx).await?;
        self.cache.insert(resource, content.clone());
        Ok(content)
    }

    /// Fetch fresh content without touching the cache
    pub async fn fetch(&self, resource: &Resource, ctx: Option<&RequestContext>) -> Result<String> {
        match resource.mode() {
            ResourceMode::Static => self.read_static(resource).await,
            ResourceMode::Dynamic => self.read_dynamic(resource, ctx).await,
        }
    }

    pub fn remove_in_cache(&self, resource: &Resource) {
        if self.cache.remove(resource) {
            debug!("Removed cached content of {}", resource);
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Cleared resource content cache");
    }

    async fn read_static(&self, resource: &Resource) -> Result<String> {
        let path = self.resolver.map_path(resource.path());
        debug!("Reading static resource path={}", path.display());
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                CombinerError::resource_not_found(resource.path(), format!("{} does not exist", path.display())),
            ),
            // Unreadable or non-UTF-8 files cannot be served either
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::InvalidData
                ) =>
            {
                Err(CombinerError::resource_not_found(
                    resource.path(),
                    format!("{} cannot be read: {}", path.display(), e),
                ))
            }
            Err(e) => Err(CombinerError::IoError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn read_dynamic(&self, resource: &Resource, ctx: Option<&RequestContext>) -> Result<String> {
        let url = self.resolver.to_absolute_url(resource.path())?;
        debug!("Fetching dynamic resource url={}", url);

        let mut request = self.client.get(url.clone()).header(ACCEPT_ENCODING, "gzip,deflate");
        if resource.forward_cookie() {
            let ctx = ctx.ok_or_else(|| {
                CombinerError::MissingRequestContext(format!(
                    "{} forwards cookies but there is no request to take them from",
                    resource.path()
                ))
            })?;
            if let Some(cookie) = ctx.cookie_header() {
                request = request.header(COOKIE, cookie);
            }
        }

        let response = request.send().await.map_err(|e| {
            warn!("Failed to fetch url={}: {}", url, e);
            CombinerError::resource_not_found(resource.path(), e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Fetching url={} returned status={}", url, status);
            return Err(CombinerError::resource_not_found(
                resource.path(),
                format!("HTTP status {}", status.as_u16()),
            ));
        }

        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());
        let body = response
            .bytes()
            .await
            .map_err(|e| CombinerError::resource_not_found(resource.path(), e.to_string()))?;

        let decoded = decode_body(&body, encoding.as_deref())
            .map_err(|e| CombinerError::resource_not_found(resource.path(), e.to_string()))?;
        String::from_utf8(decoded).map_err(|e| {
            CombinerError::resource_not_found(resource.path(), format!("body is not UTF-8: {}", e))
        })
    }
}

/// Undo a Content-Encoding
///
/// `deflate` is accepted both zlib-wrapped and raw, since servers disagree.
pub fn decode_body(body: &[u8], content_encoding: Option<&str>) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match content_encoding {
        Some("gzip") | Some("x-gzip") => {
            GzDecoder::new(body).read_to_end(&mut out)?;
        }
        Some("deflate") => {
            if ZlibDecoder::new(body).read_to_end(&mut out).is_err() {
                out.clear();
                DeflateDecoder::new(body).read_to_end(&mut out)?;
            }
        }
        _ => out.extend_from_slice(body),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::minifier::MinifierInfo;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn reader(root: &std::path::Path) -> ContentReader {
        let resolver = PathResolver::new(root, "http://localhost:1", "/").unwrap();
        ContentReader::new(Arc::new(resolver), Duration::from_secs(2)).unwrap()
    }

    fn static_resource(path: &str) -> Resource {
        Resource::new(path, ResourceMode::Static, false, Arc::new(MinifierInfo::off())).unwrap()
    }

    #[test]
    fn test_decode_body_variants() {
        let text = b"var answer = 42;";

        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(text).unwrap();
        assert_eq!(decode_body(&gz.finish().unwrap(), Some("gzip")).unwrap(), text);

        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(text).unwrap();
        assert_eq!(decode_body(&zlib.finish().unwrap(), Some("deflate")).unwrap(), text);

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(text).unwrap();
        assert_eq!(decode_body(&raw.finish().unwrap(), Some("deflate")).unwrap(), text);

        assert_eq!(decode_body(text, None).unwrap(), text);
    }

    #[tokio::test]
    async fn test_static_read_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.css"), "a{color:red}").unwrap();
        let reader = reader(dir.path());
        let resource = static_resource("~/a.css");

        assert_eq!(reader.read_from_cache(&resource, false, None).await.unwrap(), None);
        assert_eq!(
            reader.read_from_cache(&resource, true, None).await.unwrap().as_deref(),
            Some("a{color:red}")
        );

        // Cached value survives an edit until removed
        std::fs::write(dir.path().join("a.css"), "a{color:blue}").unwrap();
        assert_eq!(
            reader.read_from_cache(&resource, true, None).await.unwrap().as_deref(),
            Some("a{color:red}")
        );
        reader.remove_in_cache(&resource);
        assert_eq!(
            reader.read_from_cache(&resource, true, None).await.unwrap().as_deref(),
            Some("a{color:blue}")
        );
    }

    #[tokio::test]
    async fn test_missing_static_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        let result = reader.read_new_content(&static_resource("~/missing.js"), None).await;
        assert!(matches!(result, Err(CombinerError::ResourceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_non_utf8_static_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.js"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        let reader = reader(dir.path());
        let result = reader.read_new_content(&static_resource("~/bad.js"), None).await;
        assert!(matches!(result, Err(CombinerError::ResourceNotFound { .. })));
    }

    #[tokio::test]
    async fn test_forward_cookie_requires_context() {
        let dir = tempfile::tempdir().unwrap();
        let reader = reader(dir.path());
        let resource = Resource::new(
            "http://localhost:1/x.js",
            ResourceMode::Dynamic,
            true,
            Arc::new(MinifierInfo::off()),
        )
        .unwrap();
        let result = reader.read_new_content(&resource, None).await;
        assert!(matches!(result, Err(CombinerError::MissingRequestContext(_))));
    }

    #[test]
    fn test_clear_cache() {
        let cache = ContentCache::new();
        cache.insert(&static_resource("~/a.js"), "x".to_string());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&static_resource("~/A.JS")).as_deref(), Some("x"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
