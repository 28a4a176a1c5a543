//! Request processor
//!
//! One [`RequestProcessor`] is built per request for a resource set. It
//! resolves the set, negotiates compression, computes the cache-vary states
//! and output cache keys, picks the workflow, and finally turns the
//! workflow's result into an [`AssetResponse`].

use crate::compression::Compressor;
use crate::content::ContentReader;
use crate::error::{CombinerError, Result};
use crate::metrics::RequestOutcome;
use crate::output_cache::OutputCache;
use crate::plugins::cache_vary::CacheVaryState;
use crate::plugins::filters::{ContentFilter, FilterContext};
use crate::request::RequestContext;
use crate::resource_set::ResourceSet;
use crate::settings::Settings;
use crate::workflow;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG,
    EXPIRES, LAST_MODIFIED, VARY,
};
use http::StatusCode;
use std::sync::Arc;

/// First segment of every output cache key
pub const CACHE_PREFIX: &str = "asset_combiner";
/// Second segment of every output cache key
pub const PROCESSOR_TAG: &str = "RequestProcessor";
/// Suffix of the companion key holding a cached body's ETag
pub const ETAG_SUFFIX: &str = "/@etag";

/// Key prefix shared by every output cache entry of one set
pub fn set_cache_prefix(set_name: &str) -> String {
    format!("{}/{}/{}/", CACHE_PREFIX, PROCESSOR_TAG, set_name)
}

/// Workflow a request runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    /// Cached, minified, versioned output
    Default,
    /// Fresh, unminified output with per-resource banners and no caching
    Debug,
}

/// A finished response, independent of the HTTP server in front of it
#[derive(Debug, Clone)]
pub struct AssetResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub outcome: RequestOutcome,
}

impl AssetResponse {
    /// A body-less error response
    pub fn error(status: StatusCode, outcome: RequestOutcome) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
        Self {
            status,
            headers,
            body: Bytes::new(),
            outcome,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub struct RequestProcessor {
    ctx: RequestContext,
    settings: Arc<Settings>,
    set: Arc<ResourceSet>,
    compressor: Compressor,
    vary_states: Vec<CacheVaryState>,
    cache_key: String,
    etag_key: String,
    workflow: WorkflowKind,
    filters: Vec<Box<dyn ContentFilter>>,
}

impl RequestProcessor {
    /// Prepare a request for a set
    ///
    /// # Arguments
    /// * `version` - Version segment of the requested URL; part of the cache key
    ///
    /// # Returns
    /// * `Err(CombinerError::ResourceSetNotFound)` when the set does not exist
    pub fn new(
        ctx: RequestContext,
        settings: Arc<Settings>,
        set_name: &str,
        version: &str,
    ) -> Result<Self> {
        let set = settings
            .resource_set(set_name)
            .cloned()
            .ok_or_else(|| CombinerError::ResourceSetNotFound(set_name.to_string()))?;

        let compressor = Compressor::negotiate(ctx.accept_encoding(), set.compression_enabled());
        let vary_states = set.cache_vary_states(&ctx);

        let mut segments = vec![
            CACHE_PREFIX,
            PROCESSOR_TAG,
            set.name(),
            version,
            compressor.encoding_name(),
        ];
        segments.extend(vary_states.iter().map(|s| s.key.as_str()));
        let cache_key = segments.join("/");
        let etag_key = format!("{}{}", cache_key, ETAG_SUFFIX);

        let workflow = if set.debug_enabled() {
            WorkflowKind::Debug
        } else {
            WorkflowKind::Default
        };

        let filters = set
            .filters()
            .iter()
            .map(|info| {
                let mut filter = info.instantiate()?;
                filter.set_cache_vary_states(&vary_states);
                Ok(filter)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ctx,
            settings,
            set,
            compressor,
            vary_states,
            cache_key,
            etag_key,
            workflow,
            filters,
        })
    }

    /// Run the selected workflow
    pub async fn execute(
        &self,
        reader: &ContentReader,
        cache: &dyn OutputCache,
    ) -> Result<AssetResponse> {
        match self.workflow {
            WorkflowKind::Default => workflow::run_default(self, reader, cache).await,
            WorkflowKind::Debug => workflow::run_debug(self, reader).await,
        }
    }

    pub fn ctx(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set(&self) -> &ResourceSet {
        &self.set
    }

    pub fn compressor(&self) -> Compressor {
        self.compressor
    }

    pub fn vary_states(&self) -> &[CacheVaryState] {
        &self.vary_states
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn etag_key(&self) -> &str {
        &self.etag_key
    }

    pub fn workflow(&self) -> WorkflowKind {
        self.workflow
    }

    pub fn filters(&self) -> &[Box<dyn ContentFilter>] {
        &self.filters
    }

    pub fn filter_context(&self) -> FilterContext<'_> {
        FilterContext {
            set: &self.set,
            resolver: self.settings.resolver(),
        }
    }

    /// 304 for a still-valid browser copy
    pub fn not_modified(&self, etag: &str) -> AssetResponse {
        let mut headers = HeaderMap::new();
        insert_text(&mut headers, ETAG, etag);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
        AssetResponse {
            status: StatusCode::NOT_MODIFIED,
            headers,
            body: Bytes::new(),
            outcome: RequestOutcome::NotModified,
        }
    }

    /// 200 carrying content, with cache headers when an ETag is given
    pub fn content(&self, body: Bytes, etag: Option<&str>, outcome: RequestOutcome) -> AssetResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(self.set.resource_type().content_type()),
        );
        if let Some(encoding) = self.compressor.content_encoding() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));

        if let Some(etag) = etag {
            let now = Utc::now();
            let max_age = self.set.duration().as_secs();
            let expires = chrono::Duration::from_std(self.set.duration())
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(now);

            insert_text(&mut headers, ETAG, etag);
            insert_text(
                &mut headers,
                CACHE_CONTROL,
                &format!(
                    "public, must-revalidate, proxy-revalidate, max-age={}",
                    max_age
                ),
            );
            insert_text(&mut headers, EXPIRES, &http_date(expires));
            insert_text(&mut headers, LAST_MODIFIED, &http_date(now));
            headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
        }

        AssetResponse {
            status: StatusCode::OK,
            headers,
            body,
            outcome,
        }
    }
}

/// RFC 7231 IMF-fixdate
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn insert_text(headers: &mut HeaderMap, name: http::header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefinitionFile;
    use crate::plugins::PluginRegistry;
    use crate::url::PathResolver;
    use chrono::TimeZone;
    use http::header::{ACCEPT_ENCODING, ACCEPT_LANGUAGE};

    fn settings(yaml: &str) -> Arc<Settings> {
        let def = DefinitionFile::from_yaml(yaml).unwrap();
        let resolver = PathResolver::new("/srv", "http://localhost", "/").unwrap();
        Arc::new(
            Settings::from_definition(&def, &PluginRegistry::with_builtins(), Arc::new(resolver))
                .unwrap(),
        )
    }

    const YAML: &str = r#"
url: /assets
defaults: { version: "3", duration: 2 }
cache_vary_providers:
  - type: header
    resource_sets: [site]
resource_sets:
  - name: site
    type: css
    resources: [ { path: ~/a.css } ]
  - name: debugJs
    type: js
    debug_enabled: true
    compression_enabled: false
    resources: [ { path: ~/a.js } ]
"#;

    fn ctx(encoding: &'static str, language: &'static str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(encoding));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
        RequestContext::new(headers, false)
    }

    #[test]
    fn test_cache_key_layout() {
        let p = RequestProcessor::new(ctx("gzip", "fr"), settings(YAML), "site", "3").unwrap();
        assert_eq!(p.cache_key(), "asset_combiner/RequestProcessor/site/3/gzip/fr");
        assert_eq!(p.etag_key(), "asset_combiner/RequestProcessor/site/3/gzip/fr/@etag");
        assert!(p.cache_key().starts_with(&set_cache_prefix("site")));
        assert_eq!(p.workflow(), WorkflowKind::Default);
    }

    #[test]
    fn test_debug_set_and_disabled_compression() {
        let p = RequestProcessor::new(ctx("gzip", "fr"), settings(YAML), "debugJs", "3").unwrap();
        assert_eq!(p.workflow(), WorkflowKind::Debug);
        assert_eq!(p.compressor(), Compressor::Identity);
        assert_eq!(p.cache_key(), "asset_combiner/RequestProcessor/debugJs/3/identity");
    }

    #[test]
    fn test_unknown_set() {
        let result = RequestProcessor::new(RequestContext::default(), settings(YAML), "nope", "1");
        assert!(matches!(result, Err(CombinerError::ResourceSetNotFound(_))));
    }

    #[test]
    fn test_content_headers() {
        let p = RequestProcessor::new(ctx("gzip", "en"), settings(YAML), "site", "3").unwrap();
        let response = p.content(Bytes::from_static(b"abc"), Some("\"x\""), RequestOutcome::Built);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(response.header("content-encoding"), Some("gzip"));
        assert_eq!(response.header("content-length"), Some("3"));
        assert_eq!(response.header("etag"), Some("\"x\""));
        assert_eq!(
            response.header("cache-control"),
            Some("public, must-revalidate, proxy-revalidate, max-age=172800")
        );
        assert_eq!(response.header("vary"), Some("Accept-Encoding"));
        assert!(response.header("expires").is_some());

        let bare = p.content(Bytes::new(), None, RequestOutcome::Debug);
        assert!(bare.header("etag").is_none());
        assert!(bare.header("cache-control").is_none());
    }

    #[test]
    fn test_not_modified() {
        let p = RequestProcessor::new(ctx("gzip", "en"), settings(YAML), "site", "3").unwrap();
        let response = p.not_modified("\"abc\"");
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());
        assert_eq!(response.header("content-length"), Some("0"));
        assert_eq!(response.header("etag"), Some("\"abc\""));
    }

    #[test]
    fn test_http_date() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(http_date(at), "Tue, 05 Mar 2024 07:08:09 GMT");
    }
}
