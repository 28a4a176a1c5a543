//! Cache-vary providers
//!
//! A provider partitions the output cache by some request property (for
//! example the user's language). Its key is appended to the output cache
//! key and, when `append_key_to_url` is set, to the public URL of the set.

use super::binder::{unknown_param, wrong_type, Configurable, ParamValue};
use crate::definition::ParamDef;
use crate::error::Result;
use crate::request::RequestContext;
use crate::resource_set::ResourceSet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Per-request value produced by a cache-vary provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVaryState {
    pub key: String,
    pub values: BTreeMap<String, String>,
}

impl CacheVaryState {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

pub trait CacheVaryProvider: Configurable + Send + Sync {
    fn build(&self, ctx: &RequestContext, set: &ResourceSet) -> CacheVaryState;

    /// Whether the state key becomes part of the public URL
    fn append_key_to_url(&self) -> bool;
}

/// A configured provider bound to the sets it applies to
pub struct CacheVaryProviderInfo {
    pub type_name: String,
    pub params: Vec<ParamDef>,
    pub resource_sets: Option<Vec<String>>,
    pub provider: Arc<dyn CacheVaryProvider>,
}

impl CacheVaryProviderInfo {
    pub fn accepts_set(&self, set_name: &str) -> bool {
        match &self.resource_sets {
            Some(names) => names.iter().any(|n| n == set_name),
            None => true,
        }
    }

    /// Stable identity folded into auto-version hashes
    pub fn identity(&self) -> String {
        format!("{}({})", self.type_name, ParamDef::signature(&self.params))
    }
}

impl fmt::Debug for CacheVaryProviderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheVaryProviderInfo")
            .field("type_name", &self.type_name)
            .field("resource_sets", &self.resource_sets)
            .finish()
    }
}

/// Varies output by a request header or cookie
///
/// The key is the first entry of the header value (`fr-CA,fr;q=0.8` gives
/// `fr-CA`), reduced to characters safe in a URL path segment. The cookie,
/// when configured and present, wins over the header.
#[derive(Debug, Clone)]
pub struct HeaderCacheVaryProvider {
    header: String,
    cookie: Option<String>,
    value_name: String,
    default_value: String,
    append_key_to_url: bool,
}

impl Default for HeaderCacheVaryProvider {
    fn default() -> Self {
        Self {
            header: "accept-language".to_string(),
            cookie: None,
            value_name: "language".to_string(),
            default_value: "en".to_string(),
            append_key_to_url: true,
        }
    }
}

impl HeaderCacheVaryProvider {
    fn sanitize(raw: &str) -> String {
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect()
    }

    fn resolve(&self, ctx: &RequestContext) -> String {
        let from_cookie = self
            .cookie
            .as_deref()
            .and_then(|name| ctx.cookie(name))
            .map(|v| Self::sanitize(&v));
        let from_header = || {
            ctx.header(&self.header)
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.split(';').next())
                .map(|v| Self::sanitize(v.trim()))
        };
        from_cookie
            .filter(|v| !v.is_empty())
            .or_else(|| from_header().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| self.default_value.clone())
    }
}

impl Configurable for HeaderCacheVaryProvider {
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        const NAME: &str = "HeaderCacheVaryProvider";
        match name {
            "header" => {
                let v = value.as_str().ok_or_else(|| wrong_type(NAME, name, "string"))?;
                self.header = v.to_ascii_lowercase();
            }
            "cookie" => {
                let v = value.as_str().ok_or_else(|| wrong_type(NAME, name, "string"))?;
                self.cookie = Some(v.to_string());
            }
            "value_name" => {
                let v = value.as_str().ok_or_else(|| wrong_type(NAME, name, "string"))?;
                self.value_name = v.to_string();
            }
            "default_value" => {
                let v = value.as_str().ok_or_else(|| wrong_type(NAME, name, "string"))?;
                self.default_value = v.to_string();
            }
            "append_key_to_url" => {
                self.append_key_to_url =
                    value.as_bool().ok_or_else(|| wrong_type(NAME, name, "bool"))?;
            }
            _ => return Err(unknown_param(NAME, name)),
        }
        Ok(())
    }
}

impl CacheVaryProvider for HeaderCacheVaryProvider {
    fn build(&self, ctx: &RequestContext, _set: &ResourceSet) -> CacheVaryState {
        let key = self.resolve(ctx);
        CacheVaryState::new(key.clone()).with_value(self.value_name.clone(), key)
    }

    fn append_key_to_url(&self) -> bool {
        self.append_key_to_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE};

    fn ctx(lang: Option<&'static str>, cookie: Option<&'static str>) -> RequestContext {
        let mut headers = HeaderMap::new();
        if let Some(l) = lang {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(l));
        }
        if let Some(c) = cookie {
            headers.insert(COOKIE, HeaderValue::from_static(c));
        }
        RequestContext::new(headers, false)
    }

    #[test]
    fn test_key_from_accept_language() {
        let provider = HeaderCacheVaryProvider::default();
        assert_eq!(provider.resolve(&ctx(Some("fr-CA,fr;q=0.8"), None)), "fr-CA");
        assert_eq!(provider.resolve(&ctx(Some("de;q=0.9"), None)), "de");
        assert_eq!(provider.resolve(&ctx(None, None)), "en");
    }

    #[test]
    fn test_cookie_wins_over_header() {
        let mut provider = HeaderCacheVaryProvider::default();
        provider
            .set_param("cookie", ParamValue::Str("lang".to_string()))
            .unwrap();
        assert_eq!(provider.resolve(&ctx(Some("fr"), Some("lang=vi"))), "vi");
        assert_eq!(provider.resolve(&ctx(Some("fr"), Some("other=1"))), "fr");
    }

    #[test]
    fn test_key_is_sanitized() {
        let provider = HeaderCacheVaryProvider::default();
        assert_eq!(provider.resolve(&ctx(Some("../../etc"), None)), "etc");
    }

    #[test]
    fn test_unknown_param_rejected() {
        let mut provider = HeaderCacheVaryProvider::default();
        assert!(provider.set_param("bogus", ParamValue::Bool(true)).is_err());
        provider
            .set_param("append_key_to_url", ParamValue::Bool(false))
            .unwrap();
        assert!(!provider.append_key_to_url());
    }
}
