//! Per-request context handed to cache-vary providers and the content reader

use http::header::{HeaderMap, ACCEPT_ENCODING, COOKIE, IF_NONE_MATCH};

/// The parts of an incoming request the pipeline needs
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    secure: bool,
}

impl RequestContext {
    /// Create a context from request headers
    ///
    /// # Arguments
    /// * `headers` - Headers of the incoming request
    /// * `secure` - Whether the request arrived over TLS
    pub fn new(headers: HeaderMap, secure: bool) -> Self {
        Self { headers, secure }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Header value as text, `None` when absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn accept_encoding(&self) -> Option<&str> {
        self.headers.get(ACCEPT_ENCODING).and_then(|v| v.to_str().ok())
    }

    pub fn if_none_match(&self) -> Option<&str> {
        self.headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok())
    }

    /// Raw Cookie header, forwarded verbatim to dynamic resources
    pub fn cookie_header(&self) -> Option<&str> {
        self.headers.get(COOKIE).and_then(|v| v.to_str().ok())
    }

    /// Value of a single cookie
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| k.trim() == name)
            .map(|(_, v)| v.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; lang=fr ; b=2"));
        let ctx = RequestContext::new(headers, false);

        assert_eq!(ctx.cookie("lang").as_deref(), Some("fr"));
        assert_eq!(ctx.cookie("b").as_deref(), Some("2"));
        assert_eq!(ctx.cookie("missing"), None);
        assert_eq!(ctx.cookie_header(), Some("a=1; lang=fr ; b=2"));
    }

    #[test]
    fn test_standard_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        headers.insert(IF_NONE_MATCH, HeaderValue::from_static("\"abc\""));
        let ctx = RequestContext::new(headers, true);

        assert_eq!(ctx.accept_encoding(), Some("gzip, deflate"));
        assert_eq!(ctx.if_none_match(), Some("\"abc\""));
        assert!(ctx.is_secure());
        assert!(RequestContext::default().accept_encoding().is_none());
    }
}
