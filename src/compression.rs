//! Response compression
//!
//! Compressors are tried in a fixed order (gzip, deflate, identity) against
//! the request's Accept-Encoding; the first one the client accepts wins.

use crate::error::{CombinerError, Result};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compressor {
    Gzip,
    Deflate,
    Identity,
}

impl Compressor {
    /// Preference order
    pub const ALL: [Compressor; 3] = [Compressor::Gzip, Compressor::Deflate, Compressor::Identity];

    /// Pick a compressor for a request
    ///
    /// # Arguments
    /// * `accept_encoding` - Raw Accept-Encoding header, if any
    /// * `enabled` - Whether the resource set allows compression
    pub fn negotiate(accept_encoding: Option<&str>, enabled: bool) -> Compressor {
        if !enabled {
            return Compressor::Identity;
        }
        Self::ALL
            .into_iter()
            .find(|c| c.can_handle(accept_encoding))
            .unwrap_or(Compressor::Identity)
    }

    /// Whether the client accepts this encoding
    ///
    /// Identity is always acceptable. An explicit entry for the coding
    /// decides on its own; `*` only applies to codings not listed. Entries
    /// with `q=0` are refusals.
    pub fn can_handle(&self, accept_encoding: Option<&str>) -> bool {
        let token = match self {
            Compressor::Identity => return true,
            Compressor::Gzip => "gzip",
            Compressor::Deflate => "deflate",
        };
        let Some(header) = accept_encoding else {
            return false;
        };

        let mut wildcard = None;
        for entry in header.split(',') {
            let mut parts = entry.split(';');
            let name = parts.next().unwrap_or("").trim();
            let refused = parts.any(|p| {
                p.trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q <= 0.0)
            });
            if name.eq_ignore_ascii_case(token) {
                return !refused;
            }
            if name == "*" {
                wildcard = Some(!refused);
            }
        }
        wildcard.unwrap_or(false)
    }

    /// Name used in output cache keys
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Compressor::Gzip => "gzip",
            Compressor::Deflate => "deflate",
            Compressor::Identity => "identity",
        }
    }

    /// Value of the Content-Encoding header, `None` for identity
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compressor::Identity => None,
            other => Some(other.encoding_name()),
        }
    }

    pub fn compress(&self, content: &str) -> Result<Vec<u8>> {
        let failed = |e: std::io::Error| {
            CombinerError::CompressionError(format!("{} failed: {}", self.encoding_name(), e))
        };
        match self {
            Compressor::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(content.as_bytes()).map_err(failed)?;
                encoder.finish().map_err(failed)
            }
            Compressor::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(content.as_bytes()).map_err(failed)?;
                encoder.finish().map_err(failed)
            }
            Compressor::Identity => Ok(content.as_bytes().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::decode_body;

    #[test]
    fn test_negotiation_order() {
        assert_eq!(Compressor::negotiate(Some("deflate, gzip"), true), Compressor::Gzip);
        assert_eq!(Compressor::negotiate(Some("deflate"), true), Compressor::Deflate);
        assert_eq!(Compressor::negotiate(Some("br"), true), Compressor::Identity);
        assert_eq!(Compressor::negotiate(None, true), Compressor::Identity);
    }

    #[test]
    fn test_disabled_forces_identity() {
        assert_eq!(Compressor::negotiate(Some("gzip"), false), Compressor::Identity);
    }

    #[test]
    fn test_q_zero_is_refused() {
        assert_eq!(
            Compressor::negotiate(Some("gzip;q=0, deflate;q=0.5"), true),
            Compressor::Deflate
        );
        assert!(Compressor::Gzip.can_handle(Some("*")));
        assert!(!Compressor::Gzip.can_handle(Some("gzip; q=0.0")));
    }

    #[test]
    fn test_explicit_refusal_beats_wildcard() {
        assert!(!Compressor::Gzip.can_handle(Some("gzip;q=0, *")));
        assert!(!Compressor::Gzip.can_handle(Some("*, gzip;q=0")));
        assert!(Compressor::Deflate.can_handle(Some("gzip;q=0, *")));
        assert!(!Compressor::Deflate.can_handle(Some("gzip, *;q=0")));
        assert_eq!(Compressor::negotiate(Some("gzip;q=0, *"), true), Compressor::Deflate);
    }

    #[test]
    fn test_compress_decodes_back() {
        let text = "body{margin:0}";
        for compressor in Compressor::ALL {
            let bytes = compressor.compress(text).unwrap();
            let decoded = decode_body(&bytes, compressor.content_encoding()).unwrap();
            assert_eq!(decoded, text.as_bytes());
        }
        assert_eq!(Compressor::Identity.content_encoding(), None);
        assert_eq!(Compressor::Identity.encoding_name(), "identity");
    }
}
