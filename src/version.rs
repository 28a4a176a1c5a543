//! Version/hash engine
//!
//! An auto-versioned set is fingerprinted over everything that affects its
//! output: the debug flag, the identities of its filters and cache-vary
//! providers, and for each resource its content, cookie flag, mode and
//! minifier. The fingerprint ends up in public URLs, so it must be identical
//! across calls and across processes for identical input.

use crate::content::ContentReader;
use crate::error::{CombinerError, Result};
use crate::request::RequestContext;
use crate::resource::ResourceMode;
use crate::resource_set::ResourceSet;
use sha2::{Digest, Sha512};
use xxhash_rust::xxh3::xxh3_64;

/// One resource's contribution to a set fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFactors {
    pub content: String,
    pub forward_cookie: bool,
    pub mode: ResourceMode,
    pub minifier: String,
}

/// Everything a version generator looks at, in hashing order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionInputs {
    pub debug_enabled: bool,
    pub filters: Vec<String>,
    pub cache_vary_providers: Vec<String>,
    pub resources: Vec<ResourceFactors>,
}

impl VersionInputs {
    /// Factors as text, in the fixed order generators consume them
    pub fn factors(&self) -> Vec<String> {
        let mut factors = Vec::with_capacity(
            1 + self.filters.len() + self.cache_vary_providers.len() + self.resources.len() * 4,
        );
        factors.push(self.debug_enabled.to_string());
        factors.extend(self.filters.iter().cloned());
        factors.extend(self.cache_vary_providers.iter().cloned());
        for resource in &self.resources {
            factors.push(resource.content.clone());
            factors.push(resource.forward_cookie.to_string());
            factors.push(resource.mode.to_string());
            factors.push(resource.minifier.clone());
        }
        factors
    }
}

pub trait VersionGenerator: Send + Sync {
    fn generate(&self, inputs: &VersionInputs) -> String;
}

/// Fast, weak fingerprint: polynomial accumulation of per-factor xxh3 hashes
#[derive(Debug, Default, Clone, Copy)]
pub struct HashCodeVersionGenerator;

impl VersionGenerator for HashCodeVersionGenerator {
    fn generate(&self, inputs: &VersionInputs) -> String {
        let acc = inputs
            .factors()
            .iter()
            .map(|f| xxh3_64(f.as_bytes()))
            .fold(17u64, |acc, h| acc.wrapping_mul(31).wrapping_add(h));
        format!("{:016x}", acc)
    }
}

/// Strong fingerprint: SHA-512 over all factors, hex encoded
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha512VersionGenerator;

impl VersionGenerator for Sha512VersionGenerator {
    fn generate(&self, inputs: &VersionInputs) -> String {
        let mut hasher = Sha512::new();
        for factor in inputs.factors() {
            hasher.update(factor.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Lowercase hex SHA-512 of arbitrary bytes, used for non-auto ETags
pub fn sha512_hex(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}

/// Gather the inputs of a set, reading resource content through the cache
pub async fn collect_inputs(
    set: &ResourceSet,
    reader: &ContentReader,
    ctx: Option<&RequestContext>,
) -> Result<VersionInputs> {
    let mut resources = Vec::with_capacity(set.resources().len());
    for resource in set.resources() {
        let content = reader
            .read_from_cache(resource, true, ctx)
            .await?
            .ok_or_else(|| {
                CombinerError::InternalError(format!("No content read for {}", resource))
            })?;
        resources.push(ResourceFactors {
            content,
            forward_cookie: resource.forward_cookie(),
            mode: resource.mode(),
            minifier: resource.minifier().identity(),
        });
    }

    Ok(VersionInputs {
        debug_enabled: set.debug_enabled(),
        filters: set.filters().iter().map(|f| f.identity()).collect(),
        cache_vary_providers: set
            .cache_vary_providers()
            .iter()
            .map(|p| p.identity())
            .collect(),
        resources,
    })
}

/// Fingerprint a set with its configured generator
pub async fn compute_hash(
    set: &ResourceSet,
    reader: &ContentReader,
    ctx: Option<&RequestContext>,
) -> Result<String> {
    let inputs = collect_inputs(set, reader, ctx).await?;
    Ok(set.version_generator().generate(&inputs))
}
