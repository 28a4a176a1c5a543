//! Resource sets
//!
//! A set is immutable once built, with one exception: the auto-version
//! [`HashCell`]. Recomputing a hash after a resource edit replaces only that
//! cell instead of reloading the whole settings snapshot.

use crate::content::ContentReader;
use crate::error::Result;
use crate::plugins::cache_vary::{CacheVaryProviderInfo, CacheVaryState};
use crate::plugins::filters::FilterInfo;
use crate::plugins::minifier::MinifierInfo;
use crate::request::RequestContext;
use crate::resource::{Resource, ResourceType};
use crate::version::{self, VersionGenerator};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Version value selecting content-derived versioning
pub const AUTO_VERSION: &str = "auto";

/// The mutable fingerprint of an auto-versioned set
#[derive(Debug, Default)]
pub struct HashCell(RwLock<String>);

impl HashCell {
    pub fn get(&self) -> String {
        self.0.read().clone()
    }

    pub fn set(&self, hash: String) {
        *self.0.write() = hash;
    }
}

/// Everything a set is built from, except its resources
pub struct ResourceSetOptions {
    pub name: String,
    pub resource_type: ResourceType,
    pub version: String,
    pub version_generator: Arc<dyn VersionGenerator>,
    pub duration: Duration,
    pub debug_enabled: bool,
    pub compression_enabled: bool,
    pub minifier: Arc<MinifierInfo>,
    pub filters: Vec<Arc<FilterInfo>>,
    pub cache_vary_providers: Vec<Arc<CacheVaryProviderInfo>>,
}

pub struct ResourceSet {
    name: String,
    resource_type: ResourceType,
    version: String,
    version_generator: Arc<dyn VersionGenerator>,
    duration: Duration,
    debug_enabled: bool,
    compression_enabled: bool,
    minifier: Arc<MinifierInfo>,
    filters: Vec<Arc<FilterInfo>>,
    cache_vary_providers: Vec<Arc<CacheVaryProviderInfo>>,
    resources: Vec<Resource>,
    hash: HashCell,
    rehash_lock: tokio::sync::Mutex<()>,
}

impl ResourceSet {
    /// Build a set and attach the given resources to it, in order
    ///
    /// The hash of an auto-versioned set starts empty; call [`ResourceSet::rehash`].
    pub fn new(options: ResourceSetOptions, resources: Vec<Resource>) -> Arc<ResourceSet> {
        Arc::new_cyclic(|weak| ResourceSet {
            name: options.name,
            resource_type: options.resource_type,
            version: options.version,
            version_generator: options.version_generator,
            duration: options.duration,
            debug_enabled: options.debug_enabled,
            compression_enabled: options.compression_enabled,
            minifier: options.minifier,
            filters: options.filters,
            cache_vary_providers: options.cache_vary_providers,
            resources: resources.iter().map(|r| r.attach(weak.clone())).collect(),
            hash: HashCell::default(),
            rehash_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Declared version string (`auto` for content-derived versioning)
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn version_generator(&self) -> &Arc<dyn VersionGenerator> {
        &self.version_generator
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_enabled
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    pub fn minifier(&self) -> &Arc<MinifierInfo> {
        &self.minifier
    }

    pub fn filters(&self) -> &[Arc<FilterInfo>] {
        &self.filters
    }

    pub fn cache_vary_providers(&self) -> &[Arc<CacheVaryProviderInfo>] {
        &self.cache_vary_providers
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn hash(&self) -> &HashCell {
        &self.hash
    }

    pub fn is_auto_version(&self) -> bool {
        self.version.eq_ignore_ascii_case(AUTO_VERSION)
    }

    /// Version token used in public URLs
    pub fn version_string(&self) -> String {
        if self.is_auto_version() {
            self.hash.get()
        } else {
            self.version.clone()
        }
    }

    /// Whether any resource of this set has the given declared path
    pub fn contains_path(&self, path: &str) -> bool {
        self.resources
            .iter()
            .any(|r| r.path().eq_ignore_ascii_case(path))
    }

    /// States of every cache-vary provider attached to this set, in order
    pub fn cache_vary_states(&self, ctx: &RequestContext) -> Vec<CacheVaryState> {
        self.cache_vary_providers
            .iter()
            .map(|info| info.provider.build(ctx, self))
            .collect()
    }

    /// Recompute the auto-version hash and store it
    ///
    /// Recomputations of the same set are serialized, so a slower run can
    /// never overwrite the result of a run that read newer content.
    pub async fn rehash(&self, reader: &ContentReader, ctx: Option<&RequestContext>) -> Result<String> {
        let _guard = self.rehash_lock.lock().await;
        let hash = version::compute_hash(self, reader, ctx).await?;
        debug!("Computed hash for set={}: {}", self.name, hash);
        self.hash.set(hash.clone());
        Ok(hash)
    }
}

impl fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("name", &self.name)
            .field("type", &self.resource_type)
            .field("version", &self.version)
            .field("resources", &self.resources.len())
            .finish()
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource Set '{}' (Type: {})", self.name, self.resource_type)
    }
}
