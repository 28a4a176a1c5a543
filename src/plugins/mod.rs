//! Plugin registry
//!
//! Filters, minifiers, cache-vary providers, version generators and
//! binders are looked up by the type identifier used in the definition file.
//! Each entry is a factory; parameters are bound onto a fresh instance with
//! the declared binder every time an instance is created.
//!
//! Built-in type identifiers:
//!
//! | kind               | identifiers                                     |
//! |--------------------|-------------------------------------------------|
//! | filter             | `fix_urls_in_css`, `css_variables`, `banner`    |
//! | minifier           | `null`, `oxc_js`, `lightningcss`                |
//! | cache-vary provider| `header`                                        |
//! | version generator  | `hash_code`, `sha512`                           |
//! | binder             | `simple`                                        |

pub mod binder;
pub mod cache_vary;
pub mod filters;
pub mod minifier;

use crate::definition::ParamDef;
use crate::error::{CombinerError, Result};
use crate::version::{HashCodeVersionGenerator, Sha512VersionGenerator, VersionGenerator};
use binder::{ObjectBinder, SimpleObjectBinder};
use cache_vary::{CacheVaryProvider, HeaderCacheVaryProvider};
use filters::{BannerFilter, ContentFilter, CssVariablesFilter, FixUrlsInCssFilter};
use minifier::{LightningCssMinifier, Minifier, NullMinifier, OxcJsMinifier};
use std::collections::HashMap;
use std::sync::Arc;

/// Creates a bound filter instance
pub type FilterCtor =
    Arc<dyn Fn(&[ParamDef], &dyn ObjectBinder) -> Result<Box<dyn ContentFilter>> + Send + Sync>;

/// Creates a bound minifier instance
pub type MinifierCtor =
    Arc<dyn Fn(&[ParamDef], &dyn ObjectBinder) -> Result<Box<dyn Minifier>> + Send + Sync>;

/// Creates a bound cache-vary provider
pub type ProviderCtor = Arc<
    dyn Fn(&[ParamDef], &dyn ObjectBinder) -> Result<Arc<dyn CacheVaryProvider>> + Send + Sync,
>;

/// Type identifier of the default version generator
pub const DEFAULT_VERSION_GENERATOR: &str = "hash_code";
/// Type identifier of the default binder
pub const DEFAULT_BINDER: &str = "simple";

pub struct PluginRegistry {
    filters: HashMap<String, FilterCtor>,
    minifiers: HashMap<String, MinifierCtor>,
    cache_vary_providers: HashMap<String, ProviderCtor>,
    version_generators: HashMap<String, Arc<dyn VersionGenerator>>,
    binders: HashMap<String, Arc<dyn ObjectBinder>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PluginRegistry {
    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
            minifiers: HashMap::new(),
            cache_vary_providers: HashMap::new(),
            version_generators: HashMap::new(),
            binders: HashMap::new(),
        }
    }

    /// Registry with every built-in plugin registered
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        registry.register_filter("fix_urls_in_css", || FixUrlsInCssFilter);
        registry.register_filter("css_variables", || CssVariablesFilter);
        registry.register_filter("banner", BannerFilter::default);

        registry.register_minifier("null", || NullMinifier);
        registry.register_minifier("oxc_js", OxcJsMinifier::default);
        registry.register_minifier("lightningcss", || LightningCssMinifier);

        registry.register_cache_vary_provider("header", HeaderCacheVaryProvider::default);

        registry.register_version_generator("hash_code", Arc::new(HashCodeVersionGenerator));
        registry.register_version_generator("sha512", Arc::new(Sha512VersionGenerator));

        registry.register_binder(DEFAULT_BINDER, Arc::new(SimpleObjectBinder));
        registry
    }

    pub fn register_filter<T, F>(&mut self, type_name: &str, factory: F)
    where
        T: ContentFilter + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let ctor: FilterCtor = Arc::new(move |params: &[ParamDef], binder: &dyn ObjectBinder| {
            let mut instance = factory();
            binder.bind(params, &mut instance)?;
            Ok(Box::new(instance) as Box<dyn ContentFilter>)
        });
        self.filters.insert(type_name.to_string(), ctor);
    }

    pub fn register_minifier<T, F>(&mut self, type_name: &str, factory: F)
    where
        T: Minifier + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let ctor: MinifierCtor = Arc::new(move |params: &[ParamDef], binder: &dyn ObjectBinder| {
            let mut instance = factory();
            binder.bind(params, &mut instance)?;
            Ok(Box::new(instance) as Box<dyn Minifier>)
        });
        self.minifiers.insert(type_name.to_string(), ctor);
    }

    pub fn register_cache_vary_provider<T, F>(&mut self, type_name: &str, factory: F)
    where
        T: CacheVaryProvider + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let ctor: ProviderCtor = Arc::new(move |params: &[ParamDef], binder: &dyn ObjectBinder| {
            let mut instance = factory();
            binder.bind(params, &mut instance)?;
            Ok(Arc::new(instance) as Arc<dyn CacheVaryProvider>)
        });
        self.cache_vary_providers.insert(type_name.to_string(), ctor);
    }

    pub fn register_version_generator(&mut self, type_name: &str, generator: Arc<dyn VersionGenerator>) {
        self.version_generators.insert(type_name.to_string(), generator);
    }

    pub fn register_binder(&mut self, type_name: &str, binder: Arc<dyn ObjectBinder>) {
        self.binders.insert(type_name.to_string(), binder);
    }

    pub fn filter(&self, type_name: &str) -> Result<FilterCtor> {
        self.filters
            .get(type_name)
            .cloned()
            .ok_or_else(|| not_found("Filter", type_name))
    }

    pub fn minifier(&self, type_name: &str) -> Result<MinifierCtor> {
        self.minifiers
            .get(type_name)
            .cloned()
            .ok_or_else(|| not_found("Minifier", type_name))
    }

    pub fn cache_vary_provider(&self, type_name: &str) -> Result<ProviderCtor> {
        self.cache_vary_providers
            .get(type_name)
            .cloned()
            .ok_or_else(|| not_found("CacheVaryProvider", type_name))
    }

    pub fn version_generator(&self, type_name: &str) -> Result<Arc<dyn VersionGenerator>> {
        self.version_generators
            .get(type_name)
            .cloned()
            .ok_or_else(|| not_found("Generator", type_name))
    }

    /// Binder by identifier; `None` selects the default binder
    pub fn binder(&self, type_name: Option<&str>) -> Result<Arc<dyn ObjectBinder>> {
        let name = type_name.unwrap_or(DEFAULT_BINDER);
        self.binders
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("Binder", name))
    }
}

fn not_found(kind: &str, type_name: &str) -> CombinerError {
    CombinerError::ConfigError(format!("{} type {} cannot be found", kind, type_name))
}
