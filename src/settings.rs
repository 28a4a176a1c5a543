//! Settings snapshot
//!
//! A [`Settings`] value is the validated, immutable form of a definition
//! file: every plugin reference resolved against the registry, every
//! resource attached to its set. The settings store swaps whole snapshots;
//! the only thing that changes inside one is each auto-versioned set's hash.

use crate::definition::{DefinitionFile, MinifierDef, ResourceDef, ResourceSetDef};
use crate::error::{CombinerError, Result};
use crate::plugins::cache_vary::CacheVaryProviderInfo;
use crate::plugins::filters::FilterInfo;
use crate::plugins::minifier::{self, MinifierInfo};
use crate::plugins::{PluginRegistry, DEFAULT_VERSION_GENERATOR};
use crate::request::RequestContext;
use crate::resource::{Resource, ResourceMode, ResourceType};
use crate::resource_set::{ResourceSet, ResourceSetOptions};
use crate::url::PathResolver;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache lifetime used when neither the set nor the defaults declare one
pub const DEFAULT_DURATION_DAYS: u32 = 30;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

type MinifierMap = HashMap<String, Arc<MinifierInfo>>;

pub struct Settings {
    url: String,
    host: Option<String>,
    ssl_host: Option<String>,
    local_change_monitor_interval: Option<Duration>,
    remote_change_monitor_interval: Option<Duration>,
    filters: Vec<Arc<FilterInfo>>,
    cache_vary_providers: Vec<Arc<CacheVaryProviderInfo>>,
    js_minifiers: MinifierMap,
    css_minifiers: MinifierMap,
    resource_sets: Vec<Arc<ResourceSet>>,
    resolver: Arc<PathResolver>,
}

impl Settings {
    /// Build and validate a snapshot
    ///
    /// Hashes of auto-versioned sets are left empty; computing them needs
    /// I/O and is done by the settings store right after.
    ///
    /// # Returns
    /// * `Err(CombinerError::ConfigError)` for any unresolvable reference,
    ///   duplicate name, or invalid resource declaration
    pub fn from_definition(
        def: &DefinitionFile,
        registry: &PluginRegistry,
        resolver: Arc<PathResolver>,
    ) -> Result<Settings> {
        let url = def.url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            return Err(CombinerError::ConfigError(
                "Definition url must not be empty".to_string(),
            ));
        }

        let js_minifiers = load_minifiers(&def.js_minifiers, MinifierInfo::default_js(), registry)?;
        let css_minifiers = load_minifiers(&def.css_minifiers, MinifierInfo::default_css(), registry)?;
        let default_js = minifier_ref(def.defaults.js_minifier.as_deref(), &js_minifiers)?;
        let default_css = minifier_ref(def.defaults.css_minifier.as_deref(), &css_minifiers)?;

        let mut filters = Vec::with_capacity(def.filters.len());
        for filter_def in &def.filters {
            let info = FilterInfo::new(
                filter_def.type_name.clone(),
                filter_def.params.clone(),
                filter_def.resource_sets.clone(),
                registry.binder(filter_def.binder.as_deref())?,
                registry.filter(&filter_def.type_name)?,
            );
            // Bind once up front so bad parameters fail the load
            info.instantiate()?;
            filters.push(Arc::new(info));
        }

        let mut cache_vary_providers = Vec::with_capacity(def.cache_vary_providers.len());
        for provider_def in &def.cache_vary_providers {
            let ctor = registry.cache_vary_provider(&provider_def.type_name)?;
            let binder = registry.binder(provider_def.binder.as_deref())?;
            let provider = ctor(&provider_def.params, binder.as_ref())?;
            cache_vary_providers.push(Arc::new(CacheVaryProviderInfo {
                type_name: provider_def.type_name.clone(),
                params: provider_def.params.clone(),
                resource_sets: provider_def.resource_sets.clone(),
                provider,
            }));
        }

        let default_generator = def
            .defaults
            .version_generator
            .as_deref()
            .unwrap_or(DEFAULT_VERSION_GENERATOR);
        let mut settings = Settings {
            url,
            host: def.host.clone(),
            ssl_host: def.ssl_host.clone(),
            local_change_monitor_interval: interval(def.local_change_monitor_interval),
            remote_change_monitor_interval: interval(def.remote_change_monitor_interval),
            filters,
            cache_vary_providers,
            js_minifiers,
            css_minifiers,
            resource_sets: Vec::with_capacity(def.resource_sets.len()),
            resolver,
        };

        for set_def in &def.resource_sets {
            if settings.resource_set(&set_def.name).is_some() {
                return Err(CombinerError::ConfigError(format!(
                    "Duplicated resource set {}",
                    set_def.name
                )));
            }
            let default_minifier = match set_def.resource_type {
                ResourceType::Js => default_js,
                ResourceType::Css => default_css,
            };
            let set = settings.build_set(def, set_def, registry, default_generator, default_minifier)?;
            debug!(
                "Loaded {} with {} resources, {} filters",
                set,
                set.resources().len(),
                set.filters().len()
            );
            settings.resource_sets.push(set);
        }

        Ok(settings)
    }

    fn build_set(
        &self,
        def: &DefinitionFile,
        set_def: &ResourceSetDef,
        registry: &PluginRegistry,
        default_generator: &str,
        default_minifier: &str,
    ) -> Result<Arc<ResourceSet>> {
        let name = set_def.name.trim();
        if name.is_empty() {
            return Err(CombinerError::ConfigError(
                "Resource set name must not be empty".to_string(),
            ));
        }

        let version = set_def
            .version
            .clone()
            .or_else(|| def.defaults.version.clone())
            .ok_or_else(|| {
                CombinerError::ConfigError(format!("Resource set {} has no version", name))
            })?;
        let days = set_def
            .duration
            .or(def.defaults.duration)
            .unwrap_or(DEFAULT_DURATION_DAYS);
        let generator = registry.version_generator(
            set_def
                .version_generator
                .as_deref()
                .unwrap_or(default_generator),
        )?;

        let minifiers = self.minifiers(set_def.resource_type);
        let set_minifier = lookup_minifier(
            set_def.minifier.as_deref().unwrap_or(default_minifier),
            minifiers,
        )?;

        let mut filters = Vec::new();
        for info in &self.filters {
            if info.accepts_set(name) && info.instantiate()?.can_apply_to(set_def.resource_type) {
                filters.push(info.clone());
            }
        }
        let cache_vary_providers = self
            .cache_vary_providers
            .iter()
            .filter(|p| p.accepts_set(name))
            .cloned()
            .collect();

        let mut resources = Vec::new();
        for resource_def in &set_def.resources {
            match &resource_def.reference {
                Some(reference) => {
                    let referenced = self.resource_set(reference).ok_or_else(|| {
                        CombinerError::ConfigError(format!(
                            "Referenced resource set {} must be declared before resource set {}",
                            reference, name
                        ))
                    })?;
                    if referenced.resource_type() != set_def.resource_type {
                        return Err(CombinerError::ConfigError(format!(
                            "Resource set {} ({}) cannot reference {}",
                            name,
                            set_def.resource_type,
                            referenced
                        )));
                    }
                    resources.extend(referenced.resources().iter().cloned());
                }
                None => resources.push(build_resource(resource_def, &set_minifier, minifiers)?),
            }
        }

        let options = ResourceSetOptions {
            name: name.to_string(),
            resource_type: set_def.resource_type,
            version,
            version_generator: generator,
            duration: Duration::from_secs(u64::from(days) * SECONDS_PER_DAY),
            debug_enabled: set_def
                .debug_enabled
                .or(def.defaults.debug_enabled)
                .unwrap_or(false),
            compression_enabled: set_def
                .compression_enabled
                .or(def.defaults.compression_enabled)
                .unwrap_or(true),
            minifier: set_minifier,
            filters,
            cache_vary_providers,
        };
        Ok(ResourceSet::new(options, resources))
    }

    /// Installation URL as declared, without a trailing slash
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request path prefix the sets are served under
    pub fn installation_path(&self) -> String {
        self.resolver
            .resolve_url(&self.url)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn ssl_host(&self) -> Option<&str> {
        self.ssl_host.as_deref()
    }

    /// Polling interval for dynamic resources of this application; `None` disables polling
    pub fn local_change_monitor_interval(&self) -> Option<Duration> {
        self.local_change_monitor_interval
    }

    /// Polling interval for dynamic resources on other hosts; `None` disables polling
    pub fn remote_change_monitor_interval(&self) -> Option<Duration> {
        self.remote_change_monitor_interval
    }

    pub fn filters(&self) -> &[Arc<FilterInfo>] {
        &self.filters
    }

    pub fn cache_vary_providers(&self) -> &[Arc<CacheVaryProviderInfo>] {
        &self.cache_vary_providers
    }

    pub fn minifiers(&self, resource_type: ResourceType) -> &HashMap<String, Arc<MinifierInfo>> {
        match resource_type {
            ResourceType::Js => &self.js_minifiers,
            ResourceType::Css => &self.css_minifiers,
        }
    }

    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    pub fn resource_sets(&self) -> &[Arc<ResourceSet>] {
        &self.resource_sets
    }

    pub fn resource_set(&self, name: &str) -> Option<&Arc<ResourceSet>> {
        self.resource_sets.iter().find(|s| s.name() == name)
    }

    /// Public URL of a set for the given request
    ///
    /// `{url}/{set}/{version}/` followed by the keys of the set's cache-vary
    /// providers that append to the URL, prefixed with the configured host.
    pub fn resource_set_url(&self, name: &str, ctx: &RequestContext) -> Result<String> {
        let set = self
            .resource_set(name)
            .ok_or_else(|| CombinerError::ResourceSetNotFound(name.to_string()))?;

        let keys: Vec<String> = set
            .cache_vary_providers()
            .iter()
            .filter(|info| info.provider.append_key_to_url())
            .map(|info| info.provider.build(ctx, set).key)
            .collect();
        let raw = format!(
            "{}/{}/{}/{}",
            self.url,
            set.name(),
            set.version_string(),
            keys.join("/")
        );
        let relative = self.resolver.resolve_url(&raw);

        let host = if ctx.is_secure() {
            self.ssl_host.as_deref().or(self.host.as_deref())
        } else {
            self.host.as_deref()
        };
        Ok(match host {
            Some(host) => format!("{}{}", host.trim_end_matches('/'), relative),
            None => relative,
        })
    }

    /// Public URL of every set, by name
    pub fn url_map(&self, ctx: &RequestContext) -> Result<BTreeMap<String, String>> {
        self.resource_sets
            .iter()
            .map(|set| Ok((set.name().to_string(), self.resource_set_url(set.name(), ctx)?)))
            .collect()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("url", &self.url)
            .field("host", &self.host)
            .field("ssl_host", &self.ssl_host)
            .field("resource_sets", &self.resource_sets)
            .finish()
    }
}

fn interval(seconds: Option<i64>) -> Option<Duration> {
    seconds
        .filter(|s| *s > 0)
        .map(|s| Duration::from_secs(s.unsigned_abs()))
}

fn load_minifiers(
    defs: &[MinifierDef],
    default: MinifierInfo,
    registry: &PluginRegistry,
) -> Result<MinifierMap> {
    let mut map = MinifierMap::new();
    map.insert(minifier::OFF.to_string(), Arc::new(MinifierInfo::off()));
    map.insert(minifier::DEFAULT.to_string(), Arc::new(default));

    for def in defs {
        if map.contains_key(&def.name) {
            return Err(CombinerError::ConfigError(format!(
                "Minifier {} already exists",
                def.name
            )));
        }
        let info = MinifierInfo::new(
            def.name.clone(),
            def.type_name.clone(),
            def.params.clone(),
            registry.binder(def.binder.as_deref())?,
            registry.minifier(&def.type_name)?,
        );
        info.instantiate()?;
        map.insert(def.name.clone(), Arc::new(info));
    }
    Ok(map)
}

fn minifier_ref<'a>(name: Option<&'a str>, map: &MinifierMap) -> Result<&'a str> {
    let name = name.unwrap_or(minifier::DEFAULT);
    lookup_minifier(name, map)?;
    Ok(name)
}

fn lookup_minifier(name: &str, map: &MinifierMap) -> Result<Arc<MinifierInfo>> {
    map.get(name)
        .cloned()
        .ok_or_else(|| CombinerError::ConfigError(format!("Minifier {} is not declared", name)))
}

fn build_resource(
    def: &ResourceDef,
    set_minifier: &Arc<MinifierInfo>,
    minifiers: &MinifierMap,
) -> Result<Resource> {
    let path = def.path.as_deref().ok_or_else(|| {
        CombinerError::ConfigError("Resource needs either a path or a reference".to_string())
    })?;
    let minifier = match def.minifier.as_deref() {
        Some(name) => lookup_minifier(name, minifiers)?,
        None => set_minifier.clone(),
    };
    Resource::new(
        path.trim(),
        def.mode.unwrap_or(ResourceMode::Static),
        def.forward_cookie.unwrap_or(false),
        minifier,
    )
}
