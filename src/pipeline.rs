//! Asset pipeline
//!
//! [`AssetPipeline`] is the process-wide context object: it owns the
//! settings store, the content reader, the output cache and the metrics,
//! and answers requests routed to it by the HTTP server.

use crate::config::CombinerConfig;
use crate::content::ContentReader;
use crate::error::{CombinerError, Result};
use crate::metrics::{PipelineMetrics, RequestOutcome};
use crate::output_cache::{MemoryOutputCache, OutputCacheStats};
use crate::plugins::PluginRegistry;
use crate::processor::{AssetResponse, RequestProcessor};
use crate::request::RequestContext;
use crate::settings::Settings;
use crate::store::SettingsStore;
use crate::url::PathResolver;
use http::StatusCode;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Where a request path points below the installation URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The installation URL itself
    Index,
    /// `{set}/{version}/{vary keys...}`; the vary keys only make URLs
    /// distinct and are recomputed from the request
    Asset { set: String, version: String },
}

impl Route {
    /// Parse a request path against the installation path
    ///
    /// # Returns
    /// * `None` when the path is outside the installation or lacks a version
    pub fn parse(installation_path: &str, path: &str) -> Option<Route> {
        let rest = path.strip_prefix(installation_path)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }

        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let Some(set) = segments.next() else {
            return Some(Route::Index);
        };
        let version = segments.next()?;
        Some(Route::Asset {
            set: set.to_string(),
            version: version.to_string(),
        })
    }
}

/// What the pipeline answered
#[derive(Debug, Clone)]
pub enum Reply {
    Asset(AssetResponse),
    /// Set name to public URL
    Index(BTreeMap<String, String>),
}

pub struct AssetPipeline {
    config: CombinerConfig,
    reader: Arc<ContentReader>,
    output_cache: Arc<MemoryOutputCache>,
    metrics: Arc<PipelineMetrics>,
    store: SettingsStore,
}

impl AssetPipeline {
    /// Build a pipeline with the built-in plugins
    pub fn new(config: CombinerConfig) -> Result<Self> {
        Self::with_registry(config, PluginRegistry::with_builtins())
    }

    /// Build a pipeline resolving plugin types against `registry`
    ///
    /// Nothing is read from disk here; the definition file is loaded by the
    /// first request, or by [`AssetPipeline::settings`].
    pub fn with_registry(config: CombinerConfig, registry: PluginRegistry) -> Result<Self> {
        config.validate()?;

        let app_root = PathBuf::from(&config.app_root);
        let app_root = std::fs::canonicalize(&app_root).unwrap_or(app_root);
        let resolver = Arc::new(PathResolver::new(
            &app_root,
            &config.base_url,
            &config.virtual_path,
        )?);
        let reader = Arc::new(ContentReader::new(
            resolver.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )?);
        let output_cache = Arc::new(MemoryOutputCache::new(config.output_cache_max_bytes));
        let metrics = Arc::new(PipelineMetrics::new().map_err(|e| {
            CombinerError::InternalError(format!("Failed to register metrics: {}", e))
        })?);

        let store = SettingsStore::new(
            config.definition_path(),
            Arc::new(registry),
            resolver,
            reader.clone(),
            output_cache.clone(),
            metrics.clone(),
            config.proactive_output_invalidation,
        );

        Ok(Self {
            config,
            reader,
            output_cache,
            metrics,
            store,
        })
    }

    pub fn config(&self) -> &CombinerConfig {
        &self.config
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn reader(&self) -> &Arc<ContentReader> {
        &self.reader
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn output_cache_stats(&self) -> OutputCacheStats {
        self.output_cache.get_stats()
    }

    /// Current settings, loading them if needed
    pub async fn settings(&self, ctx: Option<&RequestContext>) -> Result<Arc<Settings>> {
        self.store.get_settings(ctx).await
    }

    /// Answer a request for any path below the installation URL
    pub async fn handle(&self, path: &str, ctx: RequestContext) -> Reply {
        let settings = match self.store.get_settings(Some(&ctx)).await {
            Ok(settings) => settings,
            Err(e) => return Reply::Asset(self.finish(Err(e), path, Instant::now())),
        };

        match Route::parse(&settings.installation_path(), path) {
            Some(Route::Index) => match settings.url_map(&ctx) {
                Ok(map) => Reply::Index(map),
                Err(e) => {
                    error!("Failed to build resource set index: {}", e);
                    Reply::Asset(AssetResponse::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        RequestOutcome::Error,
                    ))
                }
            },
            Some(Route::Asset { set, version }) => {
                Reply::Asset(self.serve(ctx, &set, &version).await)
            }
            None => {
                debug!("No route for {}", path);
                Reply::Asset(AssetResponse::error(
                    StatusCode::NOT_FOUND,
                    RequestOutcome::NotFound,
                ))
            }
        }
    }

    /// Produce the content of one resource set
    ///
    /// Never fails: errors become 404 or 500 responses, and every call is
    /// counted in the metrics under its outcome.
    pub async fn serve(&self, ctx: RequestContext, set_name: &str, version: &str) -> AssetResponse {
        let started = Instant::now();
        let result = self.process(ctx, set_name, version).await;
        self.finish(result, set_name, started)
    }

    async fn process(
        &self,
        ctx: RequestContext,
        set_name: &str,
        version: &str,
    ) -> Result<AssetResponse> {
        let settings = self.store.get_settings(Some(&ctx)).await?;
        let processor = RequestProcessor::new(ctx, settings, set_name, version)?;
        processor
            .execute(&self.reader, self.output_cache.as_ref())
            .await
    }

    fn finish(&self, result: Result<AssetResponse>, target: &str, started: Instant) -> AssetResponse {
        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                warn!("Cannot serve {}: {}", target, e);
                AssetResponse::error(StatusCode::NOT_FOUND, RequestOutcome::NotFound)
            }
            Err(e) => {
                error!("Failed to serve {}: {}", target, e);
                let status = StatusCode::from_u16(e.to_http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                AssetResponse::error(status, RequestOutcome::Error)
            }
        };

        let elapsed = started.elapsed();
        debug!(
            "Request for {} finished: outcome={} status={} duration={:?}",
            target,
            response.outcome,
            response.status.as_u16(),
            elapsed
        );
        self.metrics
            .record_request(response.outcome, elapsed.as_secs_f64());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_asset() {
        assert_eq!(
            Route::parse("/assets", "/assets/siteJs/3/fr-FR"),
            Some(Route::Asset {
                set: "siteJs".to_string(),
                version: "3".to_string()
            })
        );
        assert_eq!(
            Route::parse("/assets", "/assets/siteCss/ab12/"),
            Some(Route::Asset {
                set: "siteCss".to_string(),
                version: "ab12".to_string()
            })
        );
    }

    #[test]
    fn test_route_index() {
        assert_eq!(Route::parse("/assets", "/assets"), Some(Route::Index));
        assert_eq!(Route::parse("/assets", "/assets/"), Some(Route::Index));
        assert_eq!(Route::parse("", "/"), Some(Route::Index));
    }

    #[test]
    fn test_route_rejects() {
        assert_eq!(Route::parse("/assets", "/other/siteJs/1"), None);
        assert_eq!(Route::parse("/assets", "/assetsX/siteJs/1"), None);
        assert_eq!(Route::parse("/assets", "/assets/siteJs"), None);
    }
}
