//! Settings store
//!
//! Holds the current [`Settings`] snapshot and applies change events to it.
//! Events from the change monitor are only buffered when they arrive; they
//! are applied by the next [`SettingsStore::get_settings`] call, on the
//! request path, with that request's context available.
//!
//! Lock discipline: the snapshot pointer and the pending buffer each have
//! their own short-lived lock, and neither is held across an `.await`.
//! Hash recomputation of one set is serialized by that set's own mutex.

use crate::content::ContentReader;
use crate::definition::DefinitionFile;
use crate::error::{CombinerError, Result};
use crate::metrics::PipelineMetrics;
use crate::monitor::{ChangeEvent, ChangeHandler, ChangeKind, ChangeMonitor};
use crate::output_cache::OutputCache;
use crate::plugins::PluginRegistry;
use crate::processor::{set_cache_prefix, CACHE_PREFIX};
use crate::request::RequestContext;
use crate::resource_set::ResourceSet;
use crate::settings::Settings;
use crate::url::PathResolver;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Changes waiting to be applied
///
/// Holds at most one config change and one resource change; resource
/// paths of later events are merged into the outstanding one.
#[derive(Debug, Default)]
pub struct PendingChanges {
    config: Option<ChangeEvent>,
    resource: Option<ChangeEvent>,
}

impl PendingChanges {
    pub fn push(&mut self, event: ChangeEvent) {
        match event.kind {
            ChangeKind::Config => self.config = Some(event),
            ChangeKind::Resource => match &mut self.resource {
                Some(pending) => {
                    for path in event.paths {
                        if !pending.paths.contains(&path) {
                            pending.paths.push(path);
                        }
                    }
                }
                None => self.resource = Some(event),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.resource.is_none()
    }

    /// Drain the buffer, config change first
    pub fn take(&mut self) -> Vec<ChangeEvent> {
        self.config
            .take()
            .into_iter()
            .chain(self.resource.take())
            .collect()
    }
}

pub struct SettingsStore {
    definition_path: PathBuf,
    registry: Arc<PluginRegistry>,
    resolver: Arc<PathResolver>,
    reader: Arc<ContentReader>,
    output_cache: Arc<dyn OutputCache>,
    metrics: Arc<PipelineMetrics>,
    proactive_invalidation: bool,
    current: RwLock<Option<Arc<Settings>>>,
    pending: Arc<Mutex<PendingChanges>>,
    monitor: Arc<ChangeMonitor>,
    init: OnceCell<()>,
}

impl SettingsStore {
    /// Create a store; nothing is loaded until the first `get_settings`
    ///
    /// # Arguments
    /// * `definition_path` - Definition file to load and watch
    /// * `proactive_invalidation` - Drop output cache entries of changed sets
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        definition_path: impl Into<PathBuf>,
        registry: Arc<PluginRegistry>,
        resolver: Arc<PathResolver>,
        reader: Arc<ContentReader>,
        output_cache: Arc<dyn OutputCache>,
        metrics: Arc<PipelineMetrics>,
        proactive_invalidation: bool,
    ) -> Self {
        let definition_path = definition_path.into();
        let definition_path = std::fs::canonicalize(&definition_path).unwrap_or(definition_path);

        let pending = Arc::new(Mutex::new(PendingChanges::default()));
        let handler: ChangeHandler = {
            let pending = pending.clone();
            Arc::new(move |event: ChangeEvent| {
                debug!("Queued {} change: {:?}", event.kind, event.paths);
                pending.lock().push(event);
            })
        };
        let monitor = Arc::new(ChangeMonitor::new(reader.clone(), handler));

        Self {
            definition_path,
            registry,
            resolver,
            reader,
            output_cache,
            metrics,
            proactive_invalidation,
            current: RwLock::new(None),
            pending,
            monitor,
            init: OnceCell::new(),
        }
    }

    pub fn definition_path(&self) -> &Path {
        &self.definition_path
    }

    pub fn monitor(&self) -> &Arc<ChangeMonitor> {
        &self.monitor
    }

    /// Snapshot currently published, if any load succeeded yet
    pub fn current(&self) -> Option<Arc<Settings>> {
        self.current.read().clone()
    }

    /// Queue a change for the next `get_settings` call
    pub fn push_change(&self, event: ChangeEvent) {
        self.pending.lock().push(event);
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Current snapshot, loading it on first use and applying queued changes
    ///
    /// The first call loads the definition file, computes the hashes of
    /// auto-versioned sets, arms the change monitor and starts polling.
    pub async fn get_settings(&self, ctx: Option<&RequestContext>) -> Result<Arc<Settings>> {
        self.init.get_or_try_init(|| self.initialize(ctx)).await?;
        self.apply_pending(ctx).await;
        self.current().ok_or_else(|| {
            CombinerError::InternalError("Settings are not loaded".to_string())
        })
    }

    async fn initialize(&self, ctx: Option<&RequestContext>) -> Result<()> {
        let settings = self.load(ctx).await?;
        self.publish(settings.clone());
        if let Err(e) = self.monitor.watch(&settings, &self.definition_path) {
            error!("Change monitor could not be armed: {}", e);
        }
        self.monitor.start_polling();
        Ok(())
    }

    async fn load(&self, ctx: Option<&RequestContext>) -> Result<Arc<Settings>> {
        let def = DefinitionFile::from_file(&self.definition_path)?;
        let settings = Arc::new(Settings::from_definition(
            &def,
            &self.registry,
            self.resolver.clone(),
        )?);
        for set in settings.resource_sets().iter().filter(|s| s.is_auto_version()) {
            set.rehash(&self.reader, ctx).await?;
            self.metrics.record_rehash();
        }
        info!(
            "Loaded {} resource sets from {}",
            settings.resource_sets().len(),
            self.definition_path.display()
        );
        Ok(settings)
    }

    fn publish(&self, settings: Arc<Settings>) {
        *self.current.write() = Some(settings);
    }

    async fn apply_pending(&self, ctx: Option<&RequestContext>) {
        let changes = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return;
            }
            pending.take()
        };

        for change in changes {
            debug!("Applying {} change: {:?}", change.kind, change.paths);
            self.metrics.record_change(change.kind);
            match change.kind {
                ChangeKind::Config => self.reload(ctx).await,
                ChangeKind::Resource => self.apply_resource_change(&change.paths, ctx).await,
            }
        }
    }

    async fn reload(&self, ctx: Option<&RequestContext>) {
        self.reader.clear_cache();
        match self.load(ctx).await {
            Ok(settings) => {
                self.publish(settings.clone());
                if let Err(e) = self.monitor.watch(&settings, &self.definition_path) {
                    error!("Change monitor could not be re-armed: {}", e);
                }
                if self.proactive_invalidation {
                    let removed = self.output_cache.remove_prefix(CACHE_PREFIX).await;
                    debug!("Dropped {} output cache entries after reload", removed);
                }
                info!("Reloaded settings from {}", self.definition_path.display());
            }
            Err(e) => error!(
                "Failed to reload {}, keeping previous settings: {}",
                self.definition_path.display(),
                e
            ),
        }
    }

    async fn apply_resource_change(&self, paths: &[String], ctx: Option<&RequestContext>) {
        let Some(settings) = self.current() else {
            return;
        };
        let affected: Vec<&Arc<ResourceSet>> = settings
            .resource_sets()
            .iter()
            .filter(|set| set.is_auto_version() && paths.iter().any(|p| set.contains_path(p)))
            .collect();

        for set in &affected {
            for resource in set.resources() {
                if paths.iter().any(|p| p.eq_ignore_ascii_case(resource.path())) {
                    self.reader.remove_in_cache(resource);
                }
            }
        }

        for set in affected {
            match set.rehash(&self.reader, ctx).await {
                Ok(hash) => {
                    self.metrics.record_rehash();
                    info!("{} changed, new hash {}", set, hash);
                }
                Err(e) => warn!("Failed to recompute hash of {}: {}", set, e),
            }
            if self.proactive_invalidation {
                let removed = self
                    .output_cache
                    .remove_prefix(&set_cache_prefix(set.name()))
                    .await;
                debug!("Dropped {} output cache entries of {}", removed, set);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_merges_resource_paths() {
        let mut pending = PendingChanges::default();
        pending.push(ChangeEvent::resource(vec!["~/a.css".to_string()]));
        pending.push(ChangeEvent::resource(vec![
            "~/a.css".to_string(),
            "~/b.css".to_string(),
        ]));
        pending.push(ChangeEvent::config("/srv/defs.yaml"));
        pending.push(ChangeEvent::config("/srv/defs.yaml"));

        let changes = pending.take();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, ChangeKind::Config);
        assert_eq!(changes[1].paths, vec!["~/a.css".to_string(), "~/b.css".to_string()]);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_empty_take() {
        let mut pending = PendingChanges::default();
        assert!(pending.take().is_empty());
    }
}
