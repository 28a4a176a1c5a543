//! Change monitor
//!
//! Detects edits that invalidate built output:
//! - writes to the definition file (a [`ChangeKind::Config`] event)
//! - writes to static resources of auto-versioned sets, via filesystem
//!   notifications on their directories
//! - content changes of dynamic resources of auto-versioned sets, by
//!   polling them at the local and remote intervals of the definition
//!
//! Every detected change is handed to a [`ChangeHandler`]. The monitor
//! never touches the settings snapshot itself.

use crate::content::ContentReader;
use crate::error::{CombinerError, Result};
use crate::resource::{Resource, ResourceMode};
use crate::settings::Settings;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sleep between checks when there is nothing to poll
pub const IDLE_INTERVAL: Duration = Duration::from_secs(5);
/// Polling granularity; intervals are accumulated in these steps
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Config,
    Resource,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Config => write!(f, "config"),
            ChangeKind::Resource => write!(f, "resource"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Declared paths of modified resources; the definition file path for config events
    pub paths: Vec<String>,
}

impl ChangeEvent {
    pub fn config(path: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Config,
            paths: vec![path.into()],
        }
    }

    pub fn resource(paths: Vec<String>) -> Self {
        Self {
            kind: ChangeKind::Resource,
            paths,
        }
    }
}

/// Receives change events, possibly from a watcher thread
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Files the filesystem watcher cares about
#[derive(Debug, Clone, Default)]
pub struct WatchTargets {
    /// Lowercased definition file path
    pub definition: Option<String>,
    /// Lowercased resolved file path and the declared path of each static resource
    pub statics: Vec<(String, String)>,
}

/// Map changed files to events
///
/// Editors that save through a backup copy report `name~`; the trailing
/// `~` is ignored. Matching is case-insensitive.
pub fn classify_event(paths: &[PathBuf], targets: &WatchTargets) -> Vec<ChangeEvent> {
    let mut config = None;
    let mut modified = BTreeSet::new();

    for path in paths {
        let text = path.to_string_lossy();
        let normalized = text.trim_end_matches('~').to_lowercase();
        if targets.definition.as_deref() == Some(normalized.as_str()) {
            config = Some(ChangeEvent::config(text.trim_end_matches('~')));
        }
        for (resolved, declared) in &targets.statics {
            if *resolved == normalized {
                modified.insert(declared.clone());
            }
        }
    }

    let mut events: Vec<ChangeEvent> = config.into_iter().collect();
    if !modified.is_empty() {
        events.push(ChangeEvent::resource(modified.into_iter().collect()));
    }
    events
}

/// What the polling loop works from; replaced on every `watch`
#[derive(Debug, Clone, Default)]
struct MonitorInfo {
    local_interval: Option<Duration>,
    remote_interval: Option<Duration>,
    local_resources: Vec<Resource>,
    remote_resources: Vec<Resource>,
}

impl MonitorInfo {
    fn is_idle(&self) -> bool {
        let local = self.local_interval.is_some() && !self.local_resources.is_empty();
        let remote = self.remote_interval.is_some() && !self.remote_resources.is_empty();
        !local && !remote
    }
}

pub struct ChangeMonitor {
    reader: Arc<ContentReader>,
    handler: ChangeHandler,
    info: RwLock<MonitorInfo>,
    watchers: Mutex<Vec<RecommendedWatcher>>,
    polling_started: AtomicBool,
}

impl ChangeMonitor {
    pub fn new(reader: Arc<ContentReader>, handler: ChangeHandler) -> Self {
        Self {
            reader,
            handler,
            info: RwLock::new(MonitorInfo::default()),
            watchers: Mutex::new(Vec::new()),
            polling_started: AtomicBool::new(false),
        }
    }

    /// Re-arm the monitor against a new snapshot
    ///
    /// Replaces all filesystem watchers and the polling snapshot. A resource
    /// directory that cannot be watched is logged and skipped; failing to
    /// watch the definition file is an error.
    pub fn watch(&self, settings: &Settings, definition_path: &Path) -> Result<()> {
        let resolver = settings.resolver();
        let mut targets = WatchTargets {
            definition: Some(definition_path.to_string_lossy().to_lowercase()),
            statics: Vec::new(),
        };
        let mut directories = BTreeSet::new();
        if let Some(dir) = parent_dir(definition_path) {
            directories.insert(dir);
        }

        let mut seen = HashSet::new();
        let mut info = MonitorInfo {
            local_interval: settings.local_change_monitor_interval(),
            remote_interval: settings.remote_change_monitor_interval(),
            ..MonitorInfo::default()
        };

        for set in settings.resource_sets().iter().filter(|s| s.is_auto_version()) {
            for resource in set.resources() {
                if !seen.insert(resource.key()) {
                    continue;
                }
                match resource.mode() {
                    ResourceMode::Static => {
                        let file = resolver.map_path(resource.path());
                        if let Some(dir) = parent_dir(&file) {
                            directories.insert(dir);
                        }
                        targets.statics.push((
                            file.to_string_lossy().to_lowercase(),
                            resource.path().to_string(),
                        ));
                    }
                    // No request to take cookies from while polling
                    ResourceMode::Dynamic if resource.forward_cookie() => {
                        debug!("Not polling {}: it forwards cookies", resource);
                    }
                    ResourceMode::Dynamic if resource.is_in_same_application() => {
                        info.local_resources.push(resource.clone())
                    }
                    ResourceMode::Dynamic => info.remote_resources.push(resource.clone()),
                }
            }
        }

        let handler = self.handler.clone();
        let watch_targets = targets.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for change in classify_event(&event.paths, &watch_targets) {
                    debug!("Detected {} change: {:?}", change.kind, change.paths);
                    handler(change);
                }
            }
            Err(e) => warn!("File watcher error: {}", e),
        })
        .map_err(|e| CombinerError::MonitorError(format!("Failed to create file watcher: {}", e)))?;

        let definition_dir = parent_dir(definition_path);
        for dir in &directories {
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                if definition_dir.as_ref() == Some(dir) {
                    return Err(CombinerError::MonitorError(format!(
                        "Failed to watch {}: {}",
                        dir.display(),
                        e
                    )));
                }
                warn!("Cannot watch directory {}: {}", dir.display(), e);
            }
        }

        info!(
            "Change monitor armed: {} directories, {} static files, {} local / {} remote dynamic resources",
            directories.len(),
            targets.statics.len(),
            info.local_resources.len(),
            info.remote_resources.len()
        );

        *self.watchers.lock() = vec![watcher];
        *self.info.write() = info;
        Ok(())
    }

    /// Spawn the polling loop; later calls do nothing
    pub fn start_polling(self: &Arc<Self>) {
        if self.polling_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.poll_loop().await });
        info!("Started dynamic resource polling");
    }

    pub fn is_polling(&self) -> bool {
        self.polling_started.load(Ordering::SeqCst)
    }

    async fn poll_loop(&self) {
        let mut local_elapsed = Duration::ZERO;
        let mut remote_elapsed = Duration::ZERO;
        loop {
            let info = self.info.read().clone();
            if info.is_idle() {
                local_elapsed = Duration::ZERO;
                remote_elapsed = Duration::ZERO;
                tokio::time::sleep(IDLE_INTERVAL).await;
                continue;
            }

            tokio::time::sleep(TICK_INTERVAL).await;
            local_elapsed += TICK_INTERVAL;
            remote_elapsed += TICK_INTERVAL;

            let mut changed = Vec::new();
            if let Some(interval) = info.local_interval {
                if local_elapsed >= interval {
                    local_elapsed = Duration::ZERO;
                    changed.extend(self.check_changes(&info.local_resources).await);
                }
            }
            if let Some(interval) = info.remote_interval {
                if remote_elapsed >= interval {
                    remote_elapsed = Duration::ZERO;
                    changed.extend(self.check_changes(&info.remote_resources).await);
                }
            }

            if !changed.is_empty() {
                changed.sort();
                changed.dedup();
                info!("Dynamic resources changed: {:?}", changed);
                (self.handler)(ChangeEvent::resource(changed));
            }
        }
    }

    /// Declared paths of resources whose fresh content differs from the cache
    ///
    /// Resources never read yet are skipped. Fetch failures are logged and
    /// treated as unchanged.
    pub async fn check_changes(&self, resources: &[Resource]) -> Vec<String> {
        let mut changed = Vec::new();
        for resource in resources {
            let Some(cached) = self.reader.cache().get(resource) else {
                continue;
            };
            match self.reader.fetch(resource, None).await {
                Ok(fresh) if fresh != cached => {
                    debug!("Content of {} changed", resource);
                    changed.push(resource.path().to_string());
                }
                Ok(_) => {}
                Err(e) => error!("Failed to poll {}: {}", resource, e),
            }
        }
        changed
    }
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> WatchTargets {
        WatchTargets {
            definition: Some("/srv/app/assets.yaml".to_string()),
            statics: vec![
                ("/srv/app/css/site.css".to_string(), "~/css/site.css".to_string()),
                ("/srv/app/css/site.css".to_string(), "~/CSS/Site.css".to_string()),
                ("/srv/app/js/a.js".to_string(), "~/js/a.js".to_string()),
            ],
        }
    }

    #[test]
    fn test_definition_write_is_config_event() {
        let events = classify_event(&[PathBuf::from("/srv/app/assets.yaml")], &targets());
        assert_eq!(events, vec![ChangeEvent::config("/srv/app/assets.yaml")]);
    }

    #[test]
    fn test_static_write_maps_to_all_declarations() {
        let events = classify_event(&[PathBuf::from("/srv/app/CSS/site.css~")], &targets());
        assert_eq!(
            events,
            vec![ChangeEvent::resource(vec![
                "~/CSS/Site.css".to_string(),
                "~/css/site.css".to_string()
            ])]
        );
    }

    #[test]
    fn test_unrelated_write_ignored() {
        assert!(classify_event(&[PathBuf::from("/srv/app/other.txt")], &targets()).is_empty());
    }

    #[test]
    fn test_idle_info() {
        assert!(MonitorInfo::default().is_idle());
        let info = MonitorInfo {
            local_interval: Some(Duration::from_secs(1)),
            ..MonitorInfo::default()
        };
        assert!(info.is_idle());
    }
}
