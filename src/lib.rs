//! Asset Combiner
//!
//! Serves combined, minified and compressed JavaScript and CSS bundles
//! ("resource sets") declared in a YAML definition file.
//!
//! # Overview
//!
//! Each resource set lists static files and dynamic URLs. A request for
//! `{installation}/{set}/{version}/` reads every resource, runs the
//! configured filters, merges consecutive resources sharing a minifier,
//! minifies each group, merges the groups, compresses the result according
//! to `Accept-Encoding`, and caches it. Responses carry long-lived cache
//! headers and an ETag; a matching `If-None-Match` gets a 304.
//!
//! Sets declared with `version: auto` are versioned by a hash of their
//! content. A change monitor watches static files and polls dynamic ones,
//! so that a changed resource yields a new version and a new URL.
//!
//! # Features
//!
//! - **Merge groups**: consecutive resources with the same minifier are minified together
//! - **Pluggable plugins**: filters, minifiers, cache-vary providers and version
//!   generators are resolved by type name from a [`PluginRegistry`]
//! - **Auto versioning**: content hashes recomputed on file or URL changes
//! - **Output cache**: sliding-TTL, size-bounded LRU cache of built bundles
//! - **Debug sets**: fresh, unminified output with a banner per resource
//! - **Metrics**: Prometheus counters and histograms per request outcome
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use asset_combiner::{AssetPipeline, AssetServer, CombinerConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CombinerConfig::from_file("asset_combiner.yaml")?;
//! let pipeline = Arc::new(AssetPipeline::new(config)?);
//! Arc::new(AssetServer::new(pipeline)).start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Definition file
//!
//! ```yaml
//! url: ~/assets
//! defaults:
//!   version: auto
//!   duration: 30                   # days
//! local_change_monitor_interval: 30
//! filters:
//!   - type: fix_urls_in_css
//! resource_sets:
//!   - name: siteCss
//!     type: css
//!     resources:
//!       - path: ~/css/reset.css
//!       - path: ~/css/site.css
//!   - name: siteJs
//!     type: js
//!     resources:
//!       - path: ~/js/app.js
//!       - path: https://cdn.example.com/lib.js
//!         mode: dynamic
//! ```
//!
//! # Architecture
//!
//! - [`AssetPipeline`]: Process-wide context owning every component below
//! - [`SettingsStore`]: Current [`Settings`] snapshot plus buffered change events
//! - [`ChangeMonitor`]: File watcher and dynamic resource poller
//! - [`ContentReader`]: Reads and caches resource content
//! - [`RequestProcessor`]: Per-request compression, keys and workflow choice
//! - [`MemoryOutputCache`]: Built bundles and their ETags
//! - [`PipelineMetrics`]: Prometheus registry
//! - [`AssetServer`]: hyper HTTP front end

pub mod compression;
pub mod config;
pub mod content;
pub mod definition;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod output_cache;
pub mod pipeline;
pub mod plugins;
pub mod processor;
pub mod request;
pub mod resource;
pub mod resource_set;
pub mod server;
pub mod settings;
pub mod store;
pub mod url;
pub mod version;
pub mod workflow;

// Re-export commonly used types
pub use compression::Compressor;
pub use config::CombinerConfig;
pub use content::{ContentCache, ContentReader};
pub use definition::DefinitionFile;
pub use error::{CombinerError, Result};
pub use metrics::{PipelineMetrics, RequestOutcome};
pub use monitor::{ChangeEvent, ChangeKind, ChangeMonitor};
pub use output_cache::{MemoryOutputCache, OutputCache, OutputCacheStats};
pub use pipeline::{AssetPipeline, Reply, Route};
pub use plugins::PluginRegistry;
pub use processor::{AssetResponse, RequestProcessor};
pub use request::RequestContext;
pub use resource::{Resource, ResourceMode, ResourceType};
pub use resource_set::ResourceSet;
pub use server::AssetServer;
pub use settings::Settings;
pub use store::SettingsStore;
pub use url::PathResolver;
pub use version::VersionGenerator;
