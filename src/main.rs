//! Asset Combiner Server
//!
//! Loads the server configuration, sets up logging, and serves resource
//! sets over HTTP.

use anyhow::Context;
use asset_combiner::{AssetPipeline, AssetServer, CombinerConfig};
use std::env;
use std::sync::Arc;
use tracing::info;

/// Main entry point for the asset combiner server
///
/// # Usage
/// ```bash
/// # Start with default config (asset_combiner.yaml)
/// asset-combiner
///
/// # Start with custom config
/// asset-combiner /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "asset_combiner.yaml".to_string());

    let config = CombinerConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Asset Combiner Server");
    info!("Configuration loaded from: {}", config_path);
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Definition file: {}", config.definition_path().display());
    info!("  - Application root: {}", config.app_root);
    info!("  - Base URL: {}", config.base_url);
    info!("  - Output cache: {} KB", config.output_cache_max_bytes / 1024);
    info!("  - Proactive invalidation: {}", config.proactive_output_invalidation);
    info!("  - Metrics enabled: {}", config.enable_metrics);

    let pipeline = Arc::new(AssetPipeline::new(config).context("Failed to create pipeline")?);

    // Fail fast on an invalid definition file instead of on the first request
    let settings = pipeline
        .settings(None)
        .await
        .context("Failed to load resource set definitions")?;
    info!(
        "Serving {} resource sets under {}",
        settings.resource_sets().len(),
        settings.installation_path()
    );

    Arc::new(AssetServer::new(pipeline))
        .start()
        .await
        .context("Server stopped")?;
    Ok(())
}
