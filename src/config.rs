//! Server configuration for the asset combiner
//!
//! This is the process-level configuration (where to listen, where the
//! definition file lives, how to resolve app-relative paths). The resource
//! set declarations themselves live in the definition file, see
//! [`crate::definition`].

use crate::error::{CombinerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Configuration for the asset combiner server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinerConfig {
    /// Address the HTTP server binds to (default: 127.0.0.1:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path to the YAML definition file declaring resource sets
    #[serde(default = "default_definition_file")]
    pub definition_file: String,

    /// Directory that `~/` app-relative resource paths resolve against (default: ".")
    #[serde(default = "default_app_root")]
    pub app_root: String,

    /// Public base URL of the application, used to turn `~/` dynamic
    /// resources into absolute URLs (default: http://127.0.0.1:8080)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Virtual path the application is mounted under (default: "/")
    #[serde(default = "default_virtual_path")]
    pub virtual_path: String,

    /// Timeout in seconds for fetching dynamic resources (default: 10)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Maximum size in bytes of the output cache (default: 64MB)
    #[serde(default = "default_output_cache_size")]
    pub output_cache_max_bytes: usize,

    /// Evict output cache entries of a set as soon as one of its resources
    /// changes, instead of letting them age out (default: false)
    #[serde(default)]
    pub proactive_output_invalidation: bool,

    /// Whether to expose Prometheus metrics at /metrics (default: true)
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Log level for the tracing subscriber (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_definition_file() -> String {
    "asset_definitions.yaml".to_string()
}

fn default_app_root() -> String {
    ".".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_virtual_path() -> String {
    "/".to_string()
}

fn default_http_timeout() -> u64 {
    10
}

fn default_output_cache_size() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CombinerConfig {
    fn default() -> Self {
        CombinerConfig {
            listen_address: default_listen_address(),
            definition_file: default_definition_file(),
            app_root: default_app_root(),
            base_url: default_base_url(),
            virtual_path: default_virtual_path(),
            http_timeout_secs: default_http_timeout(),
            output_cache_max_bytes: default_output_cache_size(),
            proactive_output_invalidation: false,
            enable_metrics: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl CombinerConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(CombinerConfig)` if loading and validation succeed
    /// * `Err(CombinerError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CombinerError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: CombinerConfig = serde_yaml::from_str(&content).map_err(|e| {
            CombinerError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must be a socket address
    /// - base_url must be an absolute http(s) URL
    /// - definition_file must not be empty
    /// - http_timeout_secs and output_cache_max_bytes must be > 0
    /// - log_level must name a tracing level
    pub fn validate(&self) -> Result<()> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            CombinerError::ConfigError(format!(
                "listen_address '{}' is not a socket address: {}",
                self.listen_address, e
            ))
        })?;

        let base = reqwest::Url::parse(&self.base_url).map_err(|e| {
            CombinerError::ConfigError(format!("base_url '{}' is invalid: {}", self.base_url, e))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(CombinerError::ConfigError(format!(
                "base_url must use http or https, got '{}'",
                base.scheme()
            )));
        }

        if self.definition_file.trim().is_empty() {
            return Err(CombinerError::ConfigError(
                "definition_file must not be empty".to_string(),
            ));
        }

        if self.http_timeout_secs == 0 {
            return Err(CombinerError::ConfigError(
                "http_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.output_cache_max_bytes == 0 {
            return Err(CombinerError::ConfigError(
                "output_cache_max_bytes must be greater than 0".to_string(),
            ));
        }

        self.log_level.parse::<tracing::Level>().map_err(|_| {
            CombinerError::ConfigError(format!("Invalid log_level '{}'", self.log_level))
        })?;

        Ok(())
    }

    /// Parsed log level, falling back to INFO
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Definition file path, resolved against `app_root` when relative
    pub fn definition_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.definition_file);
        if path.is_absolute() {
            path
        } else {
            PathBuf::from(&self.app_root).join(path)
        }
    }
}
