//! Definition file schema
//!
//! The definition file declares resource sets, the minifiers and filters
//! they use, and the change-monitor intervals. It is plain YAML:
//!
//! ```yaml
//! url: /assets
//! defaults:
//!   duration: 30                 # days
//!   version: auto
//!   js_minifier: default
//! local_change_monitor_interval: 30   # seconds
//! filters:
//!   - type: fix_urls_in_css
//! js_minifiers:
//!   - name: fast
//!     type: oxc_js
//!     params:
//!       - { name: mangle, type: bool, value: "false" }
//! resource_sets:
//!   - name: siteJs
//!     type: js
//!     resources:
//!       - path: ~/js/jquery.js
//!         minifier: off
//!       - path: ~/js/site.js
//!   - name: allJs
//!     type: js
//!     resources:
//!       - reference: siteJs
//!       - path: https://cdn.example.com/lib.js
//!         mode: dynamic
//! ```
//!
//! This module only describes and parses the document; turning it into a
//! validated [`crate::settings::Settings`] snapshot happens in
//! [`crate::settings`].

use crate::error::{CombinerError, Result};
use crate::resource::{ResourceMode, ResourceType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top level of a definition file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DefinitionFile {
    /// Installation URL the sets are served under, e.g. `/assets` or `~/assets`
    pub url: String,

    /// Host prepended to generated URLs for plain requests
    #[serde(default)]
    pub host: Option<String>,

    /// Host prepended to generated URLs for secure requests
    #[serde(default)]
    pub ssl_host: Option<String>,

    #[serde(default)]
    pub defaults: SetDefaults,

    /// Polling interval in seconds for dynamic resources of this application
    #[serde(default)]
    pub local_change_monitor_interval: Option<i64>,

    /// Polling interval in seconds for dynamic resources on other hosts
    #[serde(default)]
    pub remote_change_monitor_interval: Option<i64>,

    #[serde(default)]
    pub filters: Vec<PluginDef>,

    #[serde(default)]
    pub cache_vary_providers: Vec<PluginDef>,

    #[serde(default)]
    pub js_minifiers: Vec<MinifierDef>,

    #[serde(default)]
    pub css_minifiers: Vec<MinifierDef>,

    #[serde(default)]
    pub resource_sets: Vec<ResourceSetDef>,
}

/// Values used when a resource set leaves an attribute unspecified
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SetDefaults {
    /// Cache lifetime in days
    #[serde(default)]
    pub duration: Option<u32>,

    /// Explicit version string or `auto`
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub version_generator: Option<String>,

    #[serde(default)]
    pub debug_enabled: Option<bool>,

    #[serde(default)]
    pub compression_enabled: Option<bool>,

    #[serde(default)]
    pub js_minifier: Option<String>,

    #[serde(default)]
    pub css_minifier: Option<String>,
}

/// A filter or cache-vary provider declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginDef {
    #[serde(rename = "type")]
    pub type_name: String,

    /// Names of the sets this plugin is restricted to; all sets when absent
    #[serde(default)]
    pub resource_sets: Option<Vec<String>>,

    #[serde(default)]
    pub binder: Option<String>,

    #[serde(default)]
    pub params: Vec<ParamDef>,
}

/// A named minifier declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MinifierDef {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub binder: Option<String>,

    #[serde(default)]
    pub params: Vec<ParamDef>,
}

/// One `(name, type, value)` parameter, or a nested group when `value` is absent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamDef {
    pub name: String,

    #[serde(rename = "type", default)]
    pub type_name: Option<String>,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub params: Vec<ParamDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSetDef {
    pub name: String,

    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub version_generator: Option<String>,

    /// Cache lifetime in days
    #[serde(default)]
    pub duration: Option<u32>,

    #[serde(default)]
    pub debug_enabled: Option<bool>,

    #[serde(default)]
    pub compression_enabled: Option<bool>,

    #[serde(default)]
    pub minifier: Option<String>,

    #[serde(default)]
    pub resources: Vec<ResourceDef>,
}

/// Either a resource declaration or a reference to an earlier set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceDef {
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub mode: Option<ResourceMode>,

    #[serde(default)]
    pub forward_cookie: Option<bool>,

    #[serde(default)]
    pub minifier: Option<String>,

    /// Name of an earlier-declared set whose resources are copied in here
    #[serde(default)]
    pub reference: Option<String>,
}

impl ParamDef {
    /// A simple typed parameter
    pub fn simple(name: &str, type_name: &str, value: &str) -> Self {
        ParamDef {
            name: name.to_string(),
            type_name: Some(type_name.to_string()),
            value: Some(value.to_string()),
            params: Vec::new(),
        }
    }

    /// Stable textual form used as part of plugin identities
    pub fn signature(params: &[ParamDef]) -> String {
        params
            .iter()
            .map(|p| {
                let nested = if p.params.is_empty() {
                    String::new()
                } else {
                    format!("{{{}}}", ParamDef::signature(&p.params))
                };
                format!(
                    "{}:{}={}{}",
                    p.name,
                    p.type_name.as_deref().unwrap_or(""),
                    p.value.as_deref().unwrap_or(""),
                    nested
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl DefinitionFile {
    /// Load a definition file from disk
    ///
    /// # Returns
    /// * `Ok(DefinitionFile)` if the file parses
    /// * `Err(CombinerError::ConfigError)` if it cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CombinerError::ConfigError(format!(
                "Failed to read definition file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a definition document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            CombinerError::ConfigError(format!("Failed to parse definition file: {}", e))
        })
    }
}
