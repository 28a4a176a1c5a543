//! Resource model
//!
//! A [`Resource`] is one source file inside a resource set: either a static
//! file on disk or a dynamic document fetched over HTTP. Identity is the
//! case-insensitive path plus mode and cookie-forwarding flag; content is
//! never part of it.

use crate::error::{CombinerError, Result};
use crate::plugins::minifier::MinifierInfo;
use crate::resource_set::ResourceSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// How a resource's content is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// Read from the local filesystem
    #[default]
    Static,
    /// Fetched over HTTP
    Dynamic,
}

impl fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceMode::Static => write!(f, "Static"),
            ResourceMode::Dynamic => write!(f, "Dynamic"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Js,
    Css,
}

impl ResourceType {
    /// Value of the Content-Type header for this type
    pub fn content_type(&self) -> &'static str {
        match self {
            ResourceType::Js => "application/x-javascript; charset=utf-8",
            ResourceType::Css => "text/css; charset=utf-8",
        }
    }

    /// Separator inserted between merged contents
    ///
    /// JS gets a statement separator so files without a trailing semicolon
    /// cannot run into each other.
    pub fn merge_separator(&self) -> &'static str {
        match self {
            ResourceType::Js => ";\n",
            ResourceType::Css => "",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Js => write!(f, "JS"),
            ResourceType::Css => write!(f, "CSS"),
        }
    }
}

/// Hashable identity of a resource, used as the content cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    path: String,
    mode: ResourceMode,
    forward_cookie: bool,
}

/// One source file of a resource set
#[derive(Debug, Clone)]
pub struct Resource {
    path: String,
    mode: ResourceMode,
    forward_cookie: bool,
    minifier: Arc<MinifierInfo>,
    parent: Weak<ResourceSet>,
}

impl Resource {
    /// Create a resource not yet attached to a set
    ///
    /// # Returns
    /// * `Err(CombinerError::ConfigError)` when a static resource asks for
    ///   cookie forwarding, or the path is empty
    pub fn new(
        path: impl Into<String>,
        mode: ResourceMode,
        forward_cookie: bool,
        minifier: Arc<MinifierInfo>,
    ) -> Result<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(CombinerError::ConfigError(
                "Resource path must not be empty".to_string(),
            ));
        }
        if mode == ResourceMode::Static && forward_cookie {
            return Err(CombinerError::ConfigError(format!(
                "forward_cookie must not be true when mode is static ({})",
                path
            )));
        }
        Ok(Resource {
            path,
            mode,
            forward_cookie,
            minifier,
            parent: Weak::new(),
        })
    }

    /// Copy of this resource owned by another set
    pub(crate) fn attach(&self, parent: Weak<ResourceSet>) -> Resource {
        Resource {
            parent,
            ..self.clone()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    pub fn forward_cookie(&self) -> bool {
        self.forward_cookie
    }

    pub fn minifier(&self) -> &Arc<MinifierInfo> {
        &self.minifier
    }

    /// Owning set, if it is still alive
    pub fn parent(&self) -> Option<Arc<ResourceSet>> {
        self.parent.upgrade()
    }

    /// `~/`-style paths belong to this application
    pub fn is_in_same_application(&self) -> bool {
        self.path.starts_with('~')
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            path: self.path.to_lowercase(),
            mode: self.mode,
            forward_cookie: self.forward_cookie,
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.forward_cookie == other.forward_cookie
            && self.path.to_lowercase() == other.path.to_lowercase()
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource '{}' (Mode: {})", self.path, self.mode)
    }
}
