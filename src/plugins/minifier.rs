//! Minifiers for merged JavaScript and CSS content
//!
//! Uses oxc for JavaScript and lightningcss for CSS. Every resource carries
//! an `Arc<MinifierInfo>` naming the minifier it is assigned to; a fresh
//! instance is created from the info for each request.

use super::binder::{unknown_param, wrong_type, Configurable, ObjectBinder, ParamValue, SimpleObjectBinder};
use super::cache_vary::CacheVaryState;
use super::MinifierCtor;
use crate::definition::ParamDef;
use crate::error::{CombinerError, Result};
use crate::resource_set::ResourceSet;
use crate::settings::Settings;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier as OxcMinifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use std::fmt;
use std::sync::Arc;

/// Name of the built-in minifier that leaves content untouched
pub const OFF: &str = "off";
/// Name of the built-in default minifier of each type
pub const DEFAULT: &str = "default";

pub trait Minifier: Configurable + Send + Sync {
    fn minify(&self, settings: &Settings, set: &ResourceSet, combined: &str) -> Result<String>;

    /// Receives the request's cache-vary states before `minify`; most minifiers ignore them
    fn set_cache_vary_states(&mut self, _states: &[CacheVaryState]) {}
}

/// A named minifier declaration resolved against the plugin registry
pub struct MinifierInfo {
    name: String,
    type_name: String,
    params: Vec<ParamDef>,
    binder: Arc<dyn ObjectBinder>,
    ctor: MinifierCtor,
}

impl MinifierInfo {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        params: Vec<ParamDef>,
        binder: Arc<dyn ObjectBinder>,
        ctor: MinifierCtor,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            params,
            binder,
            ctor,
        }
    }

    /// Built-in `off` minifier
    pub fn off() -> Self {
        Self::builtin(OFF, "null", || Box::new(NullMinifier))
    }

    /// Built-in `default` JavaScript minifier
    pub fn default_js() -> Self {
        Self::builtin(DEFAULT, "oxc_js", || Box::new(OxcJsMinifier::default()))
    }

    /// Built-in `default` CSS minifier
    pub fn default_css() -> Self {
        Self::builtin(DEFAULT, "lightningcss", || Box::new(LightningCssMinifier))
    }

    fn builtin<F>(name: &str, type_name: &str, make: F) -> Self
    where
        F: Fn() -> Box<dyn Minifier> + Send + Sync + 'static,
    {
        let ctor: MinifierCtor = Arc::new(move |_params: &[ParamDef], _binder: &dyn ObjectBinder| Ok(make()));
        Self::new(name, type_name, Vec::new(), Arc::new(SimpleObjectBinder), ctor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Create a configured instance
    pub fn instantiate(&self) -> Result<Box<dyn Minifier>> {
        (self.ctor)(&self.params, self.binder.as_ref())
    }

    /// Stable identity folded into auto-version hashes
    pub fn identity(&self) -> String {
        format!(
            "{}:{}({})",
            self.name,
            self.type_name,
            ParamDef::signature(&self.params)
        )
    }
}

impl fmt::Debug for MinifierInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinifierInfo")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("params", &self.params)
            .finish()
    }
}

/// Returns content unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMinifier;

impl Configurable for NullMinifier {
    fn set_param(&mut self, name: &str, _value: ParamValue) -> Result<()> {
        Err(unknown_param("NullMinifier", name))
    }
}

impl Minifier for NullMinifier {
    fn minify(&self, _settings: &Settings, _set: &ResourceSet, combined: &str) -> Result<String> {
        Ok(combined.to_string())
    }
}

/// JavaScript minifier backed by oxc
#[derive(Debug, Clone)]
pub struct OxcJsMinifier {
    mangle: bool,
    compress: bool,
    keep_comments: bool,
}

impl Default for OxcJsMinifier {
    fn default() -> Self {
        Self {
            mangle: true,
            compress: true,
            keep_comments: false,
        }
    }
}

impl OxcJsMinifier {
    /// Minify a script; parse errors are reported, not swallowed
    pub fn minify_source(&self, source: &str) -> Result<String> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if !ret.errors.is_empty() {
            let first = ret
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(CombinerError::PluginError(format!(
                "JavaScript parse failed with {} error(s): {}",
                ret.errors.len(),
                first
            )));
        }
        let mut program = ret.program;
        let options = MinifierOptions {
            mangle: self.mangle.then(MangleOptions::default),
            compress: self.compress.then(CompressOptions::smallest),
        };
        let ret = OxcMinifier::new(options).minify(&allocator, &mut program);
        let comments = if self.keep_comments {
            CommentOptions::default()
        } else {
            CommentOptions::disabled()
        };
        let code = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments,
                ..CodegenOptions::default()
            })
            .with_scoping(ret.scoping)
            .build(&program)
            .code;
        Ok(code)
    }
}

impl Configurable for OxcJsMinifier {
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        const NAME: &str = "OxcJsMinifier";
        let flag = value.as_bool().ok_or_else(|| wrong_type(NAME, name, "bool"));
        match name {
            "mangle" => self.mangle = flag?,
            "compress" => self.compress = flag?,
            "keep_comments" => self.keep_comments = flag?,
            _ => return Err(unknown_param(NAME, name)),
        }
        Ok(())
    }
}

impl Minifier for OxcJsMinifier {
    fn minify(&self, _settings: &Settings, _set: &ResourceSet, combined: &str) -> Result<String> {
        self.minify_source(combined)
    }
}

/// CSS minifier backed by lightningcss
#[derive(Debug, Default, Clone, Copy)]
pub struct LightningCssMinifier;

impl LightningCssMinifier {
    pub fn minify_source(&self, source: &str) -> Result<String> {
        let stylesheet = StyleSheet::parse(source, ParserOptions::default())
            .map_err(|e| CombinerError::PluginError(format!("CSS parse failed: {}", e)))?;
        let result = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                ..PrinterOptions::default()
            })
            .map_err(|e| CombinerError::PluginError(format!("CSS print failed: {}", e)))?;
        Ok(result.code)
    }
}

impl Configurable for LightningCssMinifier {
    fn set_param(&mut self, name: &str, _value: ParamValue) -> Result<()> {
        Err(unknown_param("LightningCssMinifier", name))
    }
}

impl Minifier for LightningCssMinifier {
    fn minify(&self, _settings: &Settings, _set: &ResourceSet, combined: &str) -> Result<String> {
        self.minify_source(combined)
    }
}
