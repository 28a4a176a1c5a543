//! Content filters
//!
//! Filters hook into four points of the pipeline, see [`FilterStage`]. A
//! filter declares which stages it runs at and which resource types it can
//! handle; the default transform for every stage returns the input as-is.

use super::binder::{unknown_param, wrong_type, Configurable, ObjectBinder, ParamValue};
use super::cache_vary::CacheVaryState;
use super::FilterCtor;
use crate::definition::ParamDef;
use crate::error::Result;
use crate::resource::{Resource, ResourceType};
use crate::resource_set::ResourceSet;
use crate::url::PathResolver;
use regex::{Captures, Regex};
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Each resource's content right after it is read
    Single,
    /// A merge group after concatenation
    Combined,
    /// A merge group after minification
    Minified,
    /// Final bytes after compression
    Compressed,
}

/// What a filter sees besides the content itself
pub struct FilterContext<'a> {
    pub set: &'a ResourceSet,
    pub resolver: &'a PathResolver,
}

pub trait ContentFilter: Configurable + Send + Sync {
    fn can_apply_to(&self, resource_type: ResourceType) -> bool;

    fn applies_at(&self, stage: FilterStage) -> bool;

    /// Receives the request's cache-vary states; called for every filter
    /// before any transform
    fn set_cache_vary_states(&mut self, _states: &[CacheVaryState]) {}

    fn transform_single(
        &self,
        _ctx: &FilterContext<'_>,
        _resource: &Resource,
        content: String,
    ) -> Result<String> {
        Ok(content)
    }

    fn transform_combined(
        &self,
        _ctx: &FilterContext<'_>,
        _resources: &[Resource],
        content: String,
    ) -> Result<String> {
        Ok(content)
    }

    fn transform_minified(
        &self,
        _ctx: &FilterContext<'_>,
        _resources: &[Resource],
        content: String,
    ) -> Result<String> {
        Ok(content)
    }

    fn transform_compressed(&self, _ctx: &FilterContext<'_>, content: Vec<u8>) -> Result<Vec<u8>> {
        Ok(content)
    }
}

/// A configured filter declaration resolved against the plugin registry
pub struct FilterInfo {
    type_name: String,
    params: Vec<ParamDef>,
    resource_sets: Option<Vec<String>>,
    binder: Arc<dyn ObjectBinder>,
    ctor: FilterCtor,
}

impl FilterInfo {
    pub fn new(
        type_name: impl Into<String>,
        params: Vec<ParamDef>,
        resource_sets: Option<Vec<String>>,
        binder: Arc<dyn ObjectBinder>,
        ctor: FilterCtor,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            params,
            resource_sets,
            binder,
            ctor,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether the filter is restricted away from the named set
    pub fn accepts_set(&self, set_name: &str) -> bool {
        match &self.resource_sets {
            Some(names) => names.iter().any(|n| n == set_name),
            None => true,
        }
    }

    pub fn instantiate(&self) -> Result<Box<dyn ContentFilter>> {
        (self.ctor)(&self.params, self.binder.as_ref())
    }

    /// Stable identity folded into auto-version hashes
    pub fn identity(&self) -> String {
        format!("{}({})", self.type_name, ParamDef::signature(&self.params))
    }
}

impl fmt::Debug for FilterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterInfo")
            .field("type_name", &self.type_name)
            .field("params", &self.params)
            .field("resource_sets", &self.resource_sets)
            .finish()
    }
}

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)@import\s+(?P<url>.*?)\s*;").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)url\((?P<url>.*?)\)").expect("valid regex"));

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

static DEFINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)@define\s*\{(?P<define>.*?)\}").expect("valid regex"));

/// Rewrites `url(...)` references so they keep working once the CSS is
/// served from the installation URL instead of its own folder
#[derive(Debug, Default, Clone, Copy)]
pub struct FixUrlsInCssFilter;

impl FixUrlsInCssFilter {
    fn fix_import(caps: &Captures<'_>) -> String {
        let url = &caps["url"];
        if url.to_ascii_lowercase().starts_with("url") {
            format!("@import {};", url)
        } else {
            format!("@import url({});", url)
        }
    }

    /// Rewrite one url; `None` when it cannot be resolved
    pub fn fix_url(resolver: &PathResolver, resource: &Resource, raw: &str) -> Option<String> {
        let mut url = raw.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http") || lower.starts_with("data:") {
            return Some(url);
        }

        let same_app = resource.is_in_same_application();
        if let Some(rest) = url.strip_prefix("~/") {
            if same_app {
                return Some(resolver.resolve_url(&url));
            }
            url = format!("/{}", rest);
        }

        let css_path = resource.path();
        if url.starts_with('/') {
            if same_app {
                return Some(url);
            }
            let origin = reqwest::Url::parse(css_path).ok()?;
            return Some(format!("{}{}", origin.origin().ascii_serialization(), url));
        }

        let mut folder = &css_path[..css_path.rfind('/')?];
        while let Some(rest) = url.strip_prefix("../") {
            url = rest.to_string();
            folder = &folder[..folder.rfind('/')?];
        }
        Some(resolver.resolve_url(&format!("{}/{}", folder, url)))
    }
}

impl Configurable for FixUrlsInCssFilter {
    fn set_param(&mut self, name: &str, _value: ParamValue) -> Result<()> {
        Err(unknown_param("FixUrlsInCssFilter", name))
    }
}

impl ContentFilter for FixUrlsInCssFilter {
    fn can_apply_to(&self, resource_type: ResourceType) -> bool {
        resource_type == ResourceType::Css
    }

    fn applies_at(&self, stage: FilterStage) -> bool {
        stage == FilterStage::Single
    }

    fn transform_single(
        &self,
        ctx: &FilterContext<'_>,
        resource: &Resource,
        content: String,
    ) -> Result<String> {
        let imports_fixed = IMPORT_RE.replace_all(&content, Self::fix_import);
        let fixed = URL_RE.replace_all(&imports_fixed, |caps: &Captures<'_>| {
            match Self::fix_url(ctx.resolver, resource, &caps["url"]) {
                Some(url) => format!("url(\"{}\")", url),
                None => {
                    warn!("Cannot fix url {} in {}", &caps[0], resource.path());
                    caps[0].to_string()
                }
            }
        });
        Ok(fixed.into_owned())
    }
}

/// Substitutes `@define { name: value; }` variables
///
/// Comments are stripped first; the declaration block itself is removed
/// from the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssVariablesFilter;

impl Configurable for CssVariablesFilter {
    fn set_param(&mut self, name: &str, _value: ParamValue) -> Result<()> {
        Err(unknown_param("CssVariablesFilter", name))
    }
}

impl ContentFilter for CssVariablesFilter {
    fn can_apply_to(&self, resource_type: ResourceType) -> bool {
        resource_type == ResourceType::Css
    }

    fn applies_at(&self, stage: FilterStage) -> bool {
        stage == FilterStage::Single
    }

    fn transform_single(
        &self,
        _ctx: &FilterContext<'_>,
        _resource: &Resource,
        content: String,
    ) -> Result<String> {
        Ok(Self::substitute(&content))
    }
}

impl CssVariablesFilter {
    pub fn substitute(content: &str) -> String {
        let content = COMMENT_RE.replace_all(content, "").into_owned();
        let (declaration, body) = match DEFINE_RE.captures(&content) {
            Some(caps) => (caps[0].to_string(), caps["define"].to_string()),
            None => return content,
        };

        let mut output = content.replacen(&declaration, "", 1);
        let mut variables: Vec<(String, String)> = body
            .split(';')
            .filter_map(|v| v.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        // Longest names first so @main is not replaced inside @main-color
        variables.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        for (name, value) in variables {
            output = output.replace(&format!("@{}", name), &value);
        }
        output
    }
}

/// Prepends a comment banner to each merge group
///
/// `{name}` placeholders in the text are filled from the values of the
/// request's cache-vary states, e.g. `{language}`.
#[derive(Debug, Clone, Default)]
pub struct BannerFilter {
    text: String,
    states: Vec<CacheVaryState>,
}

impl BannerFilter {
    pub fn render(&self) -> String {
        let mut text = self.text.clone();
        for state in &self.states {
            for (name, value) in &state.values {
                text = text.replace(&format!("{{{}}}", name), value);
            }
        }
        text.replace("*/", "* /")
    }
}

impl Configurable for BannerFilter {
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "text" => {
                self.text = value
                    .as_str()
                    .ok_or_else(|| wrong_type("BannerFilter", name, "string"))?
                    .to_string();
                Ok(())
            }
            _ => Err(unknown_param("BannerFilter", name)),
        }
    }
}

impl ContentFilter for BannerFilter {
    fn can_apply_to(&self, _resource_type: ResourceType) -> bool {
        true
    }

    fn applies_at(&self, stage: FilterStage) -> bool {
        stage == FilterStage::Minified
    }

    fn set_cache_vary_states(&mut self, states: &[CacheVaryState]) {
        self.states = states.to_vec();
    }

    fn transform_minified(
        &self,
        _ctx: &FilterContext<'_>,
        _resources: &[Resource],
        content: String,
    ) -> Result<String> {
        if self.text.is_empty() {
            return Ok(content);
        }
        Ok(format!("/* {} */\n{}", self.render(), content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::minifier::MinifierInfo;
    use crate::resource::ResourceMode;

    fn resolver() -> PathResolver {
        PathResolver::new("/srv/app", "http://localhost:8080", "/app/").unwrap()
    }

    fn css(path: &str, mode: ResourceMode) -> Resource {
        Resource::new(path, mode, false, Arc::new(MinifierInfo::off())).unwrap()
    }

    #[test]
    fn test_fix_url_relative_to_css_folder() {
        let r = css("~/content/css/site.css", ResourceMode::Static);
        let res = resolver();
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "'img/a.png'").as_deref(),
            Some("/app/content/css/img/a.png")
        );
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "../../img/b.png").as_deref(),
            Some("/app/img/b.png")
        );
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "~/img/c.png").as_deref(),
            Some("/app/img/c.png")
        );
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "/root.png").as_deref(),
            Some("/root.png")
        );
    }

    #[test]
    fn test_fix_url_keeps_absolute_and_data() {
        let r = css("~/site.css", ResourceMode::Static);
        let res = resolver();
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "\"data:image/png;base64,AA\"").as_deref(),
            Some("data:image/png;base64,AA")
        );
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "https://cdn/x.png").as_deref(),
            Some("https://cdn/x.png")
        );
    }

    #[test]
    fn test_fix_url_remote_css() {
        let r = css("http://cdn.example.com/lib/theme.css", ResourceMode::Dynamic);
        let res = resolver();
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "/img/x.png").as_deref(),
            Some("http://cdn.example.com/img/x.png")
        );
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "~/img/y.png").as_deref(),
            Some("http://cdn.example.com/img/y.png")
        );
        assert_eq!(
            FixUrlsInCssFilter::fix_url(&res, &r, "img/z.png").as_deref(),
            Some("http://cdn.example.com/lib/img/z.png")
        );
    }

    #[test]
    fn test_css_variables_substituted() {
        let css = "/* theme */\n@define { main: #333; main-bg: white; }\nbody { color: @main; background: @main-bg; }";
        let out = CssVariablesFilter::substitute(css);
        assert!(!out.contains("@define"));
        assert!(!out.contains("theme"));
        assert!(out.contains("color: #333;"));
        assert!(out.contains("background: white;"));
    }

    #[test]
    fn test_css_without_define_is_untouched() {
        assert_eq!(CssVariablesFilter::substitute("a{color:red}"), "a{color:red}");
    }

    #[test]
    fn test_banner_uses_vary_values() {
        let mut banner = BannerFilter::default();
        banner
            .set_param("text", ParamValue::Str("(c) Acme - {language}".to_string()))
            .unwrap();
        banner.set_cache_vary_states(&[CacheVaryState::new("fr").with_value("language", "fr")]);
        assert_eq!(banner.render(), "(c) Acme - fr");
        assert!(banner.applies_at(FilterStage::Minified));
        assert!(!banner.applies_at(FilterStage::Single));
    }
}
