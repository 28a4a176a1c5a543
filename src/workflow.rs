//! Processing workflows
//!
//! Default: browser cache check, output cache check, then build.
//! Building partitions the set into merge groups, maximal runs of
//! resources sharing a minifier. Each group is read, filtered, merged,
//! minified and filtered again; the group outputs are merged, compressed and
//! stored in the output cache together with their ETag.
//!
//! Debug: no caching and no minification. Every resource is read fresh and
//! preceded by a comment naming it.

use crate::content::ContentReader;
use crate::error::{CombinerError, Result};
use crate::metrics::RequestOutcome;
use crate::output_cache::OutputCache;
use crate::plugins::filters::FilterStage;
use crate::plugins::minifier::MinifierInfo;
use crate::processor::{AssetResponse, RequestProcessor};
use crate::resource::{Resource, ResourceType};
use crate::version::sha512_hex;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A maximal run of consecutive resources sharing one minifier
#[derive(Debug, Clone, Copy)]
pub struct MergeGroup<'a> {
    pub minifier: &'a Arc<MinifierInfo>,
    pub resources: &'a [Resource],
}

/// Partition resources into merge groups, keeping their order
pub fn merge_groups(resources: &[Resource]) -> Vec<MergeGroup<'_>> {
    resources
        .chunk_by(|a, b| a.minifier().name() == b.minifier().name())
        .map(|chunk| MergeGroup {
            minifier: chunk[0].minifier(),
            resources: chunk,
        })
        .collect()
}

/// Join contents with the type's separator
pub fn merge_contents(resource_type: ResourceType, contents: &[String]) -> String {
    contents.join(resource_type.merge_separator())
}

/// Banner placed before each resource by the debug workflow
pub fn debug_banner(index: usize, path: &str) -> String {
    let lead = if index == 0 { "\n" } else { "\n\n\n" };
    format!("{}/* Resource: {} */\n", lead, path)
}

pub async fn run_default(
    p: &RequestProcessor,
    reader: &ContentReader,
    cache: &dyn OutputCache,
) -> Result<AssetResponse> {
    if let Some(if_none_match) = p.ctx().if_none_match() {
        if let Some(etag) = cache.get(p.etag_key()).await {
            if etag.as_ref() == if_none_match.as_bytes() {
                debug!("Browser copy of {} is current", p.set());
                return Ok(p.not_modified(if_none_match));
            }
        }
    }

    if let (Some(body), Some(etag)) = (cache.get(p.cache_key()).await, cache.get(p.etag_key()).await) {
        debug!("Serving {} from output cache key={}", p.set(), p.cache_key());
        let etag = String::from_utf8_lossy(&etag).into_owned();
        return Ok(p.content(body, Some(&etag), RequestOutcome::ServerCache));
    }

    let started = Instant::now();
    let body = Bytes::from(build_default(p, reader).await?);
    let etag = if p.set().is_auto_version() {
        format!("\"{}\"", p.set().hash().get())
    } else {
        format!("\"{}\"", sha512_hex(&body))
    };

    let ttl = p.set().duration();
    cache.add(p.cache_key(), body.clone(), ttl).await;
    cache.add(p.etag_key(), Bytes::from(etag.clone()), ttl).await;
    debug!(
        "Built {} in {:?}: {} bytes, etag={}",
        p.set(),
        started.elapsed(),
        body.len(),
        etag
    );

    Ok(p.content(body, Some(&etag), RequestOutcome::Built))
}

pub async fn run_debug(p: &RequestProcessor, reader: &ContentReader) -> Result<AssetResponse> {
    let started = Instant::now();
    let set = p.set();

    let mut parts = Vec::with_capacity(set.resources().len());
    for (index, resource) in set.resources().iter().enumerate() {
        let content = reader.read_new_content(resource, Some(p.ctx())).await?;
        let content = apply_single(p, resource, content)?;
        parts.push(format!("{}{}", debug_banner(index, resource.path()), content));
    }
    let merged = merge_contents(set.resource_type(), &parts);
    let merged = apply_text(p, FilterStage::Combined, set.resources(), merged)?;
    let body = compress(p, &merged)?;

    debug!("Built {} (debug) in {:?}", set, started.elapsed());
    Ok(p.content(Bytes::from(body), None, RequestOutcome::Debug))
}

async fn build_default(p: &RequestProcessor, reader: &ContentReader) -> Result<Vec<u8>> {
    let set = p.set();
    let groups = merge_groups(set.resources());
    if tracing::enabled!(tracing::Level::DEBUG) {
        let layout: Vec<String> = groups
            .iter()
            .map(|g| format!("{}x{}", g.minifier.name(), g.resources.len()))
            .collect();
        debug!("Merge groups of {}: {}", set, layout.join(", "));
    }

    let mut outputs = Vec::with_capacity(groups.len());
    for group in groups {
        let mut contents = Vec::with_capacity(group.resources.len());
        for resource in group.resources {
            let content = reader
                .read_from_cache(resource, true, Some(p.ctx()))
                .await?
                .ok_or_else(|| {
                    CombinerError::InternalError(format!("No content read for {}", resource))
                })?;
            contents.push(apply_single(p, resource, content)?);
        }

        let combined = merge_contents(set.resource_type(), &contents);
        let combined = apply_text(p, FilterStage::Combined, group.resources, combined)?;
        let minified = minify(p, group.minifier, &combined)?;
        outputs.push(apply_text(p, FilterStage::Minified, group.resources, minified)?);
    }

    let merged = merge_contents(set.resource_type(), &outputs);
    compress(p, &merged)
}

fn minify(p: &RequestProcessor, info: &MinifierInfo, content: &str) -> Result<String> {
    let started = Instant::now();
    let mut minifier = info.instantiate()?;
    minifier.set_cache_vary_states(p.vary_states());
    let minified = minifier.minify(p.settings(), p.set(), content)?;
    debug!(
        "Minified with {} in {:?}: {} -> {} bytes",
        info.name(),
        started.elapsed(),
        content.len(),
        minified.len()
    );
    Ok(minified)
}

fn compress(p: &RequestProcessor, content: &str) -> Result<Vec<u8>> {
    let mut bytes = p.compressor().compress(content)?;
    let ctx = p.filter_context();
    for filter in p.filters().iter().filter(|f| f.applies_at(FilterStage::Compressed)) {
        bytes = filter.transform_compressed(&ctx, bytes)?;
    }
    Ok(bytes)
}

fn apply_single(p: &RequestProcessor, resource: &Resource, mut content: String) -> Result<String> {
    let ctx = p.filter_context();
    for filter in p.filters().iter().filter(|f| f.applies_at(FilterStage::Single)) {
        content = filter.transform_single(&ctx, resource, content)?;
    }
    Ok(content)
}

fn apply_text(
    p: &RequestProcessor,
    stage: FilterStage,
    resources: &[Resource],
    mut content: String,
) -> Result<String> {
    let ctx = p.filter_context();
    for filter in p.filters().iter().filter(|f| f.applies_at(stage)) {
        content = match stage {
            FilterStage::Combined => filter.transform_combined(&ctx, resources, content)?,
            FilterStage::Minified => filter.transform_minified(&ctx, resources, content)?,
            FilterStage::Single | FilterStage::Compressed => content,
        };
    }
    Ok(content)
}
