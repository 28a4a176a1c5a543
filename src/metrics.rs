//! Prometheus metrics for the asset pipeline
//!
//! Each pipeline owns its own [`Registry`], so several pipelines (or tests)
//! can live in one process without colliding on metric names.

use crate::monitor::ChangeKind;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::fmt;

/// How a request for a resource set was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Content was built by the default workflow
    Built,
    /// Served from the output cache
    ServerCache,
    /// Browser cache still valid, 304 sent
    NotModified,
    /// Built by the debug workflow
    Debug,
    NotFound,
    Error,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Built => "built",
            RequestOutcome::ServerCache => "server_cache",
            RequestOutcome::NotModified => "not_modified",
            RequestOutcome::Debug => "debug",
            RequestOutcome::NotFound => "not_found",
            RequestOutcome::Error => "error",
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PipelineMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    change_events_total: IntCounterVec,
    rehash_total: IntCounter,
}

impl PipelineMetrics {
    /// Create metrics registered on a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics registered on the given registry
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "asset_combiner_requests_total",
                "Total number of resource set requests by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "asset_combiner_request_duration_seconds",
                "Time spent answering resource set requests in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["outcome"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let change_events_total = IntCounterVec::new(
            Opts::new(
                "asset_combiner_change_events_total",
                "Total number of applied change events by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(change_events_total.clone()))?;

        let rehash_total = IntCounter::with_opts(Opts::new(
            "asset_combiner_rehash_total",
            "Total number of resource set hash recomputations",
        ))?;
        registry.register(Box::new(rehash_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            change_events_total,
            rehash_total,
        })
    }

    /// Record a finished request
    pub fn record_request(&self, outcome: RequestOutcome, duration_secs: f64) {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[outcome.as_str()])
            .observe(duration_secs);
    }

    pub fn record_change(&self, kind: ChangeKind) {
        let label = kind.to_string();
        self.change_events_total.with_label_values(&[label.as_str()]).inc();
    }

    pub fn record_rehash(&self) {
        self.rehash_total.inc();
    }

    pub fn request_count(&self, outcome: RequestOutcome) -> u64 {
        self.requests_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    pub fn change_count(&self, kind: ChangeKind) -> u64 {
        let label = kind.to_string();
        self.change_events_total.with_label_values(&[label.as_str()]).get()
    }

    pub fn rehash_count(&self) -> u64 {
        self.rehash_total.get()
    }

    /// Metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_request(RequestOutcome::Built, 0.01);
        metrics.record_request(RequestOutcome::ServerCache, 0.001);
        metrics.record_request(RequestOutcome::ServerCache, 0.001);
        metrics.record_change(ChangeKind::Resource);
        metrics.record_rehash();

        assert_eq!(metrics.request_count(RequestOutcome::Built), 1);
        assert_eq!(metrics.request_count(RequestOutcome::ServerCache), 2);
        assert_eq!(metrics.request_count(RequestOutcome::NotModified), 0);
        assert_eq!(metrics.change_count(ChangeKind::Resource), 1);
        assert_eq!(metrics.change_count(ChangeKind::Config), 0);
        assert_eq!(metrics.rehash_count(), 1);
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_request(RequestOutcome::NotModified, 0.0001);
        let text = metrics.encode().unwrap();
        assert!(text.contains("asset_combiner_requests_total{outcome=\"not_modified\"} 1"));
        assert!(text.contains("asset_combiner_request_duration_seconds_bucket"));
    }

    #[test]
    fn test_independent_registries() {
        let a = PipelineMetrics::new().unwrap();
        let b = PipelineMetrics::new().unwrap();
        a.record_rehash();
        assert_eq!(b.rehash_count(), 0);
    }
}
