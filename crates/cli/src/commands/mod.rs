//! CLI commands for the delta-neutral keeper.

pub mod preflight;
pub mod run_keeper;

use std::sync::Arc;

use anyhow::Result;
use neutral_keeper_core::{LogMetricsSink, MetricsConfig, MetricsSink};
use neutral_keeper_engine::HttpMetricsSink;

pub use preflight::{run_preflight, PreflightArgs};
pub use run_keeper::{run_keeper, RunArgs};

/// HTTP sink when an endpoint is configured, otherwise the log.
fn metrics_sink(config: &MetricsConfig) -> Result<Arc<dyn MetricsSink>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpMetricsSink::new(
            endpoint.as_str(),
            config.namespace.as_str(),
        )?)),
        None => Ok(Arc::new(LogMetricsSink::new(config.namespace.as_str()))),
    }
}
