//! Run-scoped counters with a fixed schema.
//!
//! Every counter exists from construction, so a flush always carries the full
//! schema even for events that never happened. Increments are atomic and may
//! come from any number of concurrent fetch tasks.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    PositionsTotal,
    PositionsClosed,
    PositionsEvaluated,
    PositionFetchFailures,
    OracleFetchFailures,
    VerdictsCrl,
    VerdictsCrg,
    VerdictsDl,
    VerdictsBal,
    VerdictsNa,
    BatchesAttempted,
    TxSigningFailures,
    TxBroadcastFailures,
    TxChainFailures,
    TxSuccesses,
    PositionsRebalanced,
}

impl Counter {
    /// The complete schema, in export order.
    pub const ALL: [Self; 16] = [
        Self::PositionsTotal,
        Self::PositionsClosed,
        Self::PositionsEvaluated,
        Self::PositionFetchFailures,
        Self::OracleFetchFailures,
        Self::VerdictsCrl,
        Self::VerdictsCrg,
        Self::VerdictsDl,
        Self::VerdictsBal,
        Self::VerdictsNa,
        Self::BatchesAttempted,
        Self::TxSigningFailures,
        Self::TxBroadcastFailures,
        Self::TxChainFailures,
        Self::TxSuccesses,
        Self::PositionsRebalanced,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PositionsTotal => "positions_total",
            Self::PositionsClosed => "positions_closed",
            Self::PositionsEvaluated => "positions_evaluated",
            Self::PositionFetchFailures => "position_fetch_failures",
            Self::OracleFetchFailures => "oracle_fetch_failures",
            Self::VerdictsCrl => "verdicts_crl",
            Self::VerdictsCrg => "verdicts_crg",
            Self::VerdictsDl => "verdicts_dl",
            Self::VerdictsBal => "verdicts_bal",
            Self::VerdictsNa => "verdicts_na",
            Self::BatchesAttempted => "batches_attempted",
            Self::TxSigningFailures => "tx_signing_failures",
            Self::TxBroadcastFailures => "tx_broadcast_failures",
            Self::TxChainFailures => "tx_chain_failures",
            Self::TxSuccesses => "tx_successes",
            Self::PositionsRebalanced => "positions_rebalanced",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDatum {
    pub name: &'static str,
    pub value: u64,
}

/// Tag attached to every exported counter, e.g. `Network=mainnet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDimension {
    pub name: String,
    pub value: String,
}

impl MetricDimension {
    #[must_use]
    pub fn network(network: impl Into<String>) -> Self {
        Self {
            name: "Network".to_string(),
            value: network.into(),
        }
    }
}

/// Destination of the end-of-run counter export.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, dimension: &MetricDimension, data: &[MetricDatum]) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct Metrics {
    counters: [AtomicU64; Counter::ALL.len()],
    flushed: AtomicBool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.incr_by(counter, 1);
    }

    pub fn incr_by(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Current value of every counter in schema order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MetricDatum> {
        Counter::ALL
            .iter()
            .map(|&counter| MetricDatum {
                name: counter.name(),
                value: self.get(counter),
            })
            .collect()
    }

    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }

    /// Exports all counters to `sink`. Only the first call does anything.
    ///
    /// A sink failure is logged and swallowed. Returns whether this call performed the flush.
    pub async fn flush(&self, sink: &dyn MetricsSink, dimension: &MetricDimension) -> bool {
        if self.flushed.swap(true, Ordering::SeqCst) {
            tracing::warn!("Metrics already flushed for this run, ignoring");
            return false;
        }

        let data = self.snapshot();
        match sink.publish(dimension, &data).await {
            Ok(()) => tracing::info!(
                dimension = %dimension.value,
                counters = data.len(),
                "Metrics flushed"
            ),
            Err(e) => tracing::error!(error = %e, "Failed to publish metrics"),
        }
        true
    }
}

/// Writes the counters to the log instead of a remote service.
#[derive(Debug, Clone, Default)]
pub struct LogMetricsSink {
    namespace: String,
}

impl LogMetricsSink {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl MetricsSink for LogMetricsSink {
    async fn publish(&self, dimension: &MetricDimension, data: &[MetricDatum]) -> anyhow::Result<()> {
        let rendered = data
            .iter()
            .map(|d| format!("{}={}", d.name, d.value))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(
            namespace = %self.namespace,
            dimension = %format!("{}={}", dimension.name, dimension.value),
            "{rendered}"
        );
        Ok(())
    }
}
