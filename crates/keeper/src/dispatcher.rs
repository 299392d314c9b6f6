//! Batched transaction dispatch.
//!
//! Verdicts are packed into fixed-size batches, one signed transaction per
//! batch. Each attempt consumes one sequence number whatever happens to it,
//! and a failed batch never stops the ones after it.

use neutral_keeper_core::{
    BroadcastOutcome, Counter, LedgerMsg, Metrics, TxBroadcaster, TxSigner,
};
use serde_json::json;

use crate::policy::RebalanceVerdict;

/// What happened to one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    SigningFailed(String),
    BroadcastFailed(String),
    Rejected { code: u32, raw_log: String },
    Included { txhash: String, height: u64 },
}

impl BatchOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Included { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub sequence: u64,
    pub position_ids: Vec<u64>,
    pub memo: String,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub batches: Vec<BatchReport>,
    /// First sequence number not consumed by this dispatch.
    pub next_sequence: u64,
}

impl DispatchReport {
    #[must_use]
    pub fn successful_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.outcome.is_success()).count()
    }
}

/// Migrates a position contract onto the registry's current code id.
#[must_use]
pub fn sync_msg(keeper_address: &str, contract: &str, code_id: u64) -> LedgerMsg {
    LedgerMsg::Migrate {
        admin: keeper_address.to_string(),
        contract: contract.to_string(),
        new_code_id: code_id,
        migrate_msg: json!({}),
    }
}

pub struct BatchDispatcher<'a> {
    signer: &'a dyn TxSigner,
    broadcaster: &'a dyn TxBroadcaster,
    metrics: &'a Metrics,
    batch_size: usize,
    position_code_id: u64,
}

impl<'a> BatchDispatcher<'a> {
    /// `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(
        signer: &'a dyn TxSigner,
        broadcaster: &'a dyn TxBroadcaster,
        metrics: &'a Metrics,
        batch_size: usize,
        position_code_id: u64,
    ) -> Self {
        Self {
            signer,
            broadcaster,
            metrics,
            batch_size: batch_size.max(1),
            position_code_id,
        }
    }

    /// All messages for one verdict, sync message first.
    fn messages_for(&self, verdict: &RebalanceVerdict) -> Vec<LedgerMsg> {
        let mut msgs = Vec::with_capacity(verdict.messages.len() + 1);
        msgs.push(sync_msg(
            self.signer.address(),
            &verdict.contract,
            self.position_code_id,
        ));
        msgs.extend(verdict.messages.iter().cloned());
        msgs
    }

    /// Dispatches `verdicts` in order starting at `sequence`.
    pub async fn dispatch(&self, verdicts: &[RebalanceVerdict], sequence: u64) -> DispatchReport {
        let mut report = DispatchReport {
            batches: Vec::with_capacity(verdicts.len().div_ceil(self.batch_size)),
            next_sequence: sequence,
        };

        for batch in verdicts.chunks(self.batch_size) {
            let sequence = report.next_sequence;
            report.next_sequence += 1;
            report.batches.push(self.send_batch(batch, sequence).await);
        }

        tracing::info!(
            batches = report.batches.len(),
            successful = report.successful_batches(),
            next_sequence = report.next_sequence,
            "Dispatch complete"
        );
        report
    }

    async fn send_batch(&self, batch: &[RebalanceVerdict], sequence: u64) -> BatchReport {
        self.metrics.incr(Counter::BatchesAttempted);

        let msgs: Vec<LedgerMsg> = batch.iter().flat_map(|v| self.messages_for(v)).collect();
        let memo = batch
            .iter()
            .map(RebalanceVerdict::memo_entry)
            .collect::<Vec<_>>()
            .join(";");
        let position_ids: Vec<u64> = batch.iter().map(|v| v.position_id).collect();

        let outcome = match self.signer.sign(&msgs, &memo, sequence) {
            Err(e) => {
                self.metrics.incr(Counter::TxSigningFailures);
                tracing::error!(sequence, memo = %memo, error = %e, "Failed to sign batch");
                BatchOutcome::SigningFailed(e.to_string())
            }
            Ok(tx) => match self.broadcaster.broadcast(&tx).await {
                Err(e) => {
                    self.metrics.incr(Counter::TxBroadcastFailures);
                    tracing::error!(sequence, memo = %memo, error = %e, "Failed to broadcast batch");
                    BatchOutcome::BroadcastFailed(e.to_string())
                }
                Ok(BroadcastOutcome::Rejected { txhash, code, raw_log }) => {
                    self.metrics.incr(Counter::TxChainFailures);
                    tracing::error!(
                        sequence,
                        memo = %memo,
                        txhash = txhash.as_deref().unwrap_or("-"),
                        code,
                        raw_log = %raw_log,
                        "Batch rejected by chain"
                    );
                    BatchOutcome::Rejected { code, raw_log }
                }
                Ok(BroadcastOutcome::Included { txhash, height }) => {
                    self.metrics.incr(Counter::TxSuccesses);
                    self.metrics
                        .incr_by(Counter::PositionsRebalanced, batch.len() as u64);
                    tracing::info!(
                        sequence,
                        memo = %memo,
                        txhash = %txhash,
                        height,
                        "Batch included"
                    );
                    BatchOutcome::Included { txhash, height }
                }
            },
        };

        BatchReport {
            sequence,
            position_ids,
            memo,
            outcome,
        }
    }
}
