//! One keeper run: setup queries, concurrent fetches, evaluation and dispatch,
//! with the metrics flush guaranteed on every exit path.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use neutral_keeper_core::{
    AccountInfo, AccountSource, AppConfig, Clock, ConfigError, Counter, LedgerQuery, MetricDatum,
    MetricDimension, Metrics, MetricsSink, NetworkConfig, QueryError, RetryPolicy, SystemClock,
    Tolerances, TxBroadcaster, TxSigner,
};

use crate::dispatcher::{BatchDispatcher, DispatchReport};
use crate::error::KeeperError;
use crate::fetch::FetchContext;
use crate::oracle::fetch_oracle_quotes;
use crate::policy::{evaluate, PolicyContext};
use crate::positions::{fetch_position_count, fetch_positions, fetch_registry, open_positions};

/// Builds the transaction signer once the keeper account is known.
pub type SignerFactory = Box<dyn FnOnce(&AccountInfo) -> Box<dyn TxSigner> + Send>;

/// Per-invocation settings.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Network name, also the metrics dimension.
    pub network: String,
    pub targets: NetworkConfig,
    pub tolerances: Tolerances,
    pub concurrency_limit: usize,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl RunParams {
    /// Resolves `network` from `config`; `None` overrides fall back to the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the network is unknown or incompletely configured.
    pub fn from_config(
        config: &AppConfig,
        network: &str,
        tolerances: Tolerances,
        concurrency_limit: Option<usize>,
        batch_size: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let targets = config.network(network)?.clone();
        Ok(Self {
            network: network.to_string(),
            targets,
            tolerances,
            concurrency_limit: concurrency_limit.unwrap_or(config.keeper.concurrency_limit),
            batch_size: batch_size.unwrap_or(config.keeper.batch_size),
            retry: RetryPolicy::from_config(&config.keeper),
        })
    }

    /// # Errors
    ///
    /// Returns an error for a zero pool or batch size or a negative tolerance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Zero("concurrency_limit"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        self.tolerances.validate()
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub positions_total: u64,
    pub positions_open: usize,
    pub actions: usize,
    pub dispatch: DispatchReport,
    /// Counter values at the end of the run, in schema order.
    pub counters: Vec<MetricDatum>,
}

impl RunSummary {
    #[must_use]
    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters
            .iter()
            .find(|d| d.name == counter.name())
            .map_or(0, |d| d.value)
    }
}

pub struct Keeper {
    ledger: Arc<dyn LedgerQuery>,
    accounts: Arc<dyn AccountSource>,
    broadcaster: Arc<dyn TxBroadcaster>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl Keeper {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerQuery>,
        accounts: Arc<dyn AccountSource>,
        broadcaster: Arc<dyn TxBroadcaster>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            ledger,
            accounts,
            broadcaster,
            sink,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Executes one full run and flushes its metrics, even if the run fails or panics.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid parameters or a failed setup query.
    pub async fn run(
        &self,
        params: &RunParams,
        make_signer: SignerFactory,
    ) -> Result<RunSummary, KeeperError> {
        let metrics = Metrics::new();
        let dimension = MetricDimension::network(params.network.as_str());

        let outcome = AssertUnwindSafe(self.pipeline(params, make_signer, &metrics))
            .catch_unwind()
            .await;

        metrics.flush(self.sink.as_ref(), &dimension).await;

        match outcome {
            Ok(Err(e)) => {
                tracing::error!(network = %params.network, error = %e, "Keeper run aborted");
                Err(e)
            }
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn fetch_account(
        &self,
        ctx: FetchContext<'_>,
        address: &str,
    ) -> Result<AccountInfo, QueryError> {
        ctx.retry
            .run_if(
                ctx.clock,
                "keeper account",
                || self.accounts.account(address),
                QueryError::is_transient,
            )
            .await
    }

    async fn pipeline(
        &self,
        params: &RunParams,
        make_signer: SignerFactory,
        metrics: &Metrics,
    ) -> Result<RunSummary, KeeperError> {
        params.validate()?;
        let targets = &params.targets;
        let ctx = FetchContext {
            ledger: self.ledger.as_ref(),
            clock: self.clock.as_ref(),
            metrics,
            retry: params.retry,
            concurrency_limit: params.concurrency_limit,
        };

        tracing::info!(
            network = %params.network,
            concurrency_limit = params.concurrency_limit,
            batch_size = params.batch_size,
            "Starting keeper run"
        );

        let (upper_bound, registry, account) = tokio::try_join!(
            async {
                fetch_position_count(ctx, &targets.position_manager)
                    .await
                    .map_err(KeeperError::PositionCount)
            },
            async {
                fetch_registry(ctx, &targets.position_manager)
                    .await
                    .map_err(KeeperError::Registry)
            },
            async {
                self.fetch_account(ctx, &targets.keeper_address)
                    .await
                    .map_err(KeeperError::Account)
            },
        )?;
        metrics.incr_by(Counter::PositionsTotal, upper_bound);
        tracing::info!(
            positions = upper_bound,
            position_code_id = registry.position_code_id,
            sequence = account.sequence,
            "Setup complete"
        );

        let (quotes, positions) = tokio::join!(
            fetch_oracle_quotes(ctx, &targets.oracle, &targets.tracked_assets),
            fetch_positions(ctx, &targets.position_manager, upper_bound),
        );
        let open = open_positions(positions, ctx);

        let policy = PolicyContext {
            tolerances: params.tolerances,
            now: self.clock.now(),
            keeper_address: &targets.keeper_address,
        };
        let mut actions = Vec::new();
        for position in &open {
            let verdict = evaluate(position, &quotes, &policy);
            metrics.incr(Counter::PositionsEvaluated);
            metrics.incr(verdict.reason.counter());
            if verdict.is_action() {
                tracing::info!(position_id = verdict.position_id, reason = %verdict.reason, "{}", verdict.audit);
                actions.push(verdict);
            } else {
                tracing::debug!(position_id = verdict.position_id, "{}", verdict.audit);
            }
        }

        let signer = make_signer(&account);
        let dispatcher = BatchDispatcher::new(
            signer.as_ref(),
            self.broadcaster.as_ref(),
            metrics,
            params.batch_size,
            registry.position_code_id,
        );
        let dispatch = dispatcher.dispatch(&actions, account.sequence).await;

        let summary = RunSummary {
            positions_total: upper_bound,
            positions_open: open.len(),
            actions: actions.len(),
            dispatch,
            counters: metrics.snapshot(),
        };
        tracing::info!(
            network = %params.network,
            positions = summary.positions_total,
            open = summary.positions_open,
            actions = summary.actions,
            batches = summary.dispatch.batches.len(),
            successful_batches = summary.dispatch.successful_batches(),
            "Keeper run complete"
        );
        Ok(summary)
    }
}
