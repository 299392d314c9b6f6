use async_trait::async_trait;
use chrono::DateTime;
use futures_util::FutureExt;
use neutral_keeper_core::{
    AccountInfo, AccountSource, BroadcastError, BroadcastOutcome, Counter, LedgerMsg, LedgerQuery,
    ManualClock, MetricDatum, MetricDimension, MetricsSink, NetworkConfig, QueryError,
    RetryPolicy, SignedTx, SigningError, Tolerances, TrackedAsset, TxBroadcaster, TxSigner,
};
use neutral_keeper_engine::{Keeper, KeeperError, RunParams, SignerFactory};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MANAGER: &str = "terra1manager";
const ORACLE: &str = "terra1oracle";
const KEEPER: &str = "terra1keeper";
const NOW: i64 = 1_650_000_300;
const QUOTED_AT: i64 = 1_650_000_000;

fn detail(asset: &str, collateral_ratio: &str, short: &str, cash: &str) -> Value {
    json!({
        "state": {
            "collateral_ratio": collateral_ratio,
            "mirror_asset_short_amount": short,
            "mirror_asset_long_amount": "100",
            "uusd_value": "10000"
        },
        "target_collateral_ratio_range": {"min": "2.3", "max": "2.7"},
        "unclaimed_short_proceeds_uusd_amount": "0",
        "claimable_short_proceeds_uusd_amount": "0",
        "claimable_mir_reward_in_uusd": "0",
        "claimable_spec_reward_in_uusd": "0",
        "uusd_balance": cash,
        "mirror_asset_cw20_addr": asset
    })
}

/// In-memory position manager, position contracts and oracle.
struct FakeLedger {
    /// `None` entries are ids whose lookup always fails.
    positions: Vec<Option<Value>>,
    quotes: HashMap<&'static str, i64>,
    count_available: bool,
    registry_available: bool,
    panic_on_info: bool,
}

impl FakeLedger {
    fn standard() -> Self {
        Self {
            positions: vec![
                Some(json!({"detailed_info": detail("terra1aapl", "2.2", "100", "0")})),
                Some(json!({"detailed_info": null})),
                Some(json!({"detailed_info": detail("terra1aapl", "2.5", "100", "50")})),
                Some(json!({"detailed_info": detail("terra1aapl", "2.5", "120", "0")})),
                None,
                Some(json!({"detailed_info": detail("terra1tsla", "2.0", "100", "0")})),
                Some(json!({"detailed_info": detail("terra1aapl", "2.5", "100", "900")})),
            ],
            quotes: HashMap::from([("terra1aapl", QUOTED_AT)]),
            count_available: true,
            registry_available: true,
            panic_on_info: false,
        }
    }
}

#[async_trait]
impl LedgerQuery for FakeLedger {
    async fn query_raw(&self, contract: &str, msg: &Value) -> Result<Value, QueryError> {
        if contract == ORACLE {
            let asset = msg["price"]["base_asset"].as_str().unwrap_or_default();
            return match self.quotes.get(asset) {
                Some(&ts) => Ok(json!({"rate": "1", "last_updated_base": ts, "last_updated_quote": ts})),
                None => Err(QueryError::Transport("oracle timeout".to_string())),
            };
        }
        if msg.get("get_next_position_id").is_some() {
            if !self.count_available {
                return Err(QueryError::Transport("lcd unreachable".to_string()));
            }
            return Ok(json!({"next_position_id": self.positions.len().to_string()}));
        }
        if msg.get("get_context").is_some() {
            if !self.registry_available {
                return Err(QueryError::Transport("registry timeout".to_string()));
            }
            return Ok(json!({"controller": "terra1controller", "position_code_id": 412}));
        }
        if let Some(id) = msg["get_position_contract"]["position_id"].as_str() {
            let index: usize = id.parse().unwrap();
            return match self.positions[index] {
                Some(_) => Ok(json!({"contract": format!("terra1pos{id}")})),
                None => Err(QueryError::Transport("connection reset".to_string())),
            };
        }
        if self.panic_on_info {
            panic!("ledger fake poisoned");
        }
        let index: usize = contract.trim_start_matches("terra1pos").parse().unwrap();
        Ok(self.positions[index].clone().unwrap())
    }
}

struct FakeAccounts {
    available: bool,
}

#[async_trait]
impl AccountSource for FakeAccounts {
    async fn account(&self, address: &str) -> Result<AccountInfo, QueryError> {
        assert_eq!(address, KEEPER);
        if !self.available {
            return Err(QueryError::Transport("account endpoint down".to_string()));
        }
        Ok(AccountInfo {
            account_number: 88,
            sequence: 17,
        })
    }
}

#[derive(Default)]
struct FakeChain {
    received: Mutex<Vec<SignedTx>>,
}

#[async_trait]
impl TxBroadcaster for FakeChain {
    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastOutcome, BroadcastError> {
        self.received.lock().unwrap().push(tx.clone());
        Ok(BroadcastOutcome::Included {
            txhash: format!("HASH{}", tx.sequence),
            height: 100 + tx.sequence,
        })
    }
}

struct FakeSigner;

impl TxSigner for FakeSigner {
    fn address(&self) -> &str {
        KEEPER
    }

    fn sign(&self, msgs: &[LedgerMsg], memo: &str, sequence: u64) -> Result<SignedTx, SigningError> {
        Ok(SignedTx {
            sequence,
            memo: memo.to_string(),
            msg_count: msgs.len(),
            body: serde_json::to_value(msgs).unwrap(),
        })
    }
}

#[derive(Default)]
struct CapturingSink {
    published: Mutex<Vec<(MetricDimension, Vec<MetricDatum>)>>,
}

#[async_trait]
impl MetricsSink for CapturingSink {
    async fn publish(&self, dimension: &MetricDimension, data: &[MetricDatum]) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((dimension.clone(), data.to_vec()));
        Ok(())
    }
}

impl CapturingSink {
    fn value(&self, counter: Counter) -> u64 {
        let published = self.published.lock().unwrap();
        published[0]
            .1
            .iter()
            .find(|d| d.name == counter.name())
            .map(|d| d.value)
            .unwrap()
    }
}

fn params(batch_size: usize) -> RunParams {
    RunParams {
        network: "testnet".to_string(),
        targets: NetworkConfig {
            lcd_url: "http://localhost:1317".to_string(),
            chain_id: "bombay-12".to_string(),
            position_manager: MANAGER.to_string(),
            oracle: ORACLE.to_string(),
            keeper_address: KEEPER.to_string(),
            tracked_assets: vec![
                TrackedAsset {
                    address: "terra1aapl".to_string(),
                    label: "mAAPL".to_string(),
                },
                TrackedAsset {
                    address: "terra1tsla".to_string(),
                    label: "mTSLA".to_string(),
                },
            ],
        },
        tolerances: Tolerances {
            delta: dec!(0.05),
            balance: dec!(0.05),
            time_secs: 300,
        },
        concurrency_limit: 3,
        batch_size,
        retry: RetryPolicy::new(3, Duration::from_millis(5)),
    }
}

fn signer_factory() -> SignerFactory {
    Box::new(|account: &AccountInfo| {
        assert_eq!(account.account_number, 88);
        Box::new(FakeSigner) as Box<dyn TxSigner>
    })
}

fn keeper(ledger: FakeLedger, chain: Arc<FakeChain>, sink: Arc<CapturingSink>) -> Keeper {
    keeper_with_accounts(ledger, FakeAccounts { available: true }, chain, sink)
}

fn keeper_with_accounts(
    ledger: FakeLedger,
    accounts: FakeAccounts,
    chain: Arc<FakeChain>,
    sink: Arc<CapturingSink>,
) -> Keeper {
    let clock = ManualClock::new(DateTime::from_timestamp(NOW, 0).unwrap());
    Keeper::new(Arc::new(ledger), Arc::new(accounts), chain, sink).with_clock(Arc::new(clock))
}

fn assert_single_zero_flush(sink: &CapturingSink) {
    let published = sink.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1.len(), Counter::ALL.len());
    assert!(published[0].1.iter().all(|d| d.value == 0));
}

#[tokio::test]
async fn test_full_run_rebalances_and_meters() {
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper(FakeLedger::standard(), Arc::clone(&chain), Arc::clone(&sink));

    let summary = keeper.run(&params(2), signer_factory()).await.unwrap();

    assert_eq!(summary.positions_total, 7);
    assert_eq!(summary.positions_open, 5);
    assert_eq!(summary.actions, 3);
    assert_eq!(summary.dispatch.next_sequence, 19);

    let received = chain.received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].sequence, 17);
    assert_eq!(received[0].memo, "0,terra1aapl,CRL;3,terra1aapl,DL");
    assert_eq!(received[0].msg_count, 4);
    assert_eq!(received[1].sequence, 18);
    assert_eq!(received[1].memo, "6,terra1aapl,BAL");
    assert_eq!(received[1].body[0]["migrate"]["new_code_id"], 412);
    assert_eq!(received[1].body[1]["execute"]["contract"], "terra1pos6");

    assert_eq!(sink.published.lock().unwrap()[0].0.value, "testnet");
    assert_eq!(sink.value(Counter::PositionsTotal), 7);
    assert_eq!(sink.value(Counter::PositionsClosed), 1);
    assert_eq!(sink.value(Counter::PositionsEvaluated), 5);
    assert_eq!(sink.value(Counter::PositionFetchFailures), 1);
    assert_eq!(sink.value(Counter::OracleFetchFailures), 1);
    assert_eq!(sink.value(Counter::VerdictsCrl), 1);
    assert_eq!(sink.value(Counter::VerdictsDl), 1);
    assert_eq!(sink.value(Counter::VerdictsBal), 1);
    assert_eq!(sink.value(Counter::VerdictsNa), 2);
    assert_eq!(sink.value(Counter::BatchesAttempted), 2);
    assert_eq!(sink.value(Counter::TxSuccesses), 2);
    assert_eq!(sink.value(Counter::PositionsRebalanced), 3);
    assert_eq!(summary.counter(Counter::PositionsRebalanced), 3);
}

#[tokio::test]
async fn test_closed_positions_never_produce_verdicts() {
    let ledger = FakeLedger {
        positions: vec![Some(json!({"detailed_info": null})); 4],
        ..FakeLedger::standard()
    };
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper(ledger, Arc::clone(&chain), Arc::clone(&sink));

    let summary = keeper.run(&params(5), signer_factory()).await.unwrap();

    assert_eq!(summary.positions_open, 0);
    assert!(summary.dispatch.batches.is_empty());
    assert!(chain.received.lock().unwrap().is_empty());
    assert_eq!(sink.value(Counter::PositionsClosed), 4);
    assert_eq!(sink.value(Counter::PositionsEvaluated), 0);
    assert_eq!(sink.value(Counter::VerdictsNa), 0);
}

#[tokio::test]
async fn test_count_failure_is_fatal_but_flushes_full_schema() {
    let ledger = FakeLedger {
        count_available: false,
        ..FakeLedger::standard()
    };
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper(ledger, Arc::clone(&chain), Arc::clone(&sink));

    let result = keeper.run(&params(5), signer_factory()).await;

    assert!(matches!(result, Err(KeeperError::PositionCount(_))));
    assert!(chain.received.lock().unwrap().is_empty());
    assert_single_zero_flush(&sink);
}

#[tokio::test]
async fn test_registry_failure_is_fatal_but_flushes_full_schema() {
    let ledger = FakeLedger {
        registry_available: false,
        ..FakeLedger::standard()
    };
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper(ledger, Arc::clone(&chain), Arc::clone(&sink));

    let result = keeper.run(&params(5), signer_factory()).await;

    assert!(matches!(result, Err(KeeperError::Registry(_))));
    assert!(chain.received.lock().unwrap().is_empty());
    assert_single_zero_flush(&sink);
}

#[tokio::test]
async fn test_account_failure_is_fatal_but_flushes_full_schema() {
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper_with_accounts(
        FakeLedger::standard(),
        FakeAccounts { available: false },
        Arc::clone(&chain),
        Arc::clone(&sink),
    );

    let result = keeper.run(&params(5), signer_factory()).await;

    assert!(matches!(result, Err(KeeperError::Account(_))));
    assert!(chain.received.lock().unwrap().is_empty());
    assert_single_zero_flush(&sink);
}

#[tokio::test]
async fn test_invalid_params_still_flush() {
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper(FakeLedger::standard(), chain, Arc::clone(&sink));

    let result = keeper.run(&params(0), signer_factory()).await;

    assert!(matches!(result, Err(KeeperError::InvalidParams(_))));
    assert_eq!(sink.published.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_panic_inside_run_still_flushes() {
    let ledger = FakeLedger {
        panic_on_info: true,
        ..FakeLedger::standard()
    };
    let chain = Arc::new(FakeChain::default());
    let sink = Arc::new(CapturingSink::default());
    let keeper = keeper(ledger, chain, Arc::clone(&sink));
    let params = params(5);

    let outcome = AssertUnwindSafe(keeper.run(&params, signer_factory()))
        .catch_unwind()
        .await;

    assert!(outcome.is_err());
    let published = sink.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0.value, "testnet");
}
