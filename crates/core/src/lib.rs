pub mod clock;
pub mod config;
pub mod config_loader;
pub mod ledger;
pub mod metrics;
pub mod parallel;
pub mod position;
pub mod retry;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, ConfigError, KeeperConfig, MetricsConfig, NetworkConfig, Tolerances, TrackedAsset,
};
pub use config_loader::ConfigLoader;
pub use ledger::{
    AccountInfo, BroadcastError, BroadcastOutcome, Coin, LedgerMsg, QueryError, SignedTx,
    SigningError,
};
pub use metrics::{Counter, LogMetricsSink, MetricDatum, MetricDimension, Metrics, MetricsSink};
pub use parallel::parallel_map;
pub use position::{OpenPosition, OracleQuote, Position, PositionDetail, TargetRange};
pub use retry::RetryPolicy;
pub use traits::{query_as, AccountSource, LedgerQuery, TxBroadcaster, TxSigner};
