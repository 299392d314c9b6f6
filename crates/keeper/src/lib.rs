pub mod dispatcher;
pub mod error;
pub mod fetch;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod positions;
pub mod queries;
pub mod sink;

pub use dispatcher::{sync_msg, BatchDispatcher, BatchOutcome, BatchReport, DispatchReport};
pub use error::KeeperError;
pub use fetch::FetchContext;
pub use oracle::fetch_oracle_quotes;
pub use pipeline::{Keeper, RunParams, RunSummary, SignerFactory};
pub use policy::{evaluate, rebalance_msg, PolicyContext, ReasonCode, RebalanceVerdict};
pub use positions::{fetch_position_count, fetch_positions, fetch_registry, open_positions};
pub use queries::StrategyRegistry;
pub use sink::HttpMetricsSink;
