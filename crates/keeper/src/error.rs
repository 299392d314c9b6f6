use neutral_keeper_core::{ConfigError, QueryError};
use thiserror::Error;

/// Failures that abort a keeper run before any position is processed.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("failed to fetch position count: {0}")]
    PositionCount(#[source] QueryError),

    #[error("failed to fetch strategy registry: {0}")]
    Registry(#[source] QueryError),

    #[error("failed to fetch keeper account: {0}")]
    Account(#[source] QueryError),

    #[error("invalid run parameters: {0}")]
    InvalidParams(#[from] ConfigError),
}
