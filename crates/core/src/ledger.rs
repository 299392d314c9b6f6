//! Ledger-facing values exchanged between the keeper and its external collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Failure of a single read query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request never produced a response (connection, timeout, HTTP status).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered but the contract query itself failed.
    #[error("contract error: {0}")]
    Contract(String),

    /// The response did not match the expected schema.
    #[error("decode error: {0}")]
    Decode(String),
}

impl QueryError {
    /// Schema mismatches will not fix themselves; everything else may.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

/// Local failure to produce a signed transaction.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("signing failed: {0}")]
    Signature(String),
}

/// Network-level broadcast failure. Chain rejections are not errors; see [`BroadcastOutcome`].
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast transport error: {0}")]
    Transport(String),

    #[error("malformed broadcast response: {0}")]
    Response(String),
}

// =============================================================================
// Messages and transactions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

/// A message carried by a keeper transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMsg {
    /// Moves a contract onto a new code id.
    Migrate {
        admin: String,
        contract: String,
        new_code_id: u64,
        migrate_msg: serde_json::Value,
    },
    /// Executes a contract entry point.
    Execute {
        sender: String,
        contract: String,
        execute_msg: serde_json::Value,
        coins: Vec<Coin>,
    },
}

impl LedgerMsg {
    #[must_use]
    pub fn contract(&self) -> &str {
        match self {
            Self::Migrate { contract, .. } | Self::Execute { contract, .. } => contract,
        }
    }

    #[must_use]
    pub const fn is_migrate(&self) -> bool {
        matches!(self, Self::Migrate { .. })
    }
}

/// A transaction signed for one sequence number, ready to broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTx {
    pub sequence: u64,
    pub memo: String,
    pub msg_count: usize,
    /// Wire form of the transaction as the node expects it.
    pub body: serde_json::Value,
}

/// What the chain made of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastOutcome {
    Included { txhash: String, height: u64 },
    Rejected { txhash: Option<String>, code: u32, raw_log: String },
}

impl BroadcastOutcome {
    #[must_use]
    pub const fn is_included(&self) -> bool {
        matches!(self, Self::Included { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}
