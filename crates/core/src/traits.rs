use crate::ledger::{
    AccountInfo, BroadcastError, BroadcastOutcome, LedgerMsg, QueryError, SignedTx, SigningError,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Read-only smart contract queries.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn query_raw(
        &self,
        contract: &str,
        msg: &serde_json::Value,
    ) -> Result<serde_json::Value, QueryError>;
}

/// Local, deterministic transaction signing.
pub trait TxSigner: Send + Sync {
    /// Address the signed transactions are sent from.
    fn address(&self) -> &str;

    /// # Errors
    ///
    /// Returns an error if the transaction cannot be encoded or signed.
    fn sign(&self, msgs: &[LedgerMsg], memo: &str, sequence: u64) -> Result<SignedTx, SigningError>;
}

#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    /// Submits a signed transaction. A chain-level rejection is an `Ok` outcome.
    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastOutcome, BroadcastError>;
}

#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn account(&self, address: &str) -> Result<AccountInfo, QueryError>;
}

/// Runs a query and decodes its result into `T`.
///
/// # Errors
///
/// Returns the query's own error, or [`QueryError::Decode`] if the result has an unexpected shape.
pub async fn query_as<T, Q>(ledger: &Q, contract: &str, msg: &serde_json::Value) -> Result<T, QueryError>
where
    T: DeserializeOwned,
    Q: LedgerQuery + ?Sized,
{
    let raw = ledger.query_raw(contract, msg).await?;
    serde_json::from_value(raw).map_err(|e| QueryError::Decode(format!("{contract}: {e}")))
}
