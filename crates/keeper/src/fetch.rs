use neutral_keeper_core::{query_as, Clock, LedgerQuery, Metrics, QueryError, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Everything a fan-out phase needs to issue retried, bounded queries.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub ledger: &'a dyn LedgerQuery,
    pub clock: &'a dyn Clock,
    pub metrics: &'a Metrics,
    pub retry: RetryPolicy,
    pub concurrency_limit: usize,
}

impl FetchContext<'_> {
    /// Runs one typed query under the retry budget. Decode errors are not retried.
    ///
    /// # Errors
    ///
    /// Returns the last query error once the budget is spent.
    pub async fn query<T: DeserializeOwned>(
        &self,
        what: &str,
        contract: &str,
        msg: &Value,
    ) -> Result<T, QueryError> {
        self.retry
            .run_if(
                self.clock,
                what,
                || query_as::<T, _>(self.ledger, contract, msg),
                QueryError::is_transient,
            )
            .await
    }
}
