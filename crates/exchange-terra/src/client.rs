use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use neutral_keeper_core::{
    AccountInfo, AccountSource, BroadcastError, BroadcastOutcome, LedgerQuery, QueryError,
    SignedTx, TxBroadcaster,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Block-mode broadcasts wait for inclusion, so they get a longer budget.
const BROADCAST_TIMEOUT: Duration = Duration::from_secs(120);

type DirectLimiter = RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP client for a Terra LCD endpoint.
#[derive(Clone)]
pub struct LcdClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for LcdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcdClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    query_result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: RawAccount,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    account_number: String,
    sequence: String,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    height: String,
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    raw_log: String,
}

impl LcdClient {
    /// Creates a client limited to `requests_per_second` outgoing requests.
    #[must_use]
    pub fn new(base_url: impl Into<String>, requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, QueryError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| QueryError::Decode(format!("{path}: {e}")))
    }
}

/// A non-2xx answer carrying an error message came from the node's query
/// execution; anything else is a transport problem.
fn classify_failure(status: StatusCode, body: &str) -> QueryError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if !status.is_server_error() || err.message.contains("query") => {
            QueryError::Contract(err.message)
        }
        _ => QueryError::Transport(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl LedgerQuery for LcdClient {
    async fn query_raw(
        &self,
        contract: &str,
        msg: &serde_json::Value,
    ) -> Result<serde_json::Value, QueryError> {
        let encoded = BASE64.encode(msg.to_string());
        let path = format!("/terra/wasm/v1beta1/contracts/{contract}/store");
        let response: StoreResponse = self.get_json(&path, &[("query_msg", encoded.as_str())]).await?;
        Ok(response.query_result)
    }
}

#[async_trait]
impl AccountSource for LcdClient {
    async fn account(&self, address: &str) -> Result<AccountInfo, QueryError> {
        let path = format!("/cosmos/auth/v1beta1/accounts/{address}");
        let response: AccountResponse = self.get_json(&path, &[]).await?;

        let parse = |field: &str, value: &str| {
            value
                .parse::<u64>()
                .map_err(|e| QueryError::Decode(format!("account {field} '{value}': {e}")))
        };
        Ok(AccountInfo {
            account_number: parse("account_number", &response.account.account_number)?,
            sequence: parse("sequence", &response.account.sequence)?,
        })
    }
}

#[async_trait]
impl TxBroadcaster for LcdClient {
    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastOutcome, BroadcastError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}/txs", self.base_url);
        tracing::debug!(sequence = tx.sequence, msgs = tx.msg_count, "Broadcasting transaction");

        let response = self
            .http_client
            .post(&url)
            .json(&tx.body)
            .timeout(BROADCAST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BroadcastError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BroadcastError::Transport(format!("HTTP {status}: {body}")));
        }

        let result: TxResponse = response
            .json()
            .await
            .map_err(|e| BroadcastError::Response(e.to_string()))?;

        match result.code {
            Some(code) if code != 0 => Ok(BroadcastOutcome::Rejected {
                txhash: (!result.txhash.is_empty()).then_some(result.txhash),
                code,
                raw_log: result.raw_log,
            }),
            _ => {
                let height = result.height.parse::<u64>().map_err(|e| {
                    BroadcastError::Response(format!("height '{}': {e}", result.height))
                })?;
                Ok(BroadcastOutcome::Included {
                    txhash: result.txhash,
                    height,
                })
            }
        }
    }
}
