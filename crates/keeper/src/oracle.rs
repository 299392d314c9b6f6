//! Oracle freshness fetcher.

use std::collections::HashMap;

use neutral_keeper_core::{parallel_map, Counter, OracleQuote, TrackedAsset};

use crate::fetch::FetchContext;
use crate::queries::{self, OraclePriceResponse};

/// Fetches the latest quote timestamp for every tracked asset.
///
/// Assets whose quote cannot be fetched within the retry budget are counted,
/// logged and left out of the returned map.
pub async fn fetch_oracle_quotes(
    ctx: FetchContext<'_>,
    oracle: &str,
    assets: &[TrackedAsset],
) -> HashMap<String, OracleQuote> {
    let results = parallel_map(assets, ctx.concurrency_limit, |asset| async move {
        let response: Result<OraclePriceResponse, _> = ctx
            .query("oracle price", oracle, &queries::oracle_price(&asset.address))
            .await;
        (asset, response.and_then(|r| r.into_quote(asset)))
    })
    .await;

    let mut quotes = HashMap::with_capacity(results.len());
    for (asset, result) in results {
        match result {
            Ok(quote) => {
                tracing::debug!(
                    asset = %asset.label,
                    last_updated_at = %quote.last_updated_at,
                    "Fetched oracle quote"
                );
                quotes.insert(quote.asset.clone(), quote);
            }
            Err(e) => {
                ctx.metrics.incr(Counter::OracleFetchFailures);
                tracing::warn!(
                    asset = %asset.label,
                    address = %asset.address,
                    error = %e,
                    "Failed to fetch oracle quote"
                );
            }
        }
    }

    tracing::info!(
        fetched = quotes.len(),
        tracked = assets.len(),
        "Oracle quotes fetched"
    );
    quotes
}
