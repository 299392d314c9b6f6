//! Position discovery and detail fetching.

use neutral_keeper_core::{parallel_map, Counter, OpenPosition, Position, QueryError};

use crate::fetch::FetchContext;
use crate::queries::{
    self, NextPositionIdResponse, PositionContractResponse, PositionInfoResponse,
    StrategyRegistry,
};

/// Exclusive upper bound of the position id range.
///
/// # Errors
///
/// Returns the query error once the retry budget is spent. Callers treat this as fatal.
pub async fn fetch_position_count(ctx: FetchContext<'_>, manager: &str) -> Result<u64, QueryError> {
    let response: NextPositionIdResponse = ctx
        .query("position count", manager, &queries::next_position_id())
        .await?;
    response.upper_bound()
}

/// # Errors
///
/// Returns the query error once the retry budget is spent. Callers treat this as fatal.
pub async fn fetch_registry(
    ctx: FetchContext<'_>,
    manager: &str,
) -> Result<StrategyRegistry, QueryError> {
    ctx.query("strategy registry", manager, &queries::strategy_registry())
        .await
}

async fn fetch_position(
    ctx: FetchContext<'_>,
    manager: &str,
    id: u64,
) -> Result<Position, QueryError> {
    let handle: PositionContractResponse = ctx
        .query("position contract", manager, &queries::position_contract(id))
        .await?;
    let info: PositionInfoResponse = ctx
        .query("position info", &handle.contract, &queries::position_info())
        .await?;

    Ok(Position {
        id,
        contract: handle.contract,
        detail: info.detailed_info.map(Into::into),
    })
}

/// Fetches every position with an id in `[0, upper_bound)`.
///
/// Ids that still fail after the retry budget are counted, logged and dropped.
/// The result is in id order.
pub async fn fetch_positions(
    ctx: FetchContext<'_>,
    manager: &str,
    upper_bound: u64,
) -> Vec<Position> {
    let results = parallel_map(0..upper_bound, ctx.concurrency_limit, |id| async move {
        (id, fetch_position(ctx, manager, id).await)
    })
    .await;

    let mut positions = Vec::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(position) => positions.push(position),
            Err(e) => {
                ctx.metrics.incr(Counter::PositionFetchFailures);
                tracing::warn!(position_id = id, error = %e, "Failed to fetch position");
            }
        }
    }

    tracing::info!(
        fetched = positions.len(),
        requested = upper_bound,
        "Positions fetched"
    );
    positions
}

/// Drops closed positions, counting and logging each one.
pub fn open_positions(positions: Vec<Position>, ctx: FetchContext<'_>) -> Vec<OpenPosition> {
    positions
        .into_iter()
        .filter_map(|position| {
            let id = position.id;
            let open = position.into_open();
            if open.is_none() {
                ctx.metrics.incr(Counter::PositionsClosed);
                tracing::debug!(position_id = id, "Position closed, skipping");
            }
            open
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use neutral_keeper_core::{LedgerQuery, ManualClock, Metrics, RetryPolicy};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn detail(asset: &str) -> Value {
        json!({
            "state": {
                "collateral_ratio": "2.5",
                "mirror_asset_short_amount": "100",
                "mirror_asset_long_amount": "100",
                "uusd_value": "10000"
            },
            "target_collateral_ratio_range": {"min": "2.3", "max": "2.7"},
            "unclaimed_short_proceeds_uusd_amount": "0",
            "claimable_short_proceeds_uusd_amount": "0",
            "claimable_mir_reward_in_uusd": "0",
            "claimable_spec_reward_in_uusd": "0",
            "uusd_balance": "0",
            "mirror_asset_cw20_addr": asset
        })
    }

    /// Ids 0..5: id 2 is closed, id 3's contract lookup always fails.
    struct PositionLedger;

    #[async_trait]
    impl LedgerQuery for PositionLedger {
        async fn query_raw(&self, contract: &str, msg: &Value) -> Result<Value, QueryError> {
            if msg.get("get_next_position_id").is_some() {
                return Ok(json!({"next_position_id": "5"}));
            }
            if msg.get("get_context").is_some() {
                return Ok(json!({"controller": "terra1controller", "position_code_id": 412}));
            }
            if let Some(id) = msg["get_position_contract"]["position_id"].as_str() {
                return match id {
                    "3" => Err(QueryError::Contract("position not found".to_string())),
                    _ => Ok(json!({"contract": format!("terra1pos{id}")})),
                };
            }
            match contract {
                "terra1pos2" => Ok(json!({"detailed_info": null})),
                _ => Ok(json!({"detailed_info": detail("terra1aapl")})),
            }
        }
    }

    fn context<'a>(
        ledger: &'a dyn LedgerQuery,
        clock: &'a ManualClock,
        metrics: &'a Metrics,
    ) -> FetchContext<'a> {
        FetchContext {
            ledger,
            clock,
            metrics,
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            concurrency_limit: 4,
        }
    }

    #[tokio::test]
    async fn test_count_and_registry() {
        let clock = ManualClock::new(Utc::now());
        let metrics = Metrics::new();
        let ctx = context(&PositionLedger, &clock, &metrics);

        assert_eq!(fetch_position_count(ctx, "terra1manager").await.unwrap(), 5);
        let registry = fetch_registry(ctx, "terra1manager").await.unwrap();
        assert_eq!(registry.position_code_id, 412);
    }

    #[tokio::test]
    async fn test_failures_dropped_and_closed_filtered() {
        let clock = ManualClock::new(Utc::now());
        let metrics = Metrics::new();
        let ctx = context(&PositionLedger, &clock, &metrics);

        let positions = fetch_positions(ctx, "terra1manager", 5).await;
        let ids: Vec<u64> = positions.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 4]);
        assert_eq!(metrics.get(Counter::PositionFetchFailures), 1);

        let open = open_positions(positions, ctx);
        let open_ids: Vec<u64> = open.iter().map(|p| p.id).collect();
        assert_eq!(open_ids, vec![0, 1, 4]);
        assert_eq!(open[2].contract, "terra1pos4");
        assert_eq!(metrics.get(Counter::PositionsClosed), 1);
    }

    #[tokio::test]
    async fn test_empty_range_issues_no_queries() {
        let clock = ManualClock::new(Utc::now());
        let metrics = Metrics::new();
        let ctx = context(&PositionLedger, &clock, &metrics);

        assert!(fetch_positions(ctx, "terra1manager", 0).await.is_empty());
        assert!(clock.sleeps().is_empty());
    }
}
