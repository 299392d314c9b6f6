use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A delta-neutral position as recorded by the position manager.
///
/// `detail` is `None` once the position has been closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub contract: String,
    pub detail: Option<PositionDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRange {
    pub min: Decimal,
    pub max: Decimal,
}

/// Snapshot of an open position's state, all amounts in micro-units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub collateral_ratio: Decimal,
    pub target_range: TargetRange,
    pub short_amount: Decimal,
    pub long_amount: Decimal,
    pub uusd_value: Decimal,
    pub unclaimed_short_proceeds: Decimal,
    pub claimable_short_proceeds: Decimal,
    pub claimable_reward_a: Decimal,
    pub claimable_reward_b: Decimal,
    pub cash_balance: Decimal,
    pub tracked_asset: String,
}

impl PositionDetail {
    /// Short proceeds exist but none of them can be claimed yet.
    #[must_use]
    pub fn has_locked_proceeds(&self) -> bool {
        !self.unclaimed_short_proceeds.is_zero() && self.claimable_short_proceeds.is_zero()
    }

    /// Funds sitting in the position that are not deployed.
    #[must_use]
    pub fn idle_balance(&self) -> Decimal {
        self.claimable_short_proceeds
            + self.claimable_reward_a
            + self.claimable_reward_b
            + self.cash_balance
    }
}

/// A position known to be open. Only these reach policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub id: u64,
    pub contract: String,
    pub detail: PositionDetail,
}

impl Position {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.detail.is_none()
    }

    /// Returns the open view of this position, or `None` if it is closed.
    #[must_use]
    pub fn into_open(self) -> Option<OpenPosition> {
        let detail = self.detail?;
        Some(OpenPosition {
            id: self.id,
            contract: self.contract,
            detail,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleQuote {
    pub asset: String,
    pub last_updated_at: DateTime<Utc>,
    pub label: String,
}

impl OracleQuote {
    /// True when the quote is older than `max_age_secs` at `now`.
    ///
    /// A quote stamped in the future is treated as fresh.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        let age = now - self.last_updated_at;
        i64::try_from(max_age_secs).map_or(false, |max| age > chrono::Duration::seconds(max))
    }
}
