//! Contract query payloads and their decoded responses.
//!
//! Every query the keeper issues has an explicit response type here, so a
//! contract returning an unexpected shape fails at this boundary with
//! [`QueryError::Decode`] instead of deep inside the policy.

use chrono::{DateTime, Utc};
use neutral_keeper_core::{
    OracleQuote, PositionDetail, QueryError, TargetRange, TrackedAsset,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

/// Denomination the oracle quotes every tracked asset against.
pub const QUOTE_DENOM: &str = "uusd";

// =============================================================================
// Payloads
// =============================================================================

#[must_use]
pub fn next_position_id() -> Value {
    json!({"get_next_position_id": {}})
}

#[must_use]
pub fn strategy_registry() -> Value {
    json!({"get_context": {}})
}

#[must_use]
pub fn position_contract(position_id: u64) -> Value {
    json!({"get_position_contract": {"position_id": position_id.to_string()}})
}

#[must_use]
pub fn position_info() -> Value {
    json!({"get_position_info": {}})
}

#[must_use]
pub fn oracle_price(asset: &str) -> Value {
    json!({"price": {"base_asset": asset, "quote_asset": QUOTE_DENOM}})
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NextPositionIdResponse {
    pub next_position_id: String,
}

impl NextPositionIdResponse {
    /// Exclusive upper bound of the position id range.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the id is not an integer that fits in `u64`.
    pub fn upper_bound(&self) -> Result<u64, QueryError> {
        self.next_position_id.parse().map_err(|e| {
            QueryError::Decode(format!("next_position_id '{}': {e}", self.next_position_id))
        })
    }
}

/// Strategy-wide settings published by the position manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrategyRegistry {
    pub controller: String,
    /// Code id every position contract is migrated to before it is touched.
    pub position_code_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct PositionContractResponse {
    pub contract: String,
}

#[derive(Debug, Deserialize)]
pub struct PositionInfoResponse {
    pub detailed_info: Option<RawPositionDetail>,
}

#[derive(Debug, Deserialize)]
pub struct RawRange {
    #[serde(with = "rust_decimal::serde::str")]
    pub min: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RawPositionState {
    #[serde(with = "rust_decimal::serde::str")]
    pub collateral_ratio: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub mirror_asset_short_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub mirror_asset_long_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub uusd_value: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RawPositionDetail {
    pub state: RawPositionState,
    pub target_collateral_ratio_range: RawRange,
    #[serde(with = "rust_decimal::serde::str")]
    pub unclaimed_short_proceeds_uusd_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub claimable_short_proceeds_uusd_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub claimable_mir_reward_in_uusd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub claimable_spec_reward_in_uusd: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub uusd_balance: Decimal,
    pub mirror_asset_cw20_addr: String,
}

impl From<RawPositionDetail> for PositionDetail {
    fn from(raw: RawPositionDetail) -> Self {
        Self {
            collateral_ratio: raw.state.collateral_ratio,
            target_range: TargetRange {
                min: raw.target_collateral_ratio_range.min,
                max: raw.target_collateral_ratio_range.max,
            },
            short_amount: raw.state.mirror_asset_short_amount,
            long_amount: raw.state.mirror_asset_long_amount,
            uusd_value: raw.state.uusd_value,
            unclaimed_short_proceeds: raw.unclaimed_short_proceeds_uusd_amount,
            claimable_short_proceeds: raw.claimable_short_proceeds_uusd_amount,
            claimable_reward_a: raw.claimable_mir_reward_in_uusd,
            claimable_reward_b: raw.claimable_spec_reward_in_uusd,
            cash_balance: raw.uusd_balance,
            tracked_asset: raw.mirror_asset_cw20_addr,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OraclePriceResponse {
    #[serde(with = "rust_decimal::serde::str")]
    pub rate: Decimal,
    /// Unix seconds of the base asset's last feed.
    pub last_updated_base: i64,
    pub last_updated_quote: i64,
}

impl OraclePriceResponse {
    /// # Errors
    ///
    /// Returns a decode error if the timestamp is out of range.
    pub fn into_quote(self, asset: &TrackedAsset) -> Result<OracleQuote, QueryError> {
        let last_updated_at = DateTime::<Utc>::from_timestamp(self.last_updated_base, 0)
            .ok_or_else(|| {
                QueryError::Decode(format!(
                    "{}: last_updated_base {} out of range",
                    asset.label, self.last_updated_base
                ))
            })?;
        Ok(OracleQuote {
            asset: asset.address.clone(),
            last_updated_at,
            label: asset.label.clone(),
        })
    }
}
