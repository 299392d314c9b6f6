//! Rebalance policy.
//!
//! [`evaluate`] is a pure function of the position snapshot, the oracle
//! quotes, the tolerances and the current instant. Rules are checked in a
//! fixed order and the first match wins; anything the policy cannot decide
//! (missing or stale price data) resolves to no action.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use neutral_keeper_core::{Counter, LedgerMsg, OpenPosition, OracleQuote, Tolerances};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReasonCode {
    /// Collateral ratio below the target range.
    #[serde(rename = "CRL")]
    Crl,
    /// Collateral ratio above the target range with no locked short proceeds.
    #[serde(rename = "CRG")]
    Crg,
    /// Short and long legs have drifted apart.
    #[serde(rename = "DL")]
    Dl,
    /// Too much of the position's value is sitting idle.
    #[serde(rename = "BAL")]
    Bal,
    /// No action.
    #[serde(rename = "NA")]
    Na,
}

impl ReasonCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crl => "CRL",
            Self::Crg => "CRG",
            Self::Dl => "DL",
            Self::Bal => "BAL",
            Self::Na => "NA",
        }
    }

    #[must_use]
    pub const fn counter(self) -> Counter {
        match self {
            Self::Crl => Counter::VerdictsCrl,
            Self::Crg => Counter::VerdictsCrg,
            Self::Dl => Counter::VerdictsDl,
            Self::Bal => Counter::VerdictsBal,
            Self::Na => Counter::VerdictsNa,
        }
    }

    #[must_use]
    pub const fn is_action(self) -> bool {
        !matches!(self, Self::Na)
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one open position.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceVerdict {
    pub position_id: u64,
    pub contract: String,
    pub asset: String,
    pub reason: ReasonCode,
    /// Corrective messages; empty for [`ReasonCode::Na`].
    pub messages: Vec<LedgerMsg>,
    pub audit: String,
}

impl RebalanceVerdict {
    #[must_use]
    pub const fn is_action(&self) -> bool {
        self.reason.is_action()
    }

    /// Memo fragment identifying this verdict inside a batch transaction.
    #[must_use]
    pub fn memo_entry(&self) -> String {
        format!("{},{},{}", self.position_id, self.asset, self.reason)
    }
}

/// Inputs shared by every evaluation in a run.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub tolerances: Tolerances,
    pub now: DateTime<Utc>,
    /// Sender of the corrective messages.
    pub keeper_address: &'a str,
}

/// Message asking a position contract to rebalance and reinvest idle funds.
#[must_use]
pub fn rebalance_msg(keeper_address: &str, contract: &str) -> LedgerMsg {
    LedgerMsg::Execute {
        sender: keeper_address.to_string(),
        contract: contract.to_string(),
        execute_msg: json!({"controller": {"rebalance_and_reinvest": {}}}),
        coins: Vec::new(),
    }
}

/// Decides whether `position` needs a rebalance.
#[must_use]
pub fn evaluate(
    position: &OpenPosition,
    quotes: &HashMap<String, OracleQuote>,
    ctx: &PolicyContext<'_>,
) -> RebalanceVerdict {
    let (reason, audit) = decide(position, quotes, ctx);
    let messages = if reason.is_action() {
        vec![rebalance_msg(ctx.keeper_address, &position.contract)]
    } else {
        Vec::new()
    };

    RebalanceVerdict {
        position_id: position.id,
        contract: position.contract.clone(),
        asset: position.detail.tracked_asset.clone(),
        reason,
        messages,
        audit: format!("position {}: {audit}", position.id),
    }
}

fn decide(
    position: &OpenPosition,
    quotes: &HashMap<String, OracleQuote>,
    ctx: &PolicyContext<'_>,
) -> (ReasonCode, String) {
    let d = &position.detail;
    let tol = &ctx.tolerances;

    let Some(quote) = quotes.get(&d.tracked_asset) else {
        return (
            ReasonCode::Na,
            format!("no oracle quote for {}", d.tracked_asset),
        );
    };
    if quote.is_stale(ctx.now, tol.time_secs) {
        return (
            ReasonCode::Na,
            format!(
                "oracle quote for {} last updated {} is older than {}s",
                quote.label, quote.last_updated_at, tol.time_secs
            ),
        );
    }

    if d.collateral_ratio < d.target_range.min {
        return (
            ReasonCode::Crl,
            format!(
                "collateral ratio {} below target min {}",
                d.collateral_ratio, d.target_range.min
            ),
        );
    }

    if d.collateral_ratio > d.target_range.max
        && (d.unclaimed_short_proceeds.is_zero()
            || d.unclaimed_short_proceeds == d.claimable_short_proceeds)
    {
        return (
            ReasonCode::Crg,
            format!(
                "collateral ratio {} above target max {}",
                d.collateral_ratio, d.target_range.max
            ),
        );
    }

    let mut notes = Vec::new();

    match (d.short_amount - d.long_amount).abs().checked_div(d.long_amount) {
        Some(drift) if drift > tol.delta => {
            return (
                ReasonCode::Dl,
                format!("delta drift {drift} exceeds tolerance {}", tol.delta),
            );
        }
        Some(_) => {}
        None => notes.push("long amount is zero, delta check skipped"),
    }

    match d.idle_balance().checked_div(d.uusd_value) {
        Some(idle) if idle > tol.balance && !d.has_locked_proceeds() => {
            return (
                ReasonCode::Bal,
                format!("idle balance ratio {idle} exceeds tolerance {}", tol.balance),
            );
        }
        Some(_) => {}
        None => notes.push("position value is zero, balance check skipped"),
    }

    let mut audit = "within policy".to_string();
    for note in notes {
        audit.push_str("; ");
        audit.push_str(note);
    }
    (ReasonCode::Na, audit)
}
