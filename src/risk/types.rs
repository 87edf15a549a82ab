//! Risk data model: positions, risk levels, tier entries, and liquidation
//! tasks.
//!
//! Ratios live in `RATE_SCALE` units (10^4) end-to-end; no floating point
//! enters the pipeline. A ratio of 10_000 means maintenance margin equals
//! equity, the liquidation threshold.

use crate::types::{RATE_SCALE, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Ratio value standing in for +∞ (equity ≤ 0 with margin required).
pub const RATIO_INFINITE: i64 = i64::MAX;

/// Ratio at which a user enters the Warning tier (0.70).
pub const WARNING_RATIO: i64 = 7 * RATE_SCALE / 10;
/// Ratio at which a user enters the Danger tier (0.80).
pub const DANGER_RATIO: i64 = 8 * RATE_SCALE / 10;
/// Ratio at which a user enters the Critical tier (0.90).
pub const CRITICAL_RATIO: i64 = 9 * RATE_SCALE / 10;
/// Ratio at which liquidation fires (1.00).
pub const LIQUIDATE_RATIO: i64 = RATE_SCALE;

/// Risk tiers, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RiskLevel {
    /// Below the warning threshold; not tracked by the tier index.
    Safe,
    /// Ratio in [0.70, 0.80).
    Warning,
    /// Ratio in [0.80, 0.90).
    Danger,
    /// Ratio in [0.90, 1.00).
    Critical,
    /// Ratio ≥ 1.00; converted into a liquidation task, not tracked.
    Liquidate,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Warning => "WARNING",
            RiskLevel::Danger => "DANGER",
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::Liquidate => "LIQUIDATE",
        };
        write!(f, "{name}")
    }
}

/// Maps a `RATE_SCALE`-scaled risk ratio onto its tier.
#[inline]
pub fn classify(risk_ratio: i64) -> RiskLevel {
    if risk_ratio >= LIQUIDATE_RATIO {
        RiskLevel::Liquidate
    } else if risk_ratio >= CRITICAL_RATIO {
        RiskLevel::Critical
    } else if risk_ratio >= DANGER_RATIO {
        RiskLevel::Danger
    } else if risk_ratio >= WARNING_RATIO {
        RiskLevel::Warning
    } else {
        RiskLevel::Safe
    }
}

/// One open perpetual position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Owning user.
    pub user_id: UserId,
    /// Contract symbol, e.g. `BTC-USDT`.
    pub symbol: String,
    /// Signed quantity, `PRICE_SCALE`-scaled: long > 0, short < 0.
    pub qty: i64,
    /// Average entry price, `PRICE_SCALE`-scaled.
    pub entry_price: i64,
    /// Margin allocated to the position, `PRICE_SCALE`-scaled.
    pub margin: i64,
    /// Maintenance margin rate, `RATE_SCALE`-scaled.
    pub maintenance_margin_rate: i64,
    /// Realized PnL accumulated so far, `PRICE_SCALE`-scaled.
    pub realized_pnl: i64,
}

/// Everything the risk function needs for one user.
#[derive(Debug, Clone, Default)]
pub struct RiskInput {
    /// The user being evaluated.
    pub user_id: UserId,
    /// Account balance in the margin asset, `PRICE_SCALE`-scaled.
    pub balance: i64,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Mark price per symbol, `PRICE_SCALE`-scaled.
    pub marks: HashMap<String, i64>,
}

/// Pure output of the risk computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskOutput {
    /// Gross notional across positions.
    pub notional: i64,
    /// Sum of unrealized PnL.
    pub total_upnl: i64,
    /// `balance + total_upnl`.
    pub equity: i64,
    /// Maintenance margin requirement.
    pub maint_margin_req: i64,
    /// Initial margin requirement.
    pub init_margin_req: i64,
    /// `maint_margin_req / equity` in `RATE_SCALE` units;
    /// [`RATIO_INFINITE`] when equity ≤ 0.
    pub risk_ratio: i64,
}

/// A tier-index entry for one monitored user.
#[derive(Debug, Clone, Serialize)]
pub struct UserRiskData {
    /// The monitored user.
    pub user_id: UserId,
    /// Latest risk ratio, `RATE_SCALE`-scaled.
    pub risk_ratio: i64,
    /// Latest equity.
    pub equity: i64,
    /// Latest maintenance margin requirement.
    pub maint_margin: i64,
    /// Estimated liquidation price per symbol, when computable.
    pub liq_prices: Vec<(String, i64)>,
    /// The tier this entry currently sits in.
    pub level: RiskLevel,
    /// Symbols the user holds positions in (feeds the price-trigger index).
    pub symbols: Vec<String>,
    /// Last evaluation, milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl UserRiskData {
    /// Assembles a tier entry from one evaluation.
    pub fn from_evaluation(input: &RiskInput, output: &RiskOutput, now_ms: u64) -> Self {
        let mut symbols: Vec<String> = Vec::with_capacity(input.positions.len());
        let mut liq_prices = Vec::with_capacity(input.positions.len());
        for position in &input.positions {
            if !symbols.contains(&position.symbol) {
                symbols.push(position.symbol.clone());
            }
            if let Some(price) = super::math::liquidation_price(position, input.balance) {
                liq_prices.push((position.symbol.clone(), price));
            }
        }
        Self {
            user_id: input.user_id,
            risk_ratio: output.risk_ratio,
            equity: output.equity,
            maint_margin: output.maint_margin_req,
            liq_prices,
            level: classify(output.risk_ratio),
            symbols,
            updated_at: now_ms,
        }
    }
}

/// Work item for the liquidation worker pool.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationTask {
    /// User to liquidate.
    pub user_id: UserId,
    /// Symbol whose move triggered the task.
    pub trigger_symbol: String,
    /// Ratio observed at trigger time.
    pub risk_ratio: i64,
    /// Mark price at trigger time.
    pub trigger_price: i64,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Scheduling priority; equals the risk ratio.
    pub priority: i64,
}

/// Outcome reported by a [`LiquidationExecutor`](super::LiquidationExecutor).
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationResult {
    /// Whether the liquidation completed.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error: Option<String>,
    /// Number of positions closed.
    pub closed_positions: u32,
    /// Net PnL realized by the close-out, `PRICE_SCALE`-scaled.
    pub total_pnl: i64,
    /// Balance left after the close-out, `PRICE_SCALE`-scaled.
    pub remaining_balance: i64,
}
