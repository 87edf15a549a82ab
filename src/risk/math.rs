//! Pure risk arithmetic in scaled integers.
//!
//! All intermediates widen to `i128` and division happens last, so the
//! results are deterministic across threads and platforms.

use super::types::{Position, RATIO_INFINITE, RiskInput, RiskOutput};
use crate::types::{PRICE_SCALE, RATE_SCALE};

/// Initial margin requirement as a multiple of maintenance margin.
const INITIAL_MARGIN_MULTIPLIER: i64 = 2;

/// Unrealized PnL of one position at `mark`: `qty * (mark - entry) / P`.
#[inline]
pub fn unrealized_pnl(position: &Position, mark: i64) -> i64 {
    ((position.qty as i128 * (mark - position.entry_price) as i128) / PRICE_SCALE as i128) as i64
}

/// Gross notional of one position at `mark`: `|qty| * mark / P`.
#[inline]
pub fn position_notional(position: &Position, mark: i64) -> i64 {
    ((position.qty.unsigned_abs() as i128 * mark as i128) / PRICE_SCALE as i128) as i64
}

/// Maintenance margin of one position at `mark`: `notional * mmr / R`.
#[inline]
pub fn maintenance_margin(position: &Position, mark: i64) -> i64 {
    ((position_notional(position, mark) as i128 * position.maintenance_margin_rate as i128)
        / RATE_SCALE as i128) as i64
}

/// Evaluates a full account: notional, unrealized PnL, equity, margin
/// requirements, and the risk ratio.
///
/// Positions without a mark price fall back to their entry price (zero
/// unrealized PnL), which understates risk rather than inventing it.
pub fn compute_risk(input: &RiskInput) -> RiskOutput {
    let mut notional = 0i64;
    let mut total_upnl = 0i64;
    let mut maint_margin_req = 0i64;

    for position in &input.positions {
        let mark = input
            .marks
            .get(&position.symbol)
            .copied()
            .unwrap_or(position.entry_price);
        notional += position_notional(position, mark);
        total_upnl += unrealized_pnl(position, mark);
        maint_margin_req += maintenance_margin(position, mark);
    }

    let equity = input.balance + total_upnl;
    let init_margin_req = maint_margin_req.saturating_mul(INITIAL_MARGIN_MULTIPLIER);
    let risk_ratio = if maint_margin_req == 0 {
        0
    } else if equity <= 0 {
        RATIO_INFINITE
    } else {
        ((maint_margin_req as i128 * RATE_SCALE as i128) / equity as i128) as i64
    };

    RiskOutput {
        notional,
        total_upnl,
        equity,
        maint_margin_req,
        init_margin_req,
        risk_ratio,
    }
}

/// Isolated-margin bankruptcy price for a single perpetual position.
///
/// Long: `(qty * entry - balance) / (qty * (1 - mmr))`.
/// Short: `(balance + |qty| * entry) / (|qty| * (1 + mmr))`.
///
/// Returns `None` for a flat position, a degenerate denominator, or a
/// negative result (the position cannot be liquidated by price alone).
pub fn liquidation_price(position: &Position, balance: i64) -> Option<i64> {
    if position.qty == 0 {
        return None;
    }
    let qty = position.qty.unsigned_abs() as i128;
    let entry = position.entry_price as i128;
    let balance = balance as i128;
    let mmr = position.maintenance_margin_rate as i128;
    let p = PRICE_SCALE as i128;
    let r = RATE_SCALE as i128;

    let price = if position.qty > 0 {
        let denominator = qty * (r - mmr);
        if denominator <= 0 {
            return None;
        }
        (qty * entry / p - balance) * p * r / denominator
    } else {
        let denominator = qty * (r + mmr);
        if denominator <= 0 {
            return None;
        }
        (balance + qty * entry / p) * p * r / denominator
    };

    if price <= 0 { None } else { Some(price as i64) }
}
