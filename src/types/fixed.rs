//! Scaled-integer fixed-point arithmetic.
//!
//! All monetary quantities (prices, quantities, balances, margins) are `i64`
//! values scaled by [`PRICE_SCALE`] (10^8). Rates (fee rates, margin rates,
//! risk ratios) are scaled by [`RATE_SCALE`] (10^4). Critical-path comparisons
//! never touch floating point; intermediates widen to `i128` and division
//! happens last.

use std::fmt;

/// Scale factor for prices, quantities, and balances (8 decimal places).
pub const PRICE_SCALE: i64 = 100_000_000;

/// Scale factor for rates and ratios (4 decimal places, "basis points × 100").
pub const RATE_SCALE: i64 = 10_000;

/// Largest f64 that converts to a scaled `i64` without overflow.
const MAX_SAFE_F64: f64 = (i64::MAX / PRICE_SCALE) as f64;

/// Errors from fixed-point conversions.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FixedPointError {
    /// The input was NaN.
    NotANumber,
    /// The input was infinite.
    Infinite,
    /// The input is outside the representable range.
    OutOfRange {
        /// The offending value.
        value: f64,
    },
}

impl fmt::Display for FixedPointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixedPointError::NotANumber => write!(f, "fixed-point conversion of NaN"),
            FixedPointError::Infinite => write!(f, "fixed-point conversion of infinity"),
            FixedPointError::OutOfRange { value } => {
                write!(f, "value {value} outside fixed-point range")
            }
        }
    }
}

impl std::error::Error for FixedPointError {}

/// Computes `a * b / d` with an `i128` intermediate, truncating toward zero.
///
/// The workhorse of all scaled arithmetic: the product is formed at full
/// width before the divide, so `mul_div(qty, price, PRICE_SCALE)` never
/// overflows for any pair of in-range operands.
#[inline]
pub fn mul_div(a: i64, b: i64, d: i64) -> i64 {
    debug_assert!(d != 0);
    ((a as i128 * b as i128) / d as i128) as i64
}

/// Gross position size in quote currency: `|qty| * price / PRICE_SCALE`.
#[inline]
pub fn notional(qty: i64, price: i64) -> i64 {
    mul_div(qty.unsigned_abs() as i64, price, PRICE_SCALE)
}

/// Convert an `f64` to a `PRICE_SCALE`-scaled integer, rejecting NaN,
/// infinity, and out-of-range inputs.
///
/// Intended for configuration and test construction only; runtime paths
/// operate on already-scaled integers.
pub fn from_f64_checked(value: f64) -> Result<i64, FixedPointError> {
    if value.is_nan() {
        return Err(FixedPointError::NotANumber);
    }
    if value.is_infinite() {
        return Err(FixedPointError::Infinite);
    }
    if value.abs() > MAX_SAFE_F64 {
        return Err(FixedPointError::OutOfRange { value });
    }
    Ok((value * PRICE_SCALE as f64) as i64)
}

/// Convert a scaled integer back to `f64` for display and diagnostics.
#[inline]
pub fn to_f64(value: i64) -> f64 {
    value as f64 / PRICE_SCALE as f64
}
