//! Shared primitive types: scaled fixed-point arithmetic and id generation.

mod fixed;
mod ids;

pub use fixed::{
    PRICE_SCALE, RATE_SCALE, FixedPointError, from_f64_checked, mul_div, notional, to_f64,
};
pub use ids::{IdSequence, OrderId, TradeId, UserId};
