//! Account shard commands.

use crate::types::{TradeId, UserId};
use serde::{Deserialize, Serialize};

/// What a [`Command`] does to its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Move `amount` of `asset` from available to locked.
    Reserve,
    /// Inverse of `Reserve`.
    Release,
    /// Debit the payer's locked `asset` by `amount` and credit the
    /// receiver's `to_asset` available by `to_amount`, deducting `fee` in
    /// `fee_asset` from the payer when positive.
    Transfer,
    /// Credit available funds directly.
    AddBalance,
    /// Debit available funds directly.
    DeductBalance,
}

/// A single account mutation, routed to the shard of `user_id`.
///
/// `cmd_id` is the idempotency key: a shard applies a given id at most once
/// and answers duplicates with
/// [`AccountError::DuplicateCommand`](super::AccountError::DuplicateCommand)
/// without side effects, which is what makes at-least-once delivery from
/// upstream safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Operation to perform.
    pub kind: CommandKind,
    /// Idempotency key, stable across redeliveries.
    pub cmd_id: String,
    /// Primary (payer) user.
    pub user_id: UserId,
    /// Asset acted on.
    pub asset: String,
    /// Amount, `PRICE_SCALE`-scaled.
    pub amount: i64,
    /// Transfer receiver; must route to the payer's shard.
    pub to_user_id: UserId,
    /// Asset credited to the receiver.
    pub to_asset: String,
    /// Amount credited to the receiver.
    pub to_amount: i64,
    /// Fee deducted from the payer's available `fee_asset`; zero disables.
    pub fee: i64,
    /// Asset the fee is charged in.
    pub fee_asset: String,
}

impl Command {
    /// A reserve command for one order's funds.
    pub fn reserve(cmd_id: impl Into<String>, user_id: UserId, asset: &str, amount: i64) -> Self {
        Self {
            kind: CommandKind::Reserve,
            cmd_id: cmd_id.into(),
            user_id,
            asset: asset.to_string(),
            amount,
            to_user_id: 0,
            to_asset: String::new(),
            to_amount: 0,
            fee: 0,
            fee_asset: String::new(),
        }
    }

    /// A release command, the inverse of [`reserve`](Self::reserve).
    pub fn release(cmd_id: impl Into<String>, user_id: UserId, asset: &str, amount: i64) -> Self {
        Self {
            kind: CommandKind::Release,
            ..Self::reserve(cmd_id, user_id, asset, amount)
        }
    }

    /// A direct balance credit.
    pub fn add_balance(
        cmd_id: impl Into<String>,
        user_id: UserId,
        asset: &str,
        amount: i64,
    ) -> Self {
        Self {
            kind: CommandKind::AddBalance,
            ..Self::reserve(cmd_id, user_id, asset, amount)
        }
    }

    /// A direct balance debit.
    pub fn deduct_balance(
        cmd_id: impl Into<String>,
        user_id: UserId,
        asset: &str,
        amount: i64,
    ) -> Self {
        Self {
            kind: CommandKind::DeductBalance,
            ..Self::reserve(cmd_id, user_id, asset, amount)
        }
    }
}

/// One side of a matched trade, as the account engine consumes it.
///
/// Settlement issues two independent idempotent transfers keyed off
/// `trade_id` (`fill_buyer_<tid>` and `fill_seller_<tid>`), so duplicate
/// delivery of the same fill is absorbed per shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    /// The trade being settled.
    pub trade_id: TradeId,
    /// Buyer of the base asset.
    pub buyer: UserId,
    /// Seller of the base asset.
    pub seller: UserId,
    /// Base asset, e.g. `BTC`.
    pub base_asset: String,
    /// Quote asset, e.g. `USDT`.
    pub quote_asset: String,
    /// Execution price, `PRICE_SCALE`-scaled.
    pub price: i64,
    /// Executed base quantity, `PRICE_SCALE`-scaled.
    pub qty: i64,
    /// Fee charged to the buyer in `fee_asset`.
    pub buyer_fee: i64,
    /// Fee charged to the seller in `fee_asset`.
    pub seller_fee: i64,
    /// Asset fees are charged in.
    pub fee_asset: String,
}
