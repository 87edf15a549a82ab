//! Convenient glob import for the common surface.
//!
//! ```
//! use exchange_core::prelude::*;
//! ```

pub use crate::account::{
    AccountEngine, AccountError, AssetBalance, BalanceSnapshot, Command, CommandKind, FillEvent,
    SnapshotStore,
};
pub use crate::book::{
    BookSnapshot, DepthView, Order, OrderBook, OrderKind, OrderStatus, Side, Trade,
};
pub use crate::config::{AccountConfig, EngineConfig, RiskConfig};
pub use crate::engine::{
    EngineError, EngineEvent, EventMask, MatchingEngine, OrderRequest, SyncMode,
};
pub use crate::risk::{
    LiquidationEngine, LiquidationExecutor, LiquidationResult, LiquidationTask, Position,
    RiskInput, RiskLevel, RiskScanner, RiskTierIndex, UserDataProvider,
};
pub use crate::types::{OrderId, PRICE_SCALE, RATE_SCALE, TradeId, UserId};
