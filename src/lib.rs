//! # Exchange Core
//!
//! Core subsystems of a cryptocurrency derivatives exchange backend. Three
//! tightly coupled engines carry the engineering weight:
//!
//! 1. **Matching engine**: a per-symbol limit order book with price-time
//!    priority, a full order-type state machine (limit, market, IOC, FOK,
//!    post-only, GTC), and a CRC-framed write-ahead log with checkpoint
//!    recovery.
//! 2. **Account engine**: a sharded single-writer hot-wallet ledger with
//!    reserve/release/transfer semantics, strict per-command idempotency,
//!    and lock-free copy-on-write balance snapshots.
//! 3. **Risk & liquidation engine**: a tiered risk index fed by a sharded
//!    parallel scanner, a price-triggered fast path over Critical users,
//!    and a bounded worker pool with at-most-one concurrent liquidation per
//!    user.
//!
//! ## Concurrency model
//!
//! Cooperative single-writer cores coordinated through bounded channels,
//! with parallel readers operating on immutable snapshots:
//!
//! - One matcher thread per symbol owns its book and WAL outright. Orders
//!   and cancels arrive through bounded channels with non-blocking
//!   submission; events fan out through a dedicated dispatcher thread.
//!   Critical events (trades, order lifecycle) are never dropped; advisory
//!   depth updates are droppable and counted.
//! - One writer thread per account shard owns its ledgers and idempotency
//!   records; commands for one user always land on the same shard, giving
//!   strict per-user FIFO.
//! - Everything shared is an atomically-published immutable value: depth
//!   snapshots, balance snapshots, and the risk tier maps are all
//!   copy-on-write behind atomic pointer swaps. Readers never block
//!   writers and never observe a partially-updated record.
//!
//! ## Durability
//!
//! Both the matcher and the account shards journal write-then-apply: a
//! command reaches the log before it mutates memory, so a crash between
//! the two converges on replay. Checkpoints bound replay length; a CRC
//! mismatch or truncated record during recovery is fatal by design.
//!
//! ## Fixed point
//!
//! Monetary values are `i64` scaled by 10^8, rates by 10^4. Hot paths
//! never touch floating point; risk arithmetic widens to `i128` and
//! divides last.
//!
//! ## Example
//!
//! ```no_run
//! use exchange_core::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = MatchingEngine::new(EngineConfig::new("BTC-USDT", "/var/lib/exchange/btc"))?;
//! engine.register_handler(
//!     EventMask::TRADES,
//!     std::sync::Arc::new(|event| println!("{event:?}")),
//! );
//! engine.start()?;
//!
//! let order_id = engine.submit_order(OrderRequest {
//!     user_id: 42,
//!     side: Side::Buy,
//!     kind: OrderKind::Limit,
//!     price: 50_000 * PRICE_SCALE,
//!     qty: PRICE_SCALE,
//! })?;
//! println!("submitted {order_id}");
//! engine.stop();
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod book;
pub mod config;
pub mod engine;
pub mod prelude;
pub mod risk;
pub mod types;
mod utils;

pub use account::{
    AccountEngine, AccountError, AssetBalance, BalanceSnapshot, Command, CommandKind, FillEvent,
    SnapshotStore, UserLedger,
};
pub use book::{
    BookError, BookSnapshot, DepthView, ExecutionReport, LevelSnapshot, MatchResult, Order,
    OrderBook, OrderKind, OrderStatus, Side, SnapshotPackage, Trade,
};
pub use config::{AccountConfig, EngineConfig, RiskConfig};
pub use engine::{
    EngineError, EngineEvent, EngineStatsSnapshot, EventHandler, EventMask, MatchingEngine,
    OrderRequest, SyncMode, WalError,
};
pub use risk::{
    LiquidationEngine, LiquidationExecutor, LiquidationResult, LiquidationTask, Position,
    RiskInput, RiskLevel, RiskOutput, RiskScanner, RiskTierIndex, UserDataProvider, UserRiskData,
};
pub use types::{IdSequence, OrderId, PRICE_SCALE, RATE_SCALE, TradeId, UserId};
pub use utils::{current_time_millis, current_time_nanos};
