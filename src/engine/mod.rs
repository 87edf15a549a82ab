//! Matching engine driver, write-ahead log, checkpointing, recovery, and
//! event fan-out.

pub mod checkpoint;
mod codec;
mod driver;
mod error;
mod events;
mod recovery;
pub mod wal;

pub use codec::{KIND_CANCEL_ORDER, KIND_CHECKPOINT, KIND_PLACE_ORDER, WalEntry};
pub use driver::{EngineStats, EngineStatsSnapshot, MatchingEngine, OrderRequest};
pub use error::{EngineError, WalError};
pub use events::{EngineEvent, EventHandler, EventMask};
pub use wal::{SyncMode, Wal, WalRecord};
