//! Engine event fan-out.
//!
//! The matcher thread emits events into a bounded channel; a dedicated
//! dispatcher thread delivers them serially to registered handlers. Critical
//! events (trades and order lifecycle) are enqueued with a blocking send and
//! are never dropped; advisory events (depth updates) use a non-blocking
//! try-send and are counted when dropped.

use crate::book::{BookSnapshot, Order, Trade};
use bitflags::bitflags;
use crossbeam::channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, trace};

bitflags! {
    /// Event classes a handler can subscribe to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u32 {
        /// Trade executions.
        const TRADES = 1 << 0;

        /// Order acceptances.
        const ACCEPTS = 1 << 1;

        /// Order rejections.
        const REJECTS = 1 << 2;

        /// Order cancellations.
        const CANCELS = 1 << 3;

        /// Advisory depth updates.
        const DEPTH = 1 << 4;

        /// Every critical (non-droppable) class.
        const CRITICAL = Self::TRADES.bits() | Self::ACCEPTS.bits()
                       | Self::REJECTS.bits() | Self::CANCELS.bits();

        /// Everything.
        const ALL = Self::CRITICAL.bits() | Self::DEPTH.bits();
    }
}

/// An event emitted by the matching engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A trade executed.
    Trade(Trade),

    /// An order passed validation and entered matching.
    OrderAccepted {
        /// The order in its post-execution state.
        order: Order,
    },

    /// An order was refused; it never mutated the book.
    OrderRejected {
        /// The rejected order.
        order: Order,
        /// Human-readable reason.
        reason: String,
    },

    /// An order was canceled, either explicitly or by remainder policy.
    OrderCanceled {
        /// The canceled order.
        order: Order,
    },

    /// Advisory: the published depth snapshot changed.
    Depth {
        /// The freshly published snapshot.
        snapshot: Arc<BookSnapshot>,
    },
}

impl EngineEvent {
    /// The subscription class this event belongs to.
    pub fn mask(&self) -> EventMask {
        match self {
            EngineEvent::Trade(_) => EventMask::TRADES,
            EngineEvent::OrderAccepted { .. } => EventMask::ACCEPTS,
            EngineEvent::OrderRejected { .. } => EventMask::REJECTS,
            EngineEvent::OrderCanceled { .. } => EventMask::CANCELS,
            EngineEvent::Depth { .. } => EventMask::DEPTH,
        }
    }

    /// Whether this event may never be dropped.
    pub fn is_critical(&self) -> bool {
        !matches!(self, EngineEvent::Depth { .. })
    }
}

/// Handler invoked serially on the dispatcher thread.
///
/// Handlers must not perform unbounded blocking work; they serialize the
/// dispatcher.
pub type EventHandler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Write side of the event queue, owned by the matcher thread.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: Sender<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    pub(crate) fn new(tx: Sender<EngineEvent>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Blocking enqueue for critical events.
    pub(crate) fn send_critical(&self, event: EngineEvent) {
        debug_assert!(event.is_critical());
        // Only fails when the dispatcher is gone during shutdown.
        let _ = self.tx.send(event);
    }

    /// Non-blocking enqueue for advisory events; drops are counted.
    pub(crate) fn send_advisory(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!("advisory event dropped (total {dropped})");
            }
        }
    }
}

/// The dispatcher thread: drains the event channel and fans out to handlers
/// whose mask matches.
pub(crate) fn spawn_dispatcher(
    symbol: String,
    rx: Receiver<EngineEvent>,
    handlers: Vec<(EventMask, EventHandler)>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("dispatch-{symbol}"))
        .spawn(move || {
            debug!("event dispatcher for {symbol} started");
            while let Ok(event) = rx.recv() {
                let mask = event.mask();
                for (subscribed, handler) in &handlers {
                    if subscribed.contains(mask) {
                        handler(&event);
                    }
                }
            }
            debug!("event dispatcher for {symbol} stopped");
        })
        .unwrap_or_else(|e| panic!("failed to spawn dispatcher thread: {e}"))
}
