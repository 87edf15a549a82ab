//! Matching engine driver: a single consumer that owns one order book and
//! its WAL.
//!
//! Commands arrive through two bounded channels (orders and cancels, with
//! cancels drained first), are logged write-ahead, executed against the
//! book, and fanned out as events through the dispatcher. Submission uses
//! non-blocking try-sends: a saturated queue surfaces as
//! [`EngineError::QueueFull`] and the caller decides whether to retry.

use super::checkpoint::{remove_older_checkpoints, write_checkpoint};
use super::codec::WalEntry;
use super::error::EngineError;
use super::events::{EngineEvent, EventHandler, EventMask, EventSender, spawn_dispatcher};
use super::recovery::recover;
use super::wal::Wal;
use crate::book::{DepthView, ExecutionReport, Order, OrderBook, OrderKind, OrderStatus, Side};
use crate::config::EngineConfig;
use crate::types::{IdSequence, OrderId, UserId};
use crate::utils::current_time_nanos;
use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// An order submission. The engine assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Submitting user.
    pub user_id: UserId,
    /// Buy or Sell.
    pub side: Side,
    /// Order type.
    pub kind: OrderKind,
    /// Limit price (`PRICE_SCALE`-scaled); ignored for market orders.
    pub price: i64,
    /// Quantity (`PRICE_SCALE`-scaled).
    pub qty: i64,
}

/// Monotonic operation counters, updated by the matcher thread and read by
/// anyone.
#[derive(Debug, Default)]
pub struct EngineStats {
    orders_submitted: AtomicU64,
    orders_accepted: AtomicU64,
    orders_rejected: AtomicU64,
    orders_canceled: AtomicU64,
    trades: AtomicU64,
    events_dropped: Arc<AtomicU64>,
}

/// Plain-value copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStatsSnapshot {
    /// Orders accepted into the submission queue.
    pub orders_submitted: u64,
    /// Orders that passed validation and entered matching.
    pub orders_accepted: u64,
    /// Orders refused by validation or order-type policy.
    pub orders_rejected: u64,
    /// Cancellations applied (explicit or remainder policy).
    pub orders_canceled: u64,
    /// Trades executed.
    pub trades: u64,
    /// Advisory events dropped on queue saturation.
    pub events_dropped: u64,
}

impl EngineStats {
    fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            orders_submitted: self.orders_submitted.load(Ordering::Relaxed),
            orders_accepted: self.orders_accepted.load(Ordering::Relaxed),
            orders_rejected: self.orders_rejected.load(Ordering::Relaxed),
            orders_canceled: self.orders_canceled.load(Ordering::Relaxed),
            trades: self.trades.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// A per-symbol matching engine: one matcher thread, one dispatcher thread.
pub struct MatchingEngine {
    config: EngineConfig,
    order_tx: Sender<Order>,
    order_rx: Option<Receiver<Order>>,
    cancel_tx: Sender<OrderId>,
    cancel_rx: Option<Receiver<OrderId>>,
    event_tx: Option<Sender<EngineEvent>>,
    event_rx: Option<Receiver<EngineEvent>>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Option<Receiver<()>>,
    handlers: Vec<(EventMask, EventHandler)>,
    book: Option<OrderBook>,
    wal: Option<Wal>,
    depth: DepthView,
    order_ids: Arc<IdSequence>,
    stats: Arc<EngineStats>,
    running: Arc<AtomicBool>,
    matcher_handle: Option<JoinHandle<()>>,
    dispatcher_handle: Option<JoinHandle<()>>,
}

impl MatchingEngine {
    /// Recovers state from `config.wal_dir` and prepares (but does not
    /// start) the engine.
    ///
    /// # Errors
    /// Returns [`EngineError::Wal`] if the WAL or a checkpoint is corrupt;
    /// the engine refuses to start on damaged state.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let recovered = recover(&config.wal_dir, &config.symbol, config.depth_levels)?;
        let wal = Wal::open(&config.wal_dir, config.sync_mode, recovered.next_sequence)?;

        let order_ids = Arc::new(IdSequence::new(1));
        order_ids.advance_past(recovered.max_order_id);

        let (order_tx, order_rx) = bounded(config.order_queue_size);
        let (cancel_tx, cancel_rx) = bounded(config.order_queue_size);
        let (event_tx, event_rx) = bounded(config.event_queue_size);
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let depth = recovered.book.depth_view();
        info!(
            "engine for {} ready: {} resting orders, wal sequence {}",
            config.symbol,
            recovered.book.order_count(),
            recovered.next_sequence
        );

        Ok(Self {
            config,
            order_tx,
            order_rx: Some(order_rx),
            cancel_tx,
            cancel_rx: Some(cancel_rx),
            event_tx: Some(event_tx),
            event_rx: Some(event_rx),
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
            handlers: Vec::new(),
            book: Some(recovered.book),
            wal: Some(wal),
            depth,
            order_ids,
            stats: Arc::new(EngineStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            matcher_handle: None,
            dispatcher_handle: None,
        })
    }

    /// Registers an event handler. Must be called before [`start`](Self::start).
    pub fn register_handler(&mut self, mask: EventMask, handler: EventHandler) {
        self.handlers.push((mask, handler));
    }

    /// Spawns the matcher and dispatcher threads.
    ///
    /// # Errors
    /// Returns [`EngineError::Closed`] if the engine was already started or
    /// stopped.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let (Some(book), Some(wal), Some(order_rx), Some(cancel_rx), Some(shutdown_rx), Some(event_rx)) = (
            self.book.take(),
            self.wal.take(),
            self.order_rx.take(),
            self.cancel_rx.take(),
            self.shutdown_rx.take(),
            self.event_rx.take(),
        ) else {
            return Err(EngineError::Closed);
        };
        let Some(event_tx) = self.event_tx.clone() else {
            return Err(EngineError::Closed);
        };

        self.dispatcher_handle = Some(spawn_dispatcher(
            self.config.symbol.clone(),
            event_rx,
            std::mem::take(&mut self.handlers),
        ));

        let events = EventSender::new(event_tx, Arc::clone(&self.stats.events_dropped));
        let mut matcher = Matcher {
            book,
            wal,
            config: self.config.clone(),
            events,
            stats: Arc::clone(&self.stats),
            trade_ids: IdSequence::new(1),
            entries_since_checkpoint: 0,
        };

        let symbol = self.config.symbol.clone();
        let handle = std::thread::Builder::new()
            .name(format!("matcher-{symbol}"))
            .spawn(move || matcher.run(order_rx, cancel_rx, shutdown_rx))
            .map_err(|e| EngineError::Wal(super::error::WalError::Io {
                message: format!("failed to spawn matcher thread: {e}"),
                path: None,
            }))?;
        self.matcher_handle = Some(handle);
        self.running.store(true, Ordering::Release);
        info!("engine for {} started", self.config.symbol);
        Ok(())
    }

    /// Assigns an id and enqueues an order. Non-blocking.
    ///
    /// # Errors
    /// [`EngineError::Closed`] after stop, [`EngineError::QueueFull`] when
    /// the submission queue is saturated (the caller may back off and
    /// retry).
    pub fn submit_order(&self, request: OrderRequest) -> Result<OrderId, EngineError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        let order = Order {
            id: OrderId(self.order_ids.next()),
            user_id: request.user_id,
            symbol: self.config.symbol.clone(),
            side: request.side,
            kind: request.kind,
            price: if request.kind == OrderKind::Market {
                0
            } else {
                request.price
            },
            qty: request.qty,
            filled_qty: 0,
            status: OrderStatus::New,
            created_at: current_time_nanos(),
        };
        let id = order.id;
        match self.order_tx.try_send(order) {
            Ok(()) => {
                self.stats.orders_submitted.fetch_add(1, Ordering::Relaxed);
                Ok(id)
            }
            Err(TrySendError::Full(_)) => Err(EngineError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::Closed),
        }
    }

    /// Enqueues a cancellation. Non-blocking.
    ///
    /// # Errors
    /// Same failure modes as [`submit_order`](Self::submit_order).
    pub fn submit_cancel(&self, order_id: OrderId) -> Result<(), EngineError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(EngineError::Closed);
        }
        match self.cancel_tx.try_send(order_id) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EngineError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::Closed),
        }
    }

    /// The current depth snapshot.
    pub fn depth(&self) -> Arc<crate::book::BookSnapshot> {
        self.depth.load()
    }

    /// A cloneable snapshot reader for other threads.
    pub fn depth_view(&self) -> DepthView {
        self.depth.clone()
    }

    /// Current operation counters.
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Signals shutdown, drains in-flight work, fsyncs the WAL, and joins
    /// both threads. Idempotent.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.matcher_handle.take()
            && handle.join().is_err()
        {
            error!("matcher thread for {} panicked", self.config.symbol);
        }
        // Dropping the last event sender lets the dispatcher drain and exit.
        self.event_tx = None;
        if let Some(handle) = self.dispatcher_handle.take()
            && handle.join().is_err()
        {
            error!("dispatcher thread for {} panicked", self.config.symbol);
        }
        info!("engine for {} stopped", self.config.symbol);
    }
}

impl Drop for MatchingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the matcher thread.
struct Matcher {
    book: OrderBook,
    wal: Wal,
    config: EngineConfig,
    events: EventSender,
    stats: Arc<EngineStats>,
    trade_ids: IdSequence,
    entries_since_checkpoint: u64,
}

impl Matcher {
    fn run(
        &mut self,
        order_rx: Receiver<Order>,
        cancel_rx: Receiver<OrderId>,
        shutdown_rx: Receiver<()>,
    ) {
        loop {
            // Biased toward cancels: they release locked funds and queue
            // positions, and are strictly cheaper than matching.
            while let Ok(order_id) = cancel_rx.try_recv() {
                self.handle_cancel(order_id);
            }
            crossbeam::select! {
                recv(shutdown_rx) -> _ => break,
                recv(cancel_rx) -> msg => {
                    if let Ok(order_id) = msg {
                        self.handle_cancel(order_id);
                    }
                }
                recv(order_rx) -> msg => {
                    if let Ok(order) = msg {
                        self.handle_order(order);
                    }
                }
            }
        }

        // Drain whatever was already accepted before the stop signal.
        while let Ok(order_id) = cancel_rx.try_recv() {
            self.handle_cancel(order_id);
        }
        while let Ok(order) = order_rx.try_recv() {
            self.handle_order(order);
        }
        if let Err(e) = self.wal.sync() {
            error!("final wal sync failed: {e}");
        }
        debug!("matcher for {} exited", self.config.symbol);
    }

    fn handle_order(&mut self, order: Order) {
        // Write-then-apply: the entry must be on the log before the book
        // mutates, so a crash in between converges on replay.
        let entry = WalEntry::PlaceOrder(order.clone());
        if let Err(e) = self
            .wal
            .append(entry.kind(), &entry.encode_data(), order.created_at)
        {
            error!("wal append failed, rejecting order {}: {e}", order.id);
            self.reject(order, format!("wal append failed: {e}"));
            return;
        }

        let submitted = order.clone();
        match self.book.execute(order, &self.trade_ids, current_time_nanos()) {
            Ok(report) => self.emit_execution(report),
            Err(e) => self.reject(submitted, e.to_string()),
        }

        self.after_mutation();
    }

    fn handle_cancel(&mut self, order_id: OrderId) {
        let entry = WalEntry::CancelOrder(order_id);
        if let Err(e) = self
            .wal
            .append(entry.kind(), &entry.encode_data(), current_time_nanos())
        {
            error!("wal append failed, dropping cancel {}: {e}", order_id);
            return;
        }

        match self.book.cancel(order_id) {
            Ok(order) => {
                self.stats.orders_canceled.fetch_add(1, Ordering::Relaxed);
                self.events.send_critical(EngineEvent::OrderCanceled { order });
            }
            Err(e) => {
                // Normal race: the order filled before the cancel arrived.
                debug!("cancel {} missed: {e}", order_id);
            }
        }

        self.after_mutation();
    }

    fn emit_execution(&mut self, report: ExecutionReport) {
        if report.order.status == OrderStatus::Rejected {
            let reason = match report.order.kind {
                OrderKind::Fok => "insufficient crossing depth for fill-or-kill".to_string(),
                OrderKind::PostOnly => "post-only order would cross".to_string(),
                _ => "rejected".to_string(),
            };
            self.reject(report.order, reason);
            return;
        }

        self.stats.orders_accepted.fetch_add(1, Ordering::Relaxed);
        self.events.send_critical(EngineEvent::OrderAccepted {
            order: report.order.clone(),
        });
        for trade in report.result.trades {
            self.stats.trades.fetch_add(1, Ordering::Relaxed);
            self.events.send_critical(EngineEvent::Trade(trade));
        }
        if !report.rested && report.order.status == OrderStatus::Canceled {
            self.stats.orders_canceled.fetch_add(1, Ordering::Relaxed);
            self.events
                .send_critical(EngineEvent::OrderCanceled { order: report.order });
        }
    }

    fn reject(&mut self, mut order: Order, reason: String) {
        order.status = OrderStatus::Rejected;
        self.stats.orders_rejected.fetch_add(1, Ordering::Relaxed);
        self.events
            .send_critical(EngineEvent::OrderRejected { order, reason });
    }

    fn after_mutation(&mut self) {
        self.book.update_snapshot();
        self.events.send_advisory(EngineEvent::Depth {
            snapshot: self.book.snapshot(),
        });

        self.entries_since_checkpoint += 1;
        if self.entries_since_checkpoint >= self.config.checkpoint_interval {
            self.take_checkpoint();
        }
    }

    fn take_checkpoint(&mut self) {
        let cutoff = self.wal.next_sequence().saturating_sub(1);
        let orders: Vec<&Order> = self.book.resting_orders().collect();
        if let Err(e) = write_checkpoint(&self.config.wal_dir, cutoff, orders.into_iter()) {
            // The WAL still covers everything; retry at the next interval.
            error!("checkpoint at sequence {cutoff} failed: {e}");
            return;
        }
        if let Err(e) = self.wal.truncate() {
            error!("wal truncation after checkpoint {cutoff} failed: {e}");
            return;
        }
        let marker = WalEntry::Checkpoint { cutoff };
        if let Err(e) = self
            .wal
            .append(marker.kind(), &marker.encode_data(), current_time_nanos())
        {
            warn!("checkpoint marker append failed: {e}");
        }
        if let Err(e) = remove_older_checkpoints(&self.config.wal_dir, cutoff) {
            warn!("old checkpoint cleanup failed: {e}");
        }
        self.entries_since_checkpoint = 0;
        debug!("checkpoint taken at sequence {cutoff}");
    }
}
