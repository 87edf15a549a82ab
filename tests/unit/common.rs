//! Shared helpers for the integration suite.

use exchange_core::{EngineEvent, EventMask, MatchingEngine, Trade};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Polls `predicate` until it holds or the timeout expires.
pub fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

/// Collects every critical event the engine emits.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers this log on `engine` for all critical events.
    pub fn attach(&self, engine: &mut MatchingEngine) {
        let events = Arc::clone(&self.events);
        engine.register_handler(
            EventMask::CRITICAL,
            Arc::new(move |event| events.lock().push(event.clone())),
        );
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::Trade(trade) => Some(trade.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_where(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}
