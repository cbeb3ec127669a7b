//! Notifications for order-feed and chart collaborators.
//!
//! Exchanges and the registry collect [`Event`]s while a call runs and hand them
//! to an [`EventSink`] only once the call has committed. Sink: log (one JSON
//! line per event) or in-memory (tests).

use crate::types::{Address, Amount, OrderId, Side, Timestamp};
use log::{info, log_enabled, Level};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::ledger::lock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ExchangeCreated {
        token: Address,
        exchange: Address,
        starting_price: Amount,
    },
    ImplementationChanged {
        previous: Address,
        current: Address,
    },
    OwnershipTransferred {
        previous: Address,
        current: Address,
    },
    OrderCreated {
        exchange: Address,
        order_id: OrderId,
        trader: Address,
        amount: Amount,
        price: Amount,
        side: Side,
        is_limit: bool,
        date: Timestamp,
    },
    /// A resting order was partly or wholly consumed by a taker.
    OrderFilled {
        exchange: Address,
        order_id: OrderId,
        trader: Address,
        quantity: Amount,
        price: Amount,
        side: Side,
    },
    OrderClosed {
        exchange: Address,
        order_id: OrderId,
        trader: Address,
        amount: Amount,
        price: Amount,
        side: Side,
    },
}

/// Receiver of committed events. Implementations log, store, or forward them.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &Event);
}

/// Writes one JSON line per event through the `log` facade.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: &Event) {
        if !log_enabled!(Level::Info) {
            return;
        }
        if let Ok(line) = serde_json::to_string(event) {
            info!("{}", line);
        }
    }
}

/// In-memory sink that stores events for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: &Event) {
        lock(&self.events).push(event.clone());
    }
}
