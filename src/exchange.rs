//! Per-token exchange.
//!
//! An [`Exchange`] owns the persistent state of one trading pair and forwards
//! every operation to the logic currently installed behind the registry's
//! [`Beacon`]. Each state-changing call is all-or-nothing: attached value is
//! taken into custody, logic writes its effects, transfers run with the state
//! lock released, and any failure restores the pre-call state, reverses
//! transfers and returns the attached value. Calls are admitted one at a
//! time; a call that re-enters the exchange from inside its own settlement
//! (a payment hook calling back) is rejected.

use crate::error::ExchangeError;
use crate::escrow::Escrow;
use crate::events::{Event, EventSink};
use crate::ledger::{lock, Ledger};
use crate::matching::{CallContext, Execution, ExchangeState, MatchingEngine, Receipt};
use crate::quote::Quote;
use crate::registry::Beacon;
use crate::token::Token;
use crate::types::{Address, Amount, Order, OrderId, Side, Timestamp};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared handle to a registered exchange.
pub type ExchangeHandle = Arc<Exchange>;

/// Who is calling, with how much base currency attached, and when.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Call {
    pub caller: Address,
    pub value: Amount,
    pub timestamp: Timestamp,
}

impl Call {
    pub fn new(caller: Address) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            caller,
            value: 0,
            timestamp,
        }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Admits one call at a time. Other threads wait their turn; a call arriving
/// on the thread that is already inside the exchange is a re-entry.
struct CallGuard<'a> {
    occupant: &'a Mutex<Option<ThreadId>>,
    _admitted: MutexGuard<'a, ()>,
}

impl<'a> CallGuard<'a> {
    fn enter(admission: &'a Mutex<()>, occupant: &'a Mutex<Option<ThreadId>>) -> Result<Self, ExchangeError> {
        let me = thread::current().id();
        if *lock(occupant) == Some(me) {
            return Err(ExchangeError::ReentrantCall);
        }
        let admitted = lock(admission);
        *lock(occupant) = Some(me);
        Ok(Self {
            occupant,
            _admitted: admitted,
        })
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        *lock(self.occupant) = None;
    }
}

pub struct Exchange {
    address: Address,
    token: Arc<dyn Token>,
    ledger: Arc<Ledger>,
    beacon: Beacon,
    sink: Arc<dyn EventSink>,
    state: Mutex<ExchangeState>,
    admission: Mutex<()>,
    occupant: Mutex<Option<ThreadId>>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("address", &self.address)
            .field("token", &self.token.address())
            .finish()
    }
}

impl Exchange {
    pub(crate) fn new(
        address: Address,
        token: Arc<dyn Token>,
        ledger: Arc<Ledger>,
        beacon: Beacon,
        sink: Arc<dyn EventSink>,
        state: ExchangeState,
    ) -> Self {
        Self {
            address,
            token,
            ledger,
            beacon,
            sink,
            state: Mutex::new(state),
            admission: Mutex::new(()),
            occupant: Mutex::new(None),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The token traded against base currency here. Fixed at creation.
    pub fn token(&self) -> Address {
        self.token.address()
    }

    /// Version string of the logic currently behind this exchange.
    pub fn implementation_version(&self) -> Option<String> {
        self.beacon.current().map(|i| i.engine.version().to_string())
    }

    fn logic(&self) -> Result<Arc<dyn MatchingEngine>, ExchangeError> {
        self.beacon
            .current()
            .map(|i| i.engine)
            .ok_or(ExchangeError::ImplementationNotSet)
    }

    /// Places a limit order. Buy orders must attach `amount * price` of base
    /// currency (excess is refunded); sell orders need a token allowance of
    /// at least `amount` for this exchange.
    pub fn submit_limit_order(
        &self,
        call: Call,
        amount: Amount,
        price: Amount,
        side: Side,
    ) -> Result<Receipt, ExchangeError> {
        self.execute(call, "limit", |logic, state, ctx| {
            logic.submit_limit_order(state, ctx, amount, price, side)
        })
    }

    /// Takes resting liquidity on the opposite side, oldest order first. A buy
    /// must attach at least the quoted cost; a sell needs allowance for the
    /// quoted quantity. Any unfilled remainder rests as a market-type order.
    pub fn submit_market_order(
        &self,
        call: Call,
        amount: Amount,
        side: Side,
    ) -> Result<Receipt, ExchangeError> {
        self.execute(call, "market", |logic, state, ctx| {
            logic.submit_market_order(state, ctx, amount, side)
        })
    }

    fn execute<F>(&self, call: Call, kind: &str, op: F) -> Result<Receipt, ExchangeError>
    where
        F: FnOnce(&dyn MatchingEngine, &mut ExchangeState, &CallContext<'_>) -> Result<Execution, ExchangeError>,
    {
        let _guard = CallGuard::enter(&self.admission, &self.occupant)?;
        let logic = self.logic()?;
        let escrow = Escrow::new(&self.ledger, self.token.as_ref(), self.address);
        escrow.attach(call.caller, call.value)?;
        let ctx = CallContext {
            exchange: self.address,
            caller: call.caller,
            value: call.value,
            timestamp: call.timestamp,
            escrow: &escrow,
        };

        let (before, execution) = {
            let mut state = lock(&self.state);
            let before = state.clone();
            match op(logic.as_ref(), &mut *state, &ctx) {
                Ok(execution) => (before, execution),
                Err(e) => {
                    *state = before;
                    drop(state);
                    escrow.detach(call.caller, call.value);
                    warn!(
                        "{} order rejected exchange={} trader={} reason={}",
                        kind, self.address, call.caller, e
                    );
                    return Err(e);
                }
            }
        };

        if let Err(e) = escrow.execute(&execution.transfers) {
            *lock(&self.state) = before;
            escrow.detach(call.caller, call.value);
            warn!(
                "{} order reverted exchange={} trader={} reason={}",
                kind, self.address, call.caller, e
            );
            return Err(e);
        }

        let receipt = execution.receipt;
        info!(
            "{} order settled exchange={} trader={} order_id={} filled={} total_cost={} refund={}",
            kind,
            self.address,
            call.caller,
            receipt.order_id.0,
            receipt.filled,
            receipt.total_cost,
            receipt.refund
        );
        self.publish(&execution.events);
        Ok(receipt)
    }

    fn publish(&self, events: &[Event]) {
        for event in events {
            self.sink.publish(event);
        }
    }

    /// Read-only quote: how much of `side` a request for `amount` would meet,
    /// scanning from order id `start`. `is_market` selects the tradable
    /// (escrow-backed) scope; otherwise every active order is counted.
    pub fn cost(
        &self,
        amount: Amount,
        start: OrderId,
        side: Side,
        is_market: bool,
    ) -> Result<Quote, ExchangeError> {
        let logic = self.logic()?;
        let state = lock(&self.state);
        logic.quote(&state, amount, start, side, is_market)
    }

    /// Price for `amount` units taken from the book by a `taker_side` order;
    /// with an empty opposite side the whole amount is priced at the reference price.
    pub fn estimate(&self, amount: Amount, taker_side: Side) -> Result<Quote, ExchangeError> {
        let quote = self.cost(amount, OrderId(0), taker_side.opposite(), true)?;
        if !quote.is_empty() {
            return Ok(quote);
        }
        let best = self.best_price();
        Ok(Quote {
            available: 0,
            total_cost: amount.checked_mul(best).ok_or(ExchangeError::Overflow)?,
        })
    }

    pub fn get_order(&self, id: OrderId) -> Result<Order, ExchangeError> {
        lock(&self.state)
            .orders
            .get(id)
            .cloned()
            .ok_or(ExchangeError::OrderNotFound(id))
    }

    pub fn get_order_count(&self) -> u64 {
        lock(&self.state).orders.len()
    }

    /// Reference price: the starting price until the first trade, then the
    /// price of the last resting order consumed.
    pub fn best_price(&self) -> Amount {
        lock(&self.state).best_price
    }

    /// Full order history in id order.
    pub fn orders(&self) -> Vec<Order> {
        lock(&self.state).orders.iter().cloned().collect()
    }

    pub fn active_orders(&self, side: Side) -> Vec<Order> {
        lock(&self.state)
            .orders
            .iter()
            .filter(|o| o.active && o.side == side)
            .cloned()
            .collect()
    }

    /// Base currency held in custody by this exchange.
    pub fn escrowed_currency(&self) -> Amount {
        self.ledger.bank.balance_of(&self.address)
    }

    /// Base currency owed to open buy limit orders.
    pub fn escrow_liability(&self) -> Result<Amount, ExchangeError> {
        lock(&self.state).escrow_liability()
    }

    pub fn snapshot(&self) -> ExchangeState {
        lock(&self.state).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventSink;
    use crate::matching::SequentialMatching;
    use crate::registry::Implementation;
    use crate::token::Erc20Token;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn exchange_with(beacon: Beacon) -> (Exchange, Arc<Ledger>, Arc<Erc20Token>, InMemoryEventSink) {
        let _ = env_logger::try_init();
        let ledger = Ledger::new();
        let token = Arc::new(Erc20Token::new(addr(100), addr(1), 10_000));
        let sink = InMemoryEventSink::new();
        let exchange = Exchange::new(
            addr(500),
            token.clone(),
            ledger.clone(),
            beacon,
            Arc::new(sink.clone()),
            ExchangeState::new(7),
        );
        (exchange, ledger, token, sink)
    }

    fn live_beacon() -> Beacon {
        let beacon = Beacon::default();
        beacon.set(Implementation {
            address: addr(900),
            engine: Arc::new(SequentialMatching),
        });
        beacon
    }

    #[test]
    fn call_builder_sets_fields() {
        let call = Call::new(addr(1)).with_value(5).at(42);
        assert_eq!(call.value, 5);
        assert_eq!(call.timestamp, 42);
    }

    #[test]
    fn guard_rejects_nested_entry_on_same_thread() {
        let admission = Mutex::new(());
        let occupant = Mutex::new(None);
        let guard = CallGuard::enter(&admission, &occupant).unwrap();
        assert!(matches!(
            CallGuard::enter(&admission, &occupant),
            Err(ExchangeError::ReentrantCall)
        ));
        drop(guard);
        assert!(CallGuard::enter(&admission, &occupant).is_ok());
    }

    #[test]
    fn calls_from_other_threads_are_serialized() {
        let (exchange, ledger, _, _) = exchange_with(live_beacon());
        let exchange = Arc::new(exchange);
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let exchange = exchange.clone();
                let ledger = ledger.clone();
                thread::spawn(move || {
                    let trader = addr(10 + i);
                    ledger.bank.mint(trader, 1_000).unwrap();
                    for _ in 0..5 {
                        exchange
                            .submit_limit_order(Call::new(trader).with_value(100), 10, 10, Side::Buy)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(exchange.get_order_count(), 20);
        assert_eq!(exchange.escrowed_currency(), 2_000);
        let ids: Vec<u64> = exchange.orders().iter().map(|o| o.id.0).collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn calls_without_implementation_fail() {
        let (exchange, ledger, _, _) = exchange_with(Beacon::default());
        ledger.bank.mint(addr(2), 100).unwrap();
        let err = exchange
            .submit_limit_order(Call::new(addr(2)).with_value(100), 10, 10, Side::Buy)
            .unwrap_err();
        assert_eq!(err, ExchangeError::ImplementationNotSet);
        assert_eq!(ledger.bank.balance_of(&addr(2)), 100);
        assert!(exchange.cost(1, OrderId(0), Side::Sell, true).is_err());
    }

    #[test]
    fn attached_value_must_be_owned() {
        let (exchange, _, _, _) = exchange_with(live_beacon());
        let err = exchange
            .submit_limit_order(Call::new(addr(2)).with_value(100), 10, 10, Side::Buy)
            .unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientBalance);
        assert_eq!(exchange.get_order_count(), 0);
    }

    #[test]
    fn rejected_call_returns_value_and_publishes_nothing() {
        let (exchange, ledger, _, sink) = exchange_with(live_beacon());
        ledger.bank.mint(addr(2), 1_000).unwrap();
        let err = exchange
            .submit_limit_order(Call::new(addr(2)).with_value(999), 100, 10, Side::Buy)
            .unwrap_err();
        assert_eq!(err, ExchangeError::InsufficientCurrency);
        assert_eq!(ledger.bank.balance_of(&addr(2)), 1_000);
        assert_eq!(exchange.escrowed_currency(), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn buy_limit_escrows_exact_cost_and_emits_created() {
        let (exchange, ledger, _, sink) = exchange_with(live_beacon());
        ledger.bank.mint(addr(2), 5_000).unwrap();
        let receipt = exchange
            .submit_limit_order(Call::new(addr(2)).with_value(1_500).at(3), 100, 10, Side::Buy)
            .unwrap();
        assert_eq!(receipt.order_id, OrderId(0));
        assert_eq!(receipt.refund, 500);
        assert_eq!(exchange.escrowed_currency(), 1_000);
        assert_eq!(exchange.escrow_liability().unwrap(), 1_000);
        assert_eq!(ledger.bank.balance_of(&addr(2)), 4_000);
        let order = exchange.get_order(OrderId(0)).unwrap();
        assert_eq!(order.date, 3);
        assert!(order.is_limit && order.active && order.is_buy());
        assert!(matches!(sink.events()[0], Event::OrderCreated { amount: 100, price: 10, .. }));
    }

    #[test]
    fn estimate_falls_back_to_reference_price() {
        let (exchange, _, token, _) = exchange_with(live_beacon());
        assert_eq!(
            exchange.estimate(30, Side::Buy).unwrap(),
            Quote { available: 0, total_cost: 30 * 7 }
        );
        token.approve(addr(1), addr(500), 100);
        exchange
            .submit_limit_order(Call::new(addr(1)), 10, 3, Side::Sell)
            .unwrap();
        assert_eq!(
            exchange.estimate(30, Side::Buy).unwrap(),
            Quote { available: 10, total_cost: 30 }
        );
    }

    #[test]
    fn missing_order_is_reported() {
        let (exchange, _, _, _) = exchange_with(live_beacon());
        assert_eq!(
            exchange.get_order(OrderId(0)),
            Err(ExchangeError::OrderNotFound(OrderId(0)))
        );
        assert_eq!(exchange.best_price(), 7);
        assert_eq!(exchange.implementation_version().as_deref(), Some("sequential-v1"));
    }
}
