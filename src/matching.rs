//! Replaceable matching and settlement logic.
//!
//! An exchange keeps its [`ExchangeState`] (order store and reference price)
//! and delegates every operation to the [`MatchingEngine`] currently installed
//! in the registry. Logic writes its state effects first and returns the
//! transfers to perform; the exchange runs them afterwards.
//!
//! [`SequentialMatching`] consumes resting limit orders in id order: oldest
//! first, regardless of price.

use crate::error::ExchangeError;
use crate::escrow::{Escrow, Transfer};
use crate::events::Event;
use crate::order_store::OrderStore;
use crate::quote::{plan_fills, quote, Quote, QuoteScope};
use crate::types::{Address, Amount, OrderId, Side, Timestamp};
use log::debug;

/// Persistent per-exchange state. Survives implementation upgrades.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ExchangeState {
    pub orders: OrderStore,
    /// Reference price used when the book has no liquidity for a request.
    pub best_price: Amount,
}

impl ExchangeState {
    pub fn new(starting_price: Amount) -> Self {
        Self {
            orders: OrderStore::new(),
            best_price: starting_price,
        }
    }

    /// Base currency the exchange must hold for open buy limit orders.
    pub fn escrow_liability(&self) -> Result<Amount, ExchangeError> {
        self.orders
            .iter()
            .filter(|o| o.is_tradable() && o.is_buy())
            .try_fold(0u128, |acc, o| {
                let owed = o.amount.checked_mul(o.price).ok_or(ExchangeError::Overflow)?;
                acc.checked_add(owed).ok_or(ExchangeError::Overflow)
            })
    }
}

/// Parameters of the call currently being executed.
pub struct CallContext<'a> {
    pub exchange: Address,
    pub caller: Address,
    /// Base currency attached to the call, already moved into custody.
    pub value: Amount,
    pub timestamp: Timestamp,
    pub escrow: &'a Escrow<'a>,
}

/// What the caller gets back from a submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    /// Id of the order appended for this submission.
    pub order_id: OrderId,
    /// Quantity matched against resting orders.
    pub filled: Amount,
    /// Base currency exchanged for `filled`.
    pub total_cost: Amount,
    /// Attached value returned to the caller.
    pub refund: Amount,
}

/// Effects of one operation that still have to leave the exchange.
#[derive(Debug, Default)]
pub struct Execution {
    pub receipt: Receipt,
    pub transfers: Vec<Transfer>,
    pub events: Vec<Event>,
}

pub trait MatchingEngine: Send + Sync {
    /// Human-readable identifier of this logic revision.
    fn version(&self) -> &str;

    fn quote(
        &self,
        state: &ExchangeState,
        amount: Amount,
        start: OrderId,
        side: Side,
        is_market: bool,
    ) -> Result<Quote, ExchangeError>;

    fn submit_limit_order(
        &self,
        state: &mut ExchangeState,
        ctx: &CallContext<'_>,
        amount: Amount,
        price: Amount,
        side: Side,
    ) -> Result<Execution, ExchangeError>;

    fn submit_market_order(
        &self,
        state: &mut ExchangeState,
        ctx: &CallContext<'_>,
        amount: Amount,
        side: Side,
    ) -> Result<Execution, ExchangeError>;
}

/// First-come-first-served matching over the append-only order store.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialMatching;

fn order_created(ctx: &CallContext<'_>, state: &ExchangeState, id: OrderId) -> Vec<Event> {
    let mut events = Vec::new();
    if let Some(o) = state.orders.get(id) {
        events.push(Event::OrderCreated {
            exchange: ctx.exchange,
            order_id: o.id,
            trader: o.trader,
            amount: o.amount,
            price: o.price,
            side: o.side,
            is_limit: o.is_limit,
            date: o.date,
        });
    }
    events
}

impl MatchingEngine for SequentialMatching {
    fn version(&self) -> &str {
        "sequential-v1"
    }

    fn quote(
        &self,
        state: &ExchangeState,
        amount: Amount,
        start: OrderId,
        side: Side,
        is_market: bool,
    ) -> Result<Quote, ExchangeError> {
        quote(&state.orders, amount, start, side, QuoteScope::from_market_flag(is_market))
    }

    fn submit_limit_order(
        &self,
        state: &mut ExchangeState,
        ctx: &CallContext<'_>,
        amount: Amount,
        price: Amount,
        side: Side,
    ) -> Result<Execution, ExchangeError> {
        if amount == 0 {
            return Err(ExchangeError::InvalidAmount);
        }
        let refund = match side {
            Side::Buy => {
                let needed = amount.checked_mul(price).ok_or(ExchangeError::Overflow)?;
                Escrow::require_currency(ctx.value, needed)?
            }
            Side::Sell => {
                ctx.escrow.require_allowance(&ctx.caller, amount)?;
                ctx.value
            }
        };

        let order_id = state
            .orders
            .append(ctx.caller, amount, price, side, true, ctx.timestamp);
        let events = order_created(ctx, state, order_id);
        let mut transfers = Vec::new();
        if refund > 0 {
            transfers.push(Transfer::Currency {
                to: ctx.caller,
                amount: refund,
            });
        }
        Ok(Execution {
            receipt: Receipt {
                order_id,
                filled: 0,
                total_cost: 0,
                refund,
            },
            transfers,
            events,
        })
    }

    fn submit_market_order(
        &self,
        state: &mut ExchangeState,
        ctx: &CallContext<'_>,
        amount: Amount,
        side: Side,
    ) -> Result<Execution, ExchangeError> {
        if amount == 0 {
            return Err(ExchangeError::InvalidAmount);
        }
        let (plan, quoted) = plan_fills(&state.orders, amount, side.opposite())?;

        // Funding checks happen before any state is touched.
        let refund = match side {
            Side::Buy => Escrow::require_currency(ctx.value, quoted.total_cost)?,
            Side::Sell => {
                ctx.escrow.require_allowance(&ctx.caller, quoted.available)?;
                ctx.value
            }
        };

        let mut events = Vec::new();
        let mut transfers = Vec::new();
        for planned in &plan {
            let fill = state.orders.fill(planned.order_id, planned.quantity)?;
            let proceeds = fill.quantity.checked_mul(fill.price).ok_or(ExchangeError::Overflow)?;
            debug!(
                "fill order_id={} trader={} quantity={} price={} closed={}",
                fill.order_id.0, fill.trader, fill.quantity, fill.price, fill.closed
            );
            events.push(Event::OrderFilled {
                exchange: ctx.exchange,
                order_id: fill.order_id,
                trader: fill.trader,
                quantity: fill.quantity,
                price: fill.price,
                side: side.opposite(),
            });
            if fill.closed {
                events.push(Event::OrderClosed {
                    exchange: ctx.exchange,
                    order_id: fill.order_id,
                    trader: fill.trader,
                    amount: fill.quantity,
                    price: fill.price,
                    side: side.opposite(),
                });
            }
            match side {
                Side::Buy => {
                    transfers.push(Transfer::Token {
                        from: fill.trader,
                        to: ctx.caller,
                        amount: fill.quantity,
                    });
                    transfers.push(Transfer::Currency {
                        to: fill.trader,
                        amount: proceeds,
                    });
                }
                Side::Sell => transfers.push(Transfer::Token {
                    from: ctx.caller,
                    to: fill.trader,
                    amount: fill.quantity,
                }),
            }
        }
        if side == Side::Sell && quoted.total_cost > 0 {
            transfers.push(Transfer::Currency {
                to: ctx.caller,
                amount: quoted.total_cost,
            });
        }
        if refund > 0 {
            transfers.push(Transfer::Currency {
                to: ctx.caller,
                amount: refund,
            });
        }

        if let Some(last) = plan.last() {
            state.best_price = last.price;
        }

        // The taker's own record: the unfilled shortfall rests at the reference
        // price; a fully filled taker is stored already closed.
        let shortfall = amount - quoted.available;
        let order_id = state.orders.append(
            ctx.caller,
            if shortfall > 0 { shortfall } else { amount },
            state.best_price,
            side,
            false,
            ctx.timestamp,
        );
        events.extend(order_created(ctx, state, order_id));
        if shortfall == 0 {
            state.orders.fill(order_id, amount)?;
            events.push(Event::OrderClosed {
                exchange: ctx.exchange,
                order_id,
                trader: ctx.caller,
                amount,
                price: state.best_price,
                side,
            });
        }

        Ok(Execution {
            receipt: Receipt {
                order_id,
                filled: quoted.available,
                total_cost: quoted.total_cost,
                refund,
            },
            transfers,
            events,
        })
    }
}
