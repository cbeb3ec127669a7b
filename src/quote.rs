//! Quote calculator: how much of one side of the book a request can consume.
//!
//! Resting orders are scanned in id order (oldest first), not by price. Both
//! [`quote`] and [`plan_fills`] share the same scan so a quote always prices
//! exactly the fills a settlement would perform.

use crate::error::ExchangeError;
use crate::order_store::OrderStore;
use crate::types::{Address, Amount, Order, OrderId, Side};

/// Result of a quote: quantity available and its total base-currency cost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Quote {
    pub available: Amount,
    pub total_cost: Amount,
}

impl Quote {
    pub fn is_empty(&self) -> bool {
        self.available == 0
    }
}

/// Which resting orders count as liquidity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuoteScope {
    /// Escrow-backed limit orders only; what a trade would actually consume.
    Tradable,
    /// Every active order on the side, including unescrowed shortfall orders.
    Audit,
}

impl QuoteScope {
    pub fn from_market_flag(is_market: bool) -> Self {
        if is_market {
            QuoteScope::Tradable
        } else {
            QuoteScope::Audit
        }
    }

    fn admits(self, order: &Order) -> bool {
        match self {
            QuoteScope::Tradable => order.is_tradable(),
            QuoteScope::Audit => order.active,
        }
    }
}

/// A slice of a resting order that a settlement would consume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedFill {
    pub order_id: OrderId,
    pub trader: Address,
    pub price: Amount,
    pub quantity: Amount,
}

fn scan(
    store: &OrderStore,
    amount: Amount,
    start: OrderId,
    side: Side,
    scope: QuoteScope,
) -> Vec<PlannedFill> {
    let mut remaining = amount;
    let mut fills = Vec::new();
    for order in store.iter_from(start) {
        if remaining == 0 {
            break;
        }
        if order.side != side || !scope.admits(order) || order.amount == 0 {
            continue;
        }
        let quantity = remaining.min(order.amount);
        remaining -= quantity;
        fills.push(PlannedFill {
            order_id: order.id,
            trader: order.trader,
            price: order.price,
            quantity,
        });
    }
    fills
}

fn price_fills(fills: &[PlannedFill]) -> Result<Quote, ExchangeError> {
    fills.iter().try_fold(Quote::default(), |acc, f| {
        let cost = f.quantity.checked_mul(f.price).ok_or(ExchangeError::Overflow)?;
        Ok(Quote {
            available: acc.available + f.quantity,
            total_cost: acc.total_cost.checked_add(cost).ok_or(ExchangeError::Overflow)?,
        })
    })
}

/// Quotes `amount` against resting orders on `side`, starting at id `start`.
///
/// `available <= amount` always; when the book is short, `available` is all
/// the liquidity in scope and `total_cost` prices exactly that. Never mutates.
pub fn quote(
    store: &OrderStore,
    amount: Amount,
    start: OrderId,
    side: Side,
    scope: QuoteScope,
) -> Result<Quote, ExchangeError> {
    price_fills(&scan(store, amount, start, side, scope))
}

/// Fills a taker of `amount` would perform against `side`, with their priced total.
pub fn plan_fills(
    store: &OrderStore,
    amount: Amount,
    side: Side,
) -> Result<(Vec<PlannedFill>, Quote), ExchangeError> {
    let fills = scan(store, amount, OrderId(0), side, QuoteScope::Tradable);
    let quote = price_fills(&fills)?;
    Ok((fills, quote))
}
