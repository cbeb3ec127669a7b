//! Append-only order log for one trading pair.
//!
//! Ids are dense from zero and double as indices. Orders are never removed;
//! a closed order is frozen and rejects further fills.

use crate::error::ExchangeError;
use crate::types::{Address, Amount, Order, OrderId, Side, Timestamp};

/// Outcome of consuming part of a resting order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fill {
    pub order_id: OrderId,
    pub trader: Address,
    pub price: Amount,
    pub quantity: Amount,
    /// True if this fill closed the resting order.
    pub closed: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrderStore {
    orders: Vec<Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new active order and returns its id.
    pub fn append(
        &mut self,
        trader: Address,
        amount: Amount,
        price: Amount,
        side: Side,
        is_limit: bool,
        date: Timestamp,
    ) -> OrderId {
        let id = OrderId(self.orders.len() as u64);
        self.orders.push(Order {
            id,
            trader,
            amount,
            price,
            side,
            active: true,
            is_limit,
            date,
        });
        id
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        usize::try_from(id.0).ok().and_then(|i| self.orders.get(i))
    }

    /// Number of orders ever stored; also the next id to be assigned.
    pub fn len(&self) -> u64 {
        self.orders.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    /// Orders with id >= `start`, in id order.
    pub fn iter_from(&self, start: OrderId) -> impl Iterator<Item = &Order> {
        let start = usize::try_from(start.0).unwrap_or(usize::MAX);
        self.orders.iter().skip(start)
    }

    /// Consumes up to `quantity` of an active order. The order closes when its
    /// amount reaches zero; the stored amount of a closed order stays at the
    /// remainder it had just before the closing fill.
    pub fn fill(&mut self, id: OrderId, quantity: Amount) -> Result<Fill, ExchangeError> {
        let order = usize::try_from(id.0)
            .ok()
            .and_then(|i| self.orders.get_mut(i))
            .ok_or(ExchangeError::OrderNotFound(id))?;
        if !order.active || quantity == 0 || quantity > order.amount {
            return Err(ExchangeError::InvalidAmount);
        }
        let closed = quantity == order.amount;
        if closed {
            order.active = false;
        } else {
            order.amount -= quantity;
        }
        Ok(Fill {
            order_id: id,
            trader: order.trader,
            price: order.price,
            quantity,
            closed,
        })
    }
}
