//! Synthetic order flow generator.
//!
//! Deterministic, configurable stream of order submissions for replay tests,
//! the simulation binary and benches. Same seed ⇒ same sequence of intents.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ExchangeError;
use crate::exchange::{Call, Exchange};
use crate::ledger::Ledger;
use crate::types::{Address, Amount, OrderId, Side, Timestamp};
use log::debug;

/// Configuration for the synthetic generator.
/// All ranges are inclusive. Same config + seed produces the same stream.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub num_orders: usize,
    /// Probability of Buy (0.0..=1.0). Sell otherwise.
    pub buy_ratio: f64,
    /// Probability of a limit order (0.0..=1.0). Market otherwise.
    pub limit_ratio: f64,
    pub price_min: Amount,
    pub price_max: Amount,
    pub amount_min: Amount,
    pub amount_max: Amount,
    /// Traders are indexed 0..num_traders.
    pub num_traders: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_orders: 1000,
            buy_ratio: 0.5,
            limit_ratio: 0.8,
            price_min: 15,
            price_max: 25,
            amount_min: 1,
            amount_max: 200,
            num_traders: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentKind {
    Limit { price: Amount },
    Market,
}

/// One submission to make against an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderIntent {
    pub trader: usize,
    pub side: Side,
    pub amount: Amount,
    pub kind: IntentKind,
    pub timestamp: Timestamp,
}

/// Inclusive range bounds in ascending order, at least 1.
fn ordered(a: Amount, b: Amount) -> (Amount, Amount) {
    (a.min(b).max(1), a.max(b).max(1))
}

pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
    next_timestamp: Timestamp,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            rng,
            config,
            next_timestamp: 1,
        }
    }

    pub fn next_intent(&mut self) -> OrderIntent {
        let side = if self.rng.gen::<f64>() < self.config.buy_ratio {
            Side::Buy
        } else {
            Side::Sell
        };
        let kind = if self.rng.gen::<f64>() < self.config.limit_ratio {
            let (lo, hi) = ordered(self.config.price_min, self.config.price_max);
            IntentKind::Limit {
                price: self.rng.gen_range(lo..=hi),
            }
        } else {
            IntentKind::Market
        };
        let (lo, hi) = ordered(self.config.amount_min, self.config.amount_max);
        let amount = self.rng.gen_range(lo..=hi);
        let trader = self.rng.gen_range(0..self.config.num_traders.max(1));
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;
        OrderIntent {
            trader,
            side,
            amount,
            kind,
            timestamp,
        }
    }

    pub fn take_intents(&mut self, n: usize) -> Vec<OrderIntent> {
        (0..n).map(|_| self.next_intent()).collect()
    }

    /// The full stream as defined by `config.num_orders`.
    pub fn all_intents(&mut self) -> Vec<OrderIntent> {
        self.take_intents(self.config.num_orders)
    }
}

/// Outcome counters of a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReplayStats {
    pub submitted: usize,
    pub rejected: usize,
    /// Quantity matched against resting orders.
    pub filled: Amount,
    /// Base currency exchanged for `filled`.
    pub volume: Amount,
}

/// Replays intents against `exchange` on behalf of `traders`.
///
/// Buy limits attach exactly `amount * price`, market buys attach the current
/// quote, and sellers approve the exchange for the amount they offer. Business
/// rejections (balance, allowance, attached value, failed transfers) are
/// counted; any other error stops the replay.
pub fn replay_into_exchange(
    exchange: &Exchange,
    ledger: &Ledger,
    traders: &[Address],
    intents: impl IntoIterator<Item = OrderIntent>,
) -> Result<ReplayStats, ExchangeError> {
    let token = ledger
        .tokens
        .get(&exchange.token())
        .ok_or(ExchangeError::InvalidToken)?;
    let mut stats = ReplayStats::default();
    for intent in intents {
        let Some(&trader) = traders.get(intent.trader) else {
            continue;
        };
        let call = Call::new(trader).at(intent.timestamp);
        let value = match (intent.side, intent.kind) {
            (Side::Buy, IntentKind::Limit { price }) => {
                intent.amount.checked_mul(price).ok_or(ExchangeError::Overflow)?
            }
            (Side::Buy, IntentKind::Market) => {
                exchange.cost(intent.amount, OrderId(0), Side::Sell, true)?.total_cost
            }
            (Side::Sell, _) => {
                let allowance = token.allowance(&trader, &exchange.address());
                token.approve(trader, exchange.address(), allowance.saturating_add(intent.amount));
                0
            }
        };
        let call = call.with_value(value);
        let outcome = match intent.kind {
            IntentKind::Limit { price } => exchange.submit_limit_order(call, intent.amount, price, intent.side),
            IntentKind::Market => exchange.submit_market_order(call, intent.amount, intent.side),
        };
        stats.submitted += 1;
        match outcome {
            Ok(receipt) => {
                stats.filled = stats.filled.saturating_add(receipt.filled);
                stats.volume = stats.volume.saturating_add(receipt.total_cost);
            }
            Err(
                e @ (ExchangeError::InsufficientBalance
                | ExchangeError::InsufficientCurrency
                | ExchangeError::InsufficientAllowance
                | ExchangeError::TransferFailed(_)),
            ) => {
                debug!("replay intent rejected trader={} reason={}", trader, e);
                stats.rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(stats)
}
