//! Order-flow simulation against a single exchange.
//!
//! Settings come from `SIM_*` environment variables (see [`SimulationConfig`]).
//! Logs a summary and, with `SIM_SNAPSHOT_PATH` set, writes the registry snapshot.

use coinomicon_engine::{
    replay_into_exchange, Address, Erc20Token, ExchangeError, ExchangeRegistry, FilePersistence, Generator,
    Ledger, SequentialMatching, SimulationConfig, Side, Token,
};
use log::info;
use std::sync::Arc;

const TOKEN_PER_TRADER: u128 = 1_000_000_000_000;
const CURRENCY_PER_TRADER: u128 = 1_000_000_000_000;

fn main() -> Result<(), ExchangeError> {
    let _ = env_logger::try_init();
    let config = SimulationConfig::from_env();
    info!(
        "simulation starting seed={} orders={} traders={} starting_price={}",
        config.seed, config.num_orders, config.traders, config.starting_price
    );

    let owner = Address::from_low_u64(1);
    let traders: Vec<Address> = (0..config.traders as u64)
        .map(|i| Address::from_low_u64(1_000 + i))
        .collect();

    let ledger = Ledger::new();
    let supply = TOKEN_PER_TRADER
        .checked_mul(traders.len() as u128)
        .ok_or(ExchangeError::Overflow)?;
    let token = Arc::new(Erc20Token::new(Address::derive(&owner, 0xC0), owner, supply));
    ledger.tokens.register(token.clone());
    for trader in &traders {
        token.transfer(owner, *trader, TOKEN_PER_TRADER)?;
        ledger.bank.mint(*trader, CURRENCY_PER_TRADER)?;
    }

    let mut registry = ExchangeRegistry::new(owner, ledger.clone());
    let implementation = registry.deploy_implementation(Arc::new(SequentialMatching));
    registry.set_exchange_implementation(owner, implementation)?;
    let exchange = registry.create_exchange(token.address(), config.starting_price)?;

    let intents = Generator::new(config.generator()).all_intents();
    let stats = replay_into_exchange(&exchange, &ledger, &traders, intents)?;

    info!(
        "simulation finished submitted={} rejected={} filled={} volume={} best_price={} orders={} open_bids={} open_asks={} escrowed={}",
        stats.submitted,
        stats.rejected,
        stats.filled,
        stats.volume,
        exchange.best_price(),
        exchange.get_order_count(),
        exchange.active_orders(Side::Buy).len(),
        exchange.active_orders(Side::Sell).len(),
        exchange.escrowed_currency()
    );

    if let Some(path) = &config.snapshot_path {
        FilePersistence::new(path).save(&registry.snapshot())?;
        info!("snapshot saved path={}", path.display());
    }
    Ok(())
}
