//! Exchange performance benchmarks (Criterion).
//!
//! Run: `cargo bench` or `cargo bench --bench engine`.

use coinomicon_engine::market_data_gen::{replay_into_exchange, Generator, GeneratorConfig};
use coinomicon_engine::{
    Address, Amount, Call, Erc20Token, ExchangeHandle, ExchangeRegistry, Ledger, OrderId, SequentialMatching, Side,
    Token,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;

const TRADERS: u64 = 5;

fn market(starting_price: Amount) -> (Arc<Ledger>, Arc<Erc20Token>, ExchangeHandle, Vec<Address>) {
    let owner = Address::from_low_u64(1);
    let traders: Vec<Address> = (0..TRADERS).map(|i| Address::from_low_u64(100 + i)).collect();
    let ledger = Ledger::new();
    let token = Arc::new(Erc20Token::new(Address::from_low_u64(0x70), owner, 1_000_000_000));
    ledger.tokens.register(token.clone());
    for t in &traders {
        token.transfer(owner, *t, 100_000_000).unwrap();
        ledger.bank.mint(*t, 1_000_000_000_000).unwrap();
    }
    let mut registry = ExchangeRegistry::new(owner, ledger.clone());
    let implementation = registry.deploy_implementation(Arc::new(SequentialMatching));
    registry.set_exchange_implementation(owner, implementation).unwrap();
    let exchange = registry.create_exchange(token.address(), starting_price).unwrap();
    (ledger, token, exchange, traders)
}

fn bench_replay_throughput(c: &mut Criterion) {
    const N: usize = 1000;
    let mut group = c.benchmark_group("exchange");
    group.throughput(Throughput::Elements(N as u64));
    group.bench_function("replay_1000", |b| {
        b.iter_batched(
            || {
                let config = GeneratorConfig {
                    seed: 42,
                    num_orders: N,
                    num_traders: TRADERS as usize,
                    ..Default::default()
                };
                let intents = Generator::new(config).all_intents();
                (market(20), intents)
            },
            |((ledger, _, exchange, traders), intents)| {
                replay_into_exchange(&exchange, &ledger, &traders, intents).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_market_buy_sweep(c: &mut Criterion) {
    const RESTING: u64 = 500;
    let mut group = c.benchmark_group("exchange");
    group.throughput(Throughput::Elements(RESTING));
    group.bench_function("market_buy_sweeping_500_asks", |b| {
        b.iter_batched(
            || {
                let (_, token, exchange, traders) = market(20);
                let seller = traders[0];
                token.approve(seller, exchange.address(), 10);
                for _ in 0..RESTING {
                    exchange.submit_limit_order(Call::new(seller), 10, 20, Side::Sell).unwrap();
                }
                token.approve(seller, exchange.address(), Amount::MAX);
                (exchange, traders[1])
            },
            |(exchange, buyer)| {
                let amount = u128::from(RESTING) * 10;
                exchange
                    .submit_market_order(Call::new(buyer).with_value(amount * 20), amount, Side::Buy)
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_quote(c: &mut Criterion) {
    const RESTING: u64 = 2000;
    let (_, token, exchange, traders) = market(20);
    token.approve(traders[0], exchange.address(), 10);
    for i in 0..RESTING {
        exchange
            .submit_limit_order(Call::new(traders[0]), 10, 15 + u128::from(i % 10), Side::Sell)
            .unwrap();
    }
    let mut group = c.benchmark_group("exchange");
    group.bench_function("cost_half_book_of_2000", |b| {
        b.iter(|| exchange.cost(u128::from(RESTING) * 5, OrderId(0), Side::Sell, true).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_replay_throughput, bench_market_buy_sweep, bench_quote);
criterion_main!(benches);
