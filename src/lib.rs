//! # Coinomicon Engine
//!
//! Per-token order-book exchanges trading a token against base currency, with
//! escrowed settlement and a registry that creates one exchange per token.
//!
//! ## Entry point
//!
//! Build an [`ExchangeRegistry`] over a shared [`Ledger`], deploy and activate
//! matching logic, then create an exchange per token. Exchanges are shared
//! handles: [`Exchange::submit_limit_order`], [`Exchange::submit_market_order`]
//! and [`Exchange::cost`] are the trading surface.
//!
//! ## Example
//!
//! ```rust
//! use coinomicon_engine::{
//!     Address, Call, Erc20Token, ExchangeRegistry, Ledger, SequentialMatching, Side, Token,
//! };
//! use std::sync::Arc;
//!
//! let owner = Address::from_low_u64(1);
//! let seller = Address::from_low_u64(2);
//! let buyer = Address::from_low_u64(3);
//! let ledger = Ledger::new();
//! let token = Arc::new(Erc20Token::new(Address::from_low_u64(100), seller, 1_000));
//! ledger.tokens.register(token.clone());
//! ledger.bank.mint(buyer, 10_000).unwrap();
//!
//! let mut registry = ExchangeRegistry::new(owner, ledger.clone());
//! let logic = registry.deploy_implementation(Arc::new(SequentialMatching));
//! registry.set_exchange_implementation(owner, logic).unwrap();
//! let exchange = registry.create_exchange(token.address(), 1).unwrap();
//!
//! token.approve(seller, exchange.address(), 100);
//! exchange.submit_limit_order(Call::new(seller), 100, 20, Side::Sell).unwrap();
//! let receipt = exchange
//!     .submit_market_order(Call::new(buyer).with_value(1_820), 91, Side::Buy)
//!     .unwrap();
//! assert_eq!(receipt.total_cost, 1_820);
//! assert_eq!(token.balance_of(&buyer), 91);
//! ```
//!
//! ## Lower-level API
//!
//! [`OrderStore`] and [`quote`] can be used directly to inspect a book
//! without going through an exchange.

pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod exchange;
pub mod ledger;
pub mod market_data_gen;
pub mod matching;
pub mod order_store;
pub mod persistence;
pub mod quote;
pub mod registry;
pub mod token;
pub mod types;

pub use config::SimulationConfig;
pub use error::{ExchangeError, TransferError};
pub use escrow::{Escrow, Transfer};
pub use events::{Event, EventSink, InMemoryEventSink, LogEventSink};
pub use exchange::{Call, Exchange, ExchangeHandle};
pub use ledger::{Bank, Ledger, PaymentHook, RejectPayments};
pub use market_data_gen::{replay_into_exchange, Generator, GeneratorConfig, IntentKind, OrderIntent, ReplayStats};
pub use matching::{CallContext, ExchangeState, Execution, MatchingEngine, Receipt, SequentialMatching};
pub use order_store::{Fill, OrderStore};
pub use persistence::{ExchangeSnapshot, FilePersistence, PersistedState};
pub use quote::{plan_fills, quote, PlannedFill, Quote, QuoteScope};
pub use registry::{Beacon, ExchangeRegistry, Implementation};
pub use token::{Erc20Token, Token, TokenDirectory};
pub use types::{Address, Amount, Order, OrderId, Side, Timestamp};
