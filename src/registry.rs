//! Exchange registry (factory).
//!
//! Maps each token to its dedicated [`Exchange`]. Exchanges do not own their
//! logic: they resolve it through a shared [`Beacon`] on every call, so when
//! the owner installs a new implementation, existing and future exchanges all
//! switch to it while keeping their order history.

use crate::error::ExchangeError;
use crate::events::{Event, EventSink, LogEventSink};
use crate::exchange::{Exchange, ExchangeHandle};
use crate::ledger::Ledger;
use crate::matching::{ExchangeState, MatchingEngine};
use crate::persistence::{ExchangeSnapshot, PersistedState};
use crate::token::Token;
use crate::types::{Address, Amount};
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Deployed matching logic and the address it lives at.
#[derive(Clone)]
pub struct Implementation {
    pub address: Address,
    pub engine: Arc<dyn MatchingEngine>,
}

/// Shared, swappable pointer to the current implementation.
#[derive(Clone, Default)]
pub struct Beacon {
    slot: Arc<RwLock<Option<Implementation>>>,
}

impl Beacon {
    pub fn current(&self) -> Option<Implementation> {
        self.slot.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub(crate) fn set(&self, implementation: Implementation) {
        *self.slot.write().unwrap_or_else(|p| p.into_inner()) = Some(implementation);
    }
}

pub struct ExchangeRegistry {
    address: Address,
    owner: Address,
    ledger: Arc<Ledger>,
    beacon: Beacon,
    implementations: HashMap<Address, Arc<dyn MatchingEngine>>,
    exchanges: BTreeMap<Address, ExchangeHandle>,
    nonce: u64,
    sink: Arc<dyn EventSink>,
}

impl ExchangeRegistry {
    /// Creates a registry administered by `owner`, publishing events to the log.
    pub fn new(owner: Address, ledger: Arc<Ledger>) -> Self {
        Self::with_sink(owner, ledger, Arc::new(LogEventSink))
    }

    pub fn with_sink(owner: Address, ledger: Arc<Ledger>, sink: Arc<dyn EventSink>) -> Self {
        let address = Address::derive(&owner, 0);
        info!("registry deployed address={} owner={}", address, owner);
        Self {
            address,
            owner,
            ledger,
            beacon: Beacon::default(),
            implementations: HashMap::new(),
            exchanges: BTreeMap::new(),
            nonce: 1,
            sink,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    fn only_owner(&self, caller: Address) -> Result<(), ExchangeError> {
        if caller != self.owner {
            warn!("owner-only call rejected caller={} owner={}", caller, self.owner);
            return Err(ExchangeError::NotOwner);
        }
        Ok(())
    }

    /// Whether `address` already names this registry, an implementation or an exchange.
    fn is_taken(&self, address: &Address) -> bool {
        *address == self.address
            || self.implementations.contains_key(address)
            || self.exchanges.values().any(|e| e.address() == *address)
    }

    /// Next derived address not already taken. Restored exchanges keep their
    /// persisted addresses, so derivation skips past them.
    fn next_address(&mut self) -> Address {
        loop {
            let address = Address::derive(&self.address, self.nonce);
            self.nonce += 1;
            if !self.is_taken(&address) {
                return address;
            }
        }
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<(), ExchangeError> {
        self.only_owner(caller)?;
        if new_owner.is_zero() {
            return Err(ExchangeError::InvalidOwner);
        }
        let previous = self.owner;
        self.owner = new_owner;
        info!("ownership transferred previous={} current={}", previous, new_owner);
        self.sink.publish(&Event::OwnershipTransferred {
            previous,
            current: new_owner,
        });
        Ok(())
    }

    /// Deploys matching logic and returns its address. Deployment alone does
    /// not activate it; see [`Self::set_exchange_implementation`].
    pub fn deploy_implementation(&mut self, engine: Arc<dyn MatchingEngine>) -> Address {
        let address = self.next_address();
        info!("implementation deployed address={} version={}", address, engine.version());
        self.implementations.insert(address, engine);
        address
    }

    /// Points every exchange at the implementation deployed at `implementation`.
    pub fn set_exchange_implementation(
        &mut self,
        caller: Address,
        implementation: Address,
    ) -> Result<(), ExchangeError> {
        self.only_owner(caller)?;
        if implementation.is_zero() {
            return Err(ExchangeError::InvalidImplementation);
        }
        let engine = self
            .implementations
            .get(&implementation)
            .cloned()
            .ok_or(ExchangeError::InvalidImplementation)?;
        let previous = self.exchange_implementation();
        info!(
            "exchange implementation changed previous={} current={} version={}",
            previous,
            implementation,
            engine.version()
        );
        self.beacon.set(Implementation {
            address: implementation,
            engine,
        });
        self.sink.publish(&Event::ImplementationChanged {
            previous,
            current: implementation,
        });
        Ok(())
    }

    /// Address of the active implementation, or [`Address::ZERO`] if none is set.
    pub fn exchange_implementation(&self) -> Address {
        self.beacon
            .current()
            .map(|i| i.address)
            .unwrap_or(Address::ZERO)
    }

    /// Version string of the active implementation, if any.
    pub fn implementation_version(&self) -> Option<String> {
        self.beacon.current().map(|i| i.engine.version().to_string())
    }

    /// Creates the exchange for `token`, opening with `starting_price` as its
    /// reference price.
    pub fn create_exchange(
        &mut self,
        token: Address,
        starting_price: Amount,
    ) -> Result<ExchangeHandle, ExchangeError> {
        if token.is_zero() {
            return Err(ExchangeError::InvalidToken);
        }
        if self.exchanges.contains_key(&token) {
            return Err(ExchangeError::AlreadyExists);
        }
        if self.beacon.current().is_none() {
            return Err(ExchangeError::ImplementationNotSet);
        }
        if starting_price == 0 {
            return Err(ExchangeError::InvalidPrice);
        }
        let token_contract = self.ledger.tokens.get(&token).ok_or(ExchangeError::InvalidToken)?;
        let address = self.next_address();
        let exchange = Arc::new(Exchange::new(
            address,
            token_contract,
            self.ledger.clone(),
            self.beacon.clone(),
            self.sink.clone(),
            ExchangeState::new(starting_price),
        ));
        self.exchanges.insert(token, exchange.clone());
        info!(
            "exchange created token={} exchange={} starting_price={}",
            token, address, starting_price
        );
        self.sink.publish(&Event::ExchangeCreated {
            token,
            exchange: address,
            starting_price,
        });
        Ok(exchange)
    }

    pub fn get_exchange(&self, token: &Address) -> Option<ExchangeHandle> {
        self.exchanges.get(token).cloned()
    }

    /// All exchanges, ordered by token address.
    pub fn exchanges(&self) -> Vec<ExchangeHandle> {
        self.exchanges.values().cloned().collect()
    }

    /// Captures every exchange's state for persistence.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            registry: self.address,
            owner: self.owner,
            implementation_version: self
                .beacon
                .current()
                .map(|i| i.engine.version().to_string()),
            exchanges: self
                .exchanges
                .iter()
                .map(|(token, exchange)| ExchangeSnapshot {
                    token: *token,
                    exchange: exchange.address(),
                    state: exchange.snapshot(),
                })
                .collect(),
        }
    }

    /// Re-creates exchanges from a snapshot. Owner only; every entry is
    /// validated before any exchange is registered.
    pub fn restore(&mut self, caller: Address, persisted: PersistedState) -> Result<usize, ExchangeError> {
        self.only_owner(caller)?;
        if self.beacon.current().is_none() {
            return Err(ExchangeError::ImplementationNotSet);
        }
        let mut pending: Vec<(Address, Arc<dyn Token>, ExchangeSnapshot)> =
            Vec::with_capacity(persisted.exchanges.len());
        for snapshot in persisted.exchanges {
            if snapshot.token.is_zero() {
                return Err(ExchangeError::InvalidToken);
            }
            if self.exchanges.contains_key(&snapshot.token)
                || pending.iter().any(|(t, _, _)| *t == snapshot.token)
            {
                return Err(ExchangeError::AlreadyExists);
            }
            if self.is_taken(&snapshot.exchange)
                || pending.iter().any(|(_, _, s)| s.exchange == snapshot.exchange)
            {
                warn!("restore rejected exchange={} address in use", snapshot.exchange);
                return Err(ExchangeError::AlreadyExists);
            }
            let token = self
                .ledger
                .tokens
                .get(&snapshot.token)
                .ok_or(ExchangeError::InvalidToken)?;
            pending.push((snapshot.token, token, snapshot));
        }
        let restored = pending.len();
        for (token_address, token, snapshot) in pending {
            let exchange = Arc::new(Exchange::new(
                snapshot.exchange,
                token,
                self.ledger.clone(),
                self.beacon.clone(),
                self.sink.clone(),
                snapshot.state,
            ));
            info!(
                "exchange restored token={} exchange={} orders={}",
                token_address,
                snapshot.exchange,
                exchange.get_order_count()
            );
            self.exchanges.insert(token_address, exchange);
        }
        Ok(restored)
    }
}
