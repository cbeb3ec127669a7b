//! ERC20-style token surface.
//!
//! The engine talks to tokens only through [`Token`]. [`Erc20Token`] is the
//! in-memory implementation used by tests, benches and the simulation binary.

use crate::error::TransferError;
use crate::ledger::lock;
use crate::types::{Address, Amount};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

pub trait Token: Send + Sync {
    fn address(&self) -> Address;

    fn balance_of(&self, owner: &Address) -> Amount;

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    fn approve(&self, owner: Address, spender: Address, amount: Amount);

    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError>;

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Host-level revert of a completed `transfer_from`: returns the tokens and
    /// restores the allowance.
    fn revert_transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

#[derive(Default)]
struct TokenState {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
}

impl TokenState {
    fn move_tokens(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError> {
        let available = self.balances.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                from,
                available,
                needed: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balances
            .get(&to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.balances.insert(from, available - amount);
        self.balances.insert(to, credited);
        Ok(())
    }
}

/// Plain fixed-supply token; the whole supply is minted to `holder` at creation.
pub struct Erc20Token {
    address: Address,
    state: Mutex<TokenState>,
}

impl Erc20Token {
    pub fn new(address: Address, holder: Address, supply: Amount) -> Self {
        let mut state = TokenState::default();
        state.balances.insert(holder, supply);
        Self {
            address,
            state: Mutex::new(state),
        }
    }

    pub fn total_supply(&self) -> Amount {
        lock(&self.state).balances.values().sum()
    }
}

impl Token for Erc20Token {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        lock(&self.state).balances.get(owner).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        lock(&self.state)
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn approve(&self, owner: Address, spender: Address, amount: Amount) {
        lock(&self.state).allowances.insert((owner, spender), amount);
    }

    fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError> {
        lock(&self.state).move_tokens(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let mut state = lock(&self.state);
        let allowed = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                owner: from,
                spender,
                allowed,
                needed: amount,
            });
        }
        state.move_tokens(from, to, amount)?;
        state.allowances.insert((from, spender), allowed - amount);
        Ok(())
    }

    fn revert_transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let mut state = lock(&self.state);
        state.move_tokens(to, from, amount)?;
        let allowed = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        let restored = allowed.checked_add(amount).ok_or(TransferError::Overflow)?;
        state.allowances.insert((from, spender), restored);
        Ok(())
    }
}

/// Resolves token addresses to deployed token contracts.
#[derive(Default)]
pub struct TokenDirectory {
    tokens: RwLock<HashMap<Address, Arc<dyn Token>>>,
}

impl TokenDirectory {
    pub fn register(&self, token: Arc<dyn Token>) {
        let mut tokens = self.tokens.write().unwrap_or_else(|p| p.into_inner());
        tokens.insert(token.address(), token);
    }

    pub fn get(&self, address: &Address) -> Option<Arc<dyn Token>> {
        let tokens = self.tokens.read().unwrap_or_else(|p| p.into_inner());
        tokens.get(address).cloned()
    }
}
