//! Base-currency ledger.
//!
//! [`Bank`] holds native balances for every address. A transfer credits the
//! recipient and then runs the recipient's [`PaymentHook`], if one is
//! registered; a hook error undoes the movement. [`Ledger`] bundles the bank
//! with the token directory so exchanges share one view of the world.

use crate::error::TransferError;
use crate::token::TokenDirectory;
use crate::types::{Address, Amount};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Code run when an address receives base currency (a contract's receive function).
///
/// Hooks run on the thread that is settling the payment. A hook that calls
/// back into the paying exchange on that thread gets `ReentrantCall`; a hook
/// that hands the call to another thread and waits for it deadlocks, since
/// the exchange admits one call at a time.
pub trait PaymentHook: Send + Sync {
    fn on_receive(&self, from: Address, amount: Amount) -> Result<(), String>;
}

/// Hook that refuses every payment.
pub struct RejectPayments;

impl PaymentHook for RejectPayments {
    fn on_receive(&self, _from: Address, _amount: Amount) -> Result<(), String> {
        Err("recipient does not accept payments".into())
    }
}

#[derive(Default)]
pub struct Bank {
    balances: Mutex<HashMap<Address, Amount>>,
    hooks: Mutex<HashMap<Address, Arc<dyn PaymentHook>>>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, who: &Address) -> Amount {
        lock(&self.balances).get(who).copied().unwrap_or(0)
    }

    /// Creates `amount` out of thin air for `to` (test funding, genesis).
    pub fn mint(&self, to: Address, amount: Amount) -> Result<(), TransferError> {
        let mut balances = lock(&self.balances);
        let entry = balances.entry(to).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(TransferError::Overflow)?;
        Ok(())
    }

    pub fn set_hook(&self, who: Address, hook: Arc<dyn PaymentHook>) {
        lock(&self.hooks).insert(who, hook);
    }

    pub fn clear_hook(&self, who: &Address) {
        lock(&self.hooks).remove(who);
    }

    /// Moves `amount` from `from` to `to`, then runs the recipient's hook.
    pub fn transfer(&self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError> {
        if amount == 0 {
            return Ok(());
        }
        self.move_value(from, to, amount)?;
        let hook = lock(&self.hooks).get(&to).cloned();
        if let Some(hook) = hook {
            if let Err(reason) = hook.on_receive(from, amount) {
                self.move_value(to, from, amount)?;
                return Err(TransferError::Rejected { to, reason });
            }
        }
        Ok(())
    }

    /// Moves value without running hooks. Used for attaching call value and
    /// for reverting a failed call.
    pub(crate) fn move_value(&self, from: Address, to: Address, amount: Amount) -> Result<(), TransferError> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let mut balances = lock(&self.balances);
        let available = balances.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                from,
                available,
                needed: amount,
            });
        }
        let credited = balances
            .get(&to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        balances.insert(from, available - amount);
        balances.insert(to, credited);
        Ok(())
    }
}

/// Shared host state: native balances plus every deployed token.
#[derive(Default)]
pub struct Ledger {
    pub bank: Bank,
    pub tokens: TokenDirectory,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    #[test]
    fn transfer_moves_balance() {
        let bank = Bank::new();
        bank.mint(addr(1), 100).unwrap();
        bank.transfer(addr(1), addr(2), 40).unwrap();
        assert_eq!(bank.balance_of(&addr(1)), 60);
        assert_eq!(bank.balance_of(&addr(2)), 40);
    }

    #[test]
    fn transfer_without_funds_fails_and_changes_nothing() {
        let bank = Bank::new();
        bank.mint(addr(1), 10).unwrap();
        let err = bank.transfer(addr(1), addr(2), 11).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { needed: 11, .. }));
        assert_eq!(bank.balance_of(&addr(1)), 10);
        assert_eq!(bank.balance_of(&addr(2)), 0);
    }

    #[test]
    fn rejecting_hook_undoes_transfer() {
        let bank = Bank::new();
        bank.mint(addr(1), 10).unwrap();
        bank.set_hook(addr(2), Arc::new(RejectPayments));
        let err = bank.transfer(addr(1), addr(2), 5).unwrap_err();
        assert!(matches!(err, TransferError::Rejected { .. }));
        assert_eq!(bank.balance_of(&addr(1)), 10);
        assert_eq!(bank.balance_of(&addr(2)), 0);

        bank.clear_hook(&addr(2));
        bank.transfer(addr(1), addr(2), 5).unwrap();
        assert_eq!(bank.balance_of(&addr(2)), 5);
    }

    #[test]
    fn zero_transfer_is_noop_even_for_rejecting_recipient() {
        let bank = Bank::new();
        bank.set_hook(addr(2), Arc::new(RejectPayments));
        bank.transfer(addr(1), addr(2), 0).unwrap();
    }
}
