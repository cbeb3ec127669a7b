//! Escrow and transfer layer.
//!
//! Buy orders escrow base currency in the exchange's custody; sell orders only
//! need a token allowance, and tokens move straight from seller to buyer at
//! settlement. [`Escrow::execute`] runs a settlement's transfers in order and,
//! if one fails, reverses every transfer already made so the call leaves no
//! trace.

use crate::error::{ExchangeError, TransferError};
use crate::ledger::Ledger;
use crate::token::Token;
use crate::types::{Address, Amount};
use log::{debug, error, warn};

/// One movement of value performed at settlement.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Transfer {
    /// Base currency paid out of the exchange's custody.
    Currency { to: Address, amount: Amount },
    /// Tokens pulled from `from` to `to` under the exchange's allowance.
    Token {
        from: Address,
        to: Address,
        amount: Amount,
    },
}

/// Custody handle for one exchange: its address, token and the shared ledger.
pub struct Escrow<'a> {
    ledger: &'a Ledger,
    token: &'a dyn Token,
    custodian: Address,
}

impl<'a> Escrow<'a> {
    pub fn new(ledger: &'a Ledger, token: &'a dyn Token, custodian: Address) -> Self {
        Self {
            ledger,
            token,
            custodian,
        }
    }

    /// Base currency currently held by the exchange.
    pub fn custody_balance(&self) -> Amount {
        self.ledger.bank.balance_of(&self.custodian)
    }

    /// Moves the value attached to a call into custody.
    pub fn attach(&self, caller: Address, value: Amount) -> Result<(), ExchangeError> {
        self.ledger
            .bank
            .move_value(caller, self.custodian, value)
            .map_err(|_| ExchangeError::InsufficientBalance)
    }

    /// Returns attached value to the caller after a failed call.
    pub fn detach(&self, caller: Address, value: Amount) {
        if let Err(e) = self.ledger.bank.move_value(self.custodian, caller, value) {
            error!("attached value could not be returned caller={} value={} error={}", caller, value, e);
        }
    }

    /// Checks that `attached` covers `needed`; returns the excess to refund.
    pub fn require_currency(attached: Amount, needed: Amount) -> Result<Amount, ExchangeError> {
        attached
            .checked_sub(needed)
            .ok_or(ExchangeError::InsufficientCurrency)
    }

    /// Checks that `owner` has approved the exchange for at least `needed` tokens.
    pub fn require_allowance(&self, owner: &Address, needed: Amount) -> Result<(), ExchangeError> {
        if self.token.allowance(owner, &self.custodian) < needed {
            return Err(ExchangeError::InsufficientAllowance);
        }
        Ok(())
    }

    /// Runs `transfers` in order; all succeed or none remain applied.
    pub fn execute(&self, transfers: &[Transfer]) -> Result<(), ExchangeError> {
        for (done, transfer) in transfers.iter().enumerate() {
            debug!("settlement transfer {:?}", transfer);
            if let Err(e) = self.apply(transfer) {
                warn!("settlement transfer failed, reverting {} completed transfers: {}", done, e);
                for completed in transfers[..done].iter().rev() {
                    if let Err(undo) = self.revert(completed) {
                        error!("settlement revert failed transfer={:?} error={}", completed, undo);
                    }
                }
                return Err(ExchangeError::TransferFailed(e));
            }
        }
        Ok(())
    }

    fn apply(&self, transfer: &Transfer) -> Result<(), TransferError> {
        match *transfer {
            Transfer::Currency { to, amount } => self.ledger.bank.transfer(self.custodian, to, amount),
            Transfer::Token { from, to, amount } => {
                if amount == 0 {
                    return Ok(());
                }
                self.token.transfer_from(self.custodian, from, to, amount)
            }
        }
    }

    fn revert(&self, transfer: &Transfer) -> Result<(), TransferError> {
        match *transfer {
            Transfer::Currency { to, amount } => self.ledger.bank.move_value(to, self.custodian, amount),
            Transfer::Token { from, to, amount } => {
                if amount == 0 {
                    return Ok(());
                }
                self.token.revert_transfer_from(self.custodian, from, to, amount)
            }
        }
    }
}
