//! Typed failures for the exchange engine and the registry.
//!
//! Every [`ExchangeError`] carries a stable reason string ([`ExchangeError::reason`])
//! that callers may surface verbatim.

use crate::types::{Address, Amount, OrderId};
use thiserror::Error;

/// Failure while moving base currency or tokens between parties.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient balance: {from} holds {available}, needs {needed}")]
    InsufficientBalance {
        from: Address,
        available: Amount,
        needed: Amount,
    },
    #[error("insufficient allowance: {spender} may spend {allowed} of {owner}, needs {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: Amount,
        needed: Amount,
    },
    #[error("recipient {to} rejected transfer: {reason}")]
    Rejected { to: Address, reason: String },
    #[error("unknown token {0}")]
    UnknownToken(Address),
    #[error("balance overflow")]
    Overflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Exchange already exists")]
    AlreadyExists,
    #[error("Invalid token address")]
    InvalidToken,
    #[error("Invalid implementation")]
    ImplementationNotSet,
    #[error("Invalid implementation")]
    InvalidImplementation,
    #[error("Ownable: caller is not the owner")]
    NotOwner,
    #[error("Ownable: new owner is the zero address")]
    InvalidOwner,
    #[error("Insufficient ETH")]
    InsufficientCurrency,
    #[error("ERC20: insufficient allowance")]
    InsufficientAllowance,
    #[error("Unable to send ether to the trader: {0}")]
    TransferFailed(#[source] TransferError),
    #[error("ReentrancyGuard: reentrant call")]
    ReentrantCall,
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Invalid price")]
    InvalidPrice,
    #[error("Order not found: {0:?}")]
    OrderNotFound(OrderId),
    #[error("Math overflow")]
    Overflow,
    #[error("Insufficient balance for attached value")]
    InsufficientBalance,
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ExchangeError {
    /// Stable, payload-free reason for this failure.
    pub fn reason(&self) -> &'static str {
        match self {
            ExchangeError::AlreadyExists => "Exchange already exists",
            ExchangeError::InvalidToken => "Invalid token address",
            ExchangeError::ImplementationNotSet | ExchangeError::InvalidImplementation => {
                "Invalid implementation"
            }
            ExchangeError::NotOwner => "Ownable: caller is not the owner",
            ExchangeError::InvalidOwner => "Ownable: new owner is the zero address",
            ExchangeError::InsufficientCurrency => "Insufficient ETH",
            ExchangeError::InsufficientAllowance => "ERC20: insufficient allowance",
            ExchangeError::TransferFailed(_) => "Unable to send ether to the trader",
            ExchangeError::ReentrantCall => "ReentrancyGuard: reentrant call",
            ExchangeError::InvalidAmount => "Invalid amount",
            ExchangeError::InvalidPrice => "Invalid price",
            ExchangeError::OrderNotFound(_) => "Order not found",
            ExchangeError::Overflow => "Math overflow",
            ExchangeError::InsufficientBalance => "Insufficient balance for attached value",
            ExchangeError::Persistence(_) => "Persistence error",
        }
    }
}

impl From<TransferError> for ExchangeError {
    fn from(e: TransferError) -> Self {
        ExchangeError::TransferFailed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable() {
        assert_eq!(ExchangeError::AlreadyExists.to_string(), "Exchange already exists");
        assert_eq!(ExchangeError::InvalidToken.reason(), "Invalid token address");
        assert_eq!(
            ExchangeError::ImplementationNotSet.reason(),
            ExchangeError::InvalidImplementation.reason()
        );
        assert_eq!(
            ExchangeError::InsufficientAllowance.to_string(),
            "ERC20: insufficient allowance"
        );
    }

    #[test]
    fn transfer_failure_keeps_cause_in_message_but_not_reason() {
        let err: ExchangeError = TransferError::Rejected {
            to: Address::from_low_u64(9),
            reason: "no receive".into(),
        }
        .into();
        assert_eq!(err.reason(), "Unable to send ether to the trader");
        assert!(err.to_string().contains("no receive"));
    }
}
