//! Core types and identifiers for the exchange engine.
//!
//! All identifiers are newtype wrappers. [`Order`] and [`Side`] define the order
//! record kept in the append-only order store.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Quantity of token units or base-currency units (smallest denomination).
pub type Amount = u128;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// 20-byte account / contract identity. [`Address::ZERO`] is never a valid party.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Derives the address of the `nonce`-th entity deployed by `deployer`:
    /// the last 20 bytes of `sha256(deployer || nonce_le)`.
    pub fn derive(deployer: &Address, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(deployer.0);
        hasher.update(nonce.to_le_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..32]);
        Address(out)
    }

    /// Builds a test/demo address whose last 8 bytes hold `n` (big-endian).
    pub fn from_low_u64(n: u64) -> Self {
        let mut out = [0u8; 20];
        out[12..].copy_from_slice(&n.to_be_bytes());
        Address(out)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).ok()?;
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Address::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid address"))
    }
}

/// Sequential order identifier; dense from zero within one exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn from_buy(buy: bool) -> Self {
        if buy {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// One entry of the order store.
///
/// `amount` is the quantity still unfilled. Once `active` is false the record
/// is frozen: a closed order keeps the remainder it had when it was closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub trader: Address,
    pub amount: Amount,
    pub price: Amount,
    pub side: Side,
    pub active: bool,
    pub is_limit: bool,
    pub date: Timestamp,
}

impl Order {
    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    /// True if this order is consumable liquidity for a taker on the opposite side.
    pub fn is_tradable(&self) -> bool {
        self.active && self.is_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_address_is_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_low_u64(1).is_zero());
    }

    #[test]
    fn derived_addresses_are_deterministic_and_distinct() {
        let deployer = Address::from_low_u64(7);
        let a = Address::derive(&deployer, 0);
        assert_eq!(a, Address::derive(&deployer, 0));
        assert_ne!(a, Address::derive(&deployer, 1));
        assert!(!a.is_zero());
    }

    #[test]
    fn hex_display_parses_back() {
        let a = Address::from_low_u64(0xdead_beef);
        let s = a.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 42);
        assert_eq!(Address::from_hex(&s), Some(a));
        assert_eq!(Address::from_hex("0x1234"), None);
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let a = Address::from_low_u64(5);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn side_helpers() {
        assert_eq!(Side::from_buy(true), Side::Buy);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert!(!Side::Sell.is_buy());
    }

    #[test]
    fn default_order_id_is_the_first_id() {
        assert_eq!(OrderId::default(), OrderId(0));
        assert_eq!(crate::matching::Receipt::default().order_id, OrderId(0));
    }
}
