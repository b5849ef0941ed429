//! Core types used throughout the system
//!
//! Identifiers, parties and the small closed vocabularies (asset, direction,
//! payment method) shared by the trade and vendor state machines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User ID - resolved by the identity provider, immutable after assignment.
pub type UserId = u64;

/// Declares a ULID-backed identifier newtype.
///
/// ULIDs are sortable, need no coordination between workers and carry
/// enough entropy that ids never collide across trades.
macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique id
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Get the inner ULID value
            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

ulid_id!(
    /// Trade request (offer) identifier
    TradeRequestId
);
ulid_id!(
    /// Matched trade identifier. Also the idempotency key for every
    /// custodian call made on behalf of the trade.
    TradeId
);
ulid_id!(
    /// Cash handoff job identifier
    VendorJobId
);

/// Crypto asset held in escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Btc,
    Eth,
    Usdt,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Btc => "BTC",
            AssetType::Eth => "ETH",
            AssetType::Usdt => "USDT",
        }
    }

    /// Smallest on-chain unit, used to reject amounts finer than the chain can hold
    pub fn decimals(&self) -> u32 {
        match self {
            AssetType::Btc => 8,
            AssetType::Eth => 18,
            AssetType::Usdt => 6,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BTC" => Ok(AssetType::Btc),
            "ETH" => Ok(AssetType::Eth),
            "USDT" => Ok(AssetType::Usdt),
            _ => Err(format!("Invalid asset type: {}", s)),
        }
    }
}

/// Side of the requester. A `Sell` requester delivers crypto into escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            _ => Err(format!("Invalid direction: {}", s)),
        }
    }
}

/// How the fiat leg moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    CashPickup,
    CashDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CashPickup => "cash_pickup",
            PaymentMethod::CashDelivery => "cash_delivery",
        }
    }

    /// Physical handoff kind, if this method moves cash in person
    pub fn delivery_type(&self) -> Option<DeliveryType> {
        match self {
            PaymentMethod::BankTransfer => None,
            PaymentMethod::CashPickup => Some(DeliveryType::Pickup),
            PaymentMethod::CashDelivery => Some(DeliveryType::Delivery),
        }
    }

    #[inline]
    pub fn requires_handoff(&self) -> bool {
        self.delivery_type().is_some()
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cash_pickup" => Ok(PaymentMethod::CashPickup),
            "cash_delivery" => Ok(PaymentMethod::CashDelivery),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

/// Physical cash handoff kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    Pickup,
    Delivery,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Pickup => "pickup",
            DeliveryType::Delivery => "delivery",
        }
    }
}

impl fmt::Display for DeliveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pickup" => Ok(DeliveryType::Pickup),
            "delivery" => Ok(DeliveryType::Delivery),
            _ => Err(format!("Invalid delivery type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_parse_roundtrip() {
        let id = TradeId::new();
        let parsed: TradeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<TradeId>().is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TradeRequestId::new(), TradeRequestId::new());
    }

    #[test]
    fn test_payment_method_handoff() {
        assert!(!PaymentMethod::BankTransfer.requires_handoff());
        assert_eq!(
            PaymentMethod::CashPickup.delivery_type(),
            Some(DeliveryType::Pickup)
        );
        assert_eq!(
            PaymentMethod::CashDelivery.delivery_type(),
            Some(DeliveryType::Delivery)
        );
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("btc".parse::<AssetType>(), Ok(AssetType::Btc));
        assert_eq!("SELL".parse::<Direction>(), Ok(Direction::Sell));
        assert_eq!(
            "cash_pickup".parse::<PaymentMethod>(),
            Ok(PaymentMethod::CashPickup)
        );
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
        assert_eq!(serde_json::to_string(&AssetType::Usdt).unwrap(), "\"USDT\"");
    }
}
