//! Value Objects for the order desk

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
            pub fn generate() -> Self { Self(Uuid::now_v7().to_string()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self { Self(value.to_string()) }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self { Self(value) }
        }
    };
}

id_type!(ProductId);
id_type!(
    /// One color x size combination of a product.
    VariantId
);
id_type!(
    /// A warehouse ("stock" on the wire).
    WarehouseId
);
id_type!(OrderId);
id_type!(UserId);
id_type!(RequestId);

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn usd(amount: Decimal) -> Self { Self::new(amount, "USD") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_negative(&self) -> bool { self.amount.is_sign_negative() && !self.amount.is_zero() }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    /// Subtracts, flooring the result at zero.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new((self.amount - other.amount).max(Decimal::ZERO), &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero("USD") } }

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Non-negative stock quantity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn new(value: u32) -> Self { Self(value) }

    /// Quantities reported by a backend may be signed; anything below zero means none.
    pub fn from_reported(value: i64) -> Self {
        Self(value.clamp(0, i64::from(u32::MAX)) as u32)
    }

    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self { Self(value) }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Free-text reason a customer gives for a cancel or return request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reason(String);

impl Reason {
    pub const MAX_LEN: usize = 1000;

    pub fn new(value: impl Into<String>) -> Result<Self, ReasonError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(ReasonError::Empty); }
        if value.chars().count() > Self::MAX_LEN { return Err(ReasonError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Reason {
    type Error = ReasonError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Reason> for String {
    fn from(reason: Reason) -> Self { reason.0 }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ReasonError { Empty, TooLong }
impl std::error::Error for ReasonError {}
impl fmt::Display for ReasonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "reason must not be empty"),
            Self::TooLong => write!(f, "reason must be at most {} characters", Reason::MAX_LEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_reason_trims() { assert_eq!(Reason::new("  damaged ").unwrap().as_str(), "damaged"); }
    #[test]
    fn test_reason_rejects_blank() { assert_eq!(Reason::new("   "), Err(ReasonError::Empty)); }
    #[test]
    fn test_reason_rejects_long() { assert_eq!(Reason::new("x".repeat(1001)), Err(ReasonError::TooLong)); }
    #[test]
    fn test_reported_quantity_floors_at_zero() {
        assert_eq!(Quantity::from_reported(-3), Quantity::ZERO);
        assert_eq!(Quantity::from_reported(7).value(), 7);
    }
    #[test]
    fn test_money_saturating_sub() {
        let a = Money::usd(Decimal::new(10, 0));
        let b = Money::usd(Decimal::new(50, 0));
        assert_eq!(a.saturating_sub(&b).unwrap().amount(), Decimal::ZERO);
        assert_eq!(a.add(&Money::zero("EUR")), Err(MoneyError::CurrencyMismatch));
    }
}
