//! Value Objects for orders and payments

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Money value object in integer minor units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount_cents: i64, currency: String }

impl Money {
    pub fn new(amount_cents: i64, currency: &str) -> Self { Self { amount_cents, currency: currency.to_uppercase() } }
    pub fn zero(currency: &str) -> Self { Self::new(0, currency) }
    pub fn amount_cents(&self) -> i64 { self.amount_cents }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let sum = self.amount_cents.checked_add(other.amount_cents).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(sum, &self.currency))
    }
    pub fn multiply(&self, qty: i32) -> Result<Money, MoneyError> {
        let product = self.amount_cents.checked_mul(i64::from(qty)).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(product, &self.currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount_cents < 0 { "-" } else { "" };
        let abs = self.amount_cents.unsigned_abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::CurrencyMismatch => write!(f, "Currency mismatch"), Self::Overflow => write!(f, "Amount overflow") }
    }
}

/// Converts a minor-unit amount with an exchange rate, rounding half away from zero.
///
/// Display-only: stored financial data is never converted.
pub fn convert(amount_cents: i64, rate: Decimal) -> Option<i64> {
    if rate <= Decimal::ZERO { return None; }
    Decimal::from(amount_cents)
        .checked_mul(rate)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Client-supplied token that makes a financial request safe to repeat.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub const MAX_LEN: usize = 64;

    pub fn new(value: impl Into<String>) -> Result<Self, IdempotencyKeyError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(IdempotencyKeyError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(IdempotencyKeyError::TooLong); }
        Ok(Self(value))
    }
    pub fn generate() -> Self { Self(Uuid::new_v4().simple().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum IdempotencyKeyError { Empty, TooLong }
impl std::error::Error for IdempotencyKeyError {}
impl fmt::Display for IdempotencyKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "idempotency key empty"), Self::TooLong => write!(f, "idempotency key too long") }
    }
}

/// Who an order belongs to: exactly one of a registered user or a guest email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderOwner {
    User(Uuid),
    Guest(String),
}

impl OrderOwner {
    pub fn guest(email: &str) -> Self { Self::Guest(email.trim().to_lowercase()) }

    /// Scope for order-creation idempotency keys.
    pub fn actor_key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Guest(email) => format!("guest:{email}"),
        }
    }
    pub fn user_id(&self) -> Option<Uuid> {
        match self { Self::User(id) => Some(*id), Self::Guest(_) => None }
    }
    pub fn guest_email(&self) -> Option<&str> {
        match self { Self::User(_) => None, Self::Guest(email) => Some(email) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_money_add() {
        let a = Money::new(100, "usd");
        let b = Money::new(50, "USD");
        assert_eq!(a.add(&b).unwrap().amount_cents(), 150);
        assert_eq!(a.add(&Money::new(1, "EUR")), Err(MoneyError::CurrencyMismatch));
        assert_eq!(Money::new(i64::MAX, "USD").multiply(2), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::new(123456, "EUR").to_string(), "1234.56 EUR");
        assert_eq!(Money::new(-5, "EUR").to_string(), "-0.05 EUR");
    }

    #[test]
    fn test_convert_rounds_half_away_from_zero() {
        assert_eq!(convert(1000, Decimal::from_str("1.0845").unwrap()), Some(1085));
        assert_eq!(convert(-1000, Decimal::from_str("1.0845").unwrap()), Some(-1085));
        assert_eq!(convert(999, Decimal::from_str("0.5").unwrap()), Some(500));
        assert_eq!(convert(1000, Decimal::ZERO), None);
    }

    #[test]
    fn test_idempotency_key() {
        assert_eq!(IdempotencyKey::new("  abc ").unwrap().as_str(), "abc");
        assert_eq!(IdempotencyKey::new("   "), Err(IdempotencyKeyError::Empty));
        assert_eq!(IdempotencyKey::new("x".repeat(65)), Err(IdempotencyKeyError::TooLong));
        assert_eq!(IdempotencyKey::generate().as_str().len(), 32);
    }

    #[test]
    fn test_actor_key_normalizes_guest_email() {
        let owner = OrderOwner::guest(" Jane@Example.COM ");
        assert_eq!(owner.actor_key(), "guest:jane@example.com");
        assert_eq!(owner.user_id(), None);
        let id = Uuid::nil();
        assert_eq!(OrderOwner::User(id).actor_key(), format!("user:{id}"));
    }
}
