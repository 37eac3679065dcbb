//! Value Objects for the Secure-COD domain

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phone number value object, canonicalized for use as a lookup key.
///
/// Canonical form: every non-digit stripped, then only the trailing ten
/// digits kept (drops `+91`-style country prefixes), so differently
/// formatted representations of the same number resolve to the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn canonicalize(raw: impl AsRef<str>) -> Result<Self, PhoneError> {
        let digits: String = raw.as_ref().chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 10 {
            return Err(PhoneError::TooShort);
        }
        Ok(Self(digits[digits.len() - 10..].to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub enum PhoneError { TooShort }
impl std::error::Error for PhoneError {}
impl fmt::Display for PhoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::TooShort => write!(f, "Phone number has fewer than ten digits") }
    }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn inr(amount: Decimal) -> Self { Self::new(amount, "INR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_positive(&self) -> bool { self.amount > Decimal::ZERO }

    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }

    /// Integer minor units (paise for INR), rounded half-up to the nearest
    /// minor unit. Every gateway-bound amount goes through this conversion.
    pub fn minor_units(&self) -> Result<i64, MoneyError> {
        let rounded = self
            .amount
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        (rounded * Decimal::from(100)).to_i64().ok_or(MoneyError::OutOfRange)
    }

    pub fn from_minor_units(minor: i64, currency: &str) -> Self {
        Self::new(Decimal::new(minor, 2), currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[derive(Debug, Clone)] pub enum MoneyError { CurrencyMismatch, OutOfRange }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrencyMismatch => write!(f, "Currency mismatch"),
            Self::OutOfRange => write!(f, "Amount out of range for minor units"),
        }
    }
}
