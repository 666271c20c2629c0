//! Decimal monetary value with embedded currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Currencies a wallet or card can be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    XOF,
    NGN,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::USD, Currency::XOF, Currency::NGN];

    /// Number of decimal places used when displaying amounts.
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::USD | Currency::NGN => 2,
            Currency::XOF => 0,
        }
    }

    /// ISO code, upper case.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::XOF => "XOF",
            Currency::NGN => "NGN",
        }
    }

    /// Lower-case code used inside fee setting keys.
    pub fn key_suffix(&self) -> String {
        self.code().to_lowercase()
    }

    /// Smallest card or wallet amount accepted when no minimum is configured.
    pub fn default_minimum(&self) -> Decimal {
        match self {
            Currency::USD => Decimal::ONE,
            Currency::XOF => Decimal::from(5000),
            Currency::NGN => Decimal::from(1000),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "XOF" => Ok(Currency::XOF),
            "NGN" => Ok(Currency::NGN),
            other => Err(DomainError::UnsupportedCurrency(other.to_string())),
        }
    }
}

/// Non-negative decimal amount in a given currency.
///
/// Amounts are kept as `Decimal` so repeated fee computations never drift by a cent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, DomainError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(&other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| DomainError::InvalidAmount("amount overflow".into()))?;
        Ok(Money {
            amount,
            currency: self.currency,
        })
    }

    /// Checked subtraction - returns error if currencies don't match or result would be negative.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(&other)?;
        if self.amount < other.amount {
            return Err(DomainError::InsufficientFunds {
                available: *self,
                requested: other,
            });
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency,
        })
    }

    /// Amount missing to cover `required`, zero when already covered.
    pub fn shortfall_to(&self, required: &Money) -> Money {
        let missing = required.amount - self.amount;
        Money {
            amount: if missing > Decimal::ZERO {
                missing
            } else {
                Decimal::ZERO
            },
            currency: required.currency,
        }
    }

    /// Returns true if this Money covers `other` in the same currency.
    pub fn covers(&self, other: &Money) -> bool {
        self.currency == other.currency && self.amount >= other.amount
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = self.currency.decimal_places().max(self.amount.scale().min(2));
        write!(
            f,
            "{:.*} {}",
            places as usize,
            self.amount.round_dp(places),
            self.currency
        )
    }
}
