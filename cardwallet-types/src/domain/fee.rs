//! Fee schedule and fee calculator.
//!
//! The schedule is a key/value snapshot of administrator-owned settings. Keys follow
//! `{operation}_fixed_fee_{currency}`, `{operation}_percent_fee` and
//! `min_{operation}_{currency}`. Workflows load it once per operation and hand it to
//! [`compute_fees`] / [`minimum_amount`], which never touch I/O.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::money::{Currency, Money};
use crate::error::DomainError;

/// Operations that carry a fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeOperation {
    CardCreation,
    CardReload,
}

impl FeeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeOperation::CardCreation => "card_creation",
            FeeOperation::CardReload => "card_reload",
        }
    }

    pub fn fixed_fee_key(&self, currency: Currency) -> String {
        format!("{}_fixed_fee_{}", self.as_str(), currency.key_suffix())
    }

    pub fn percent_fee_key(&self) -> String {
        format!("{}_percent_fee", self.as_str())
    }

    pub fn minimum_key(&self, currency: Currency) -> String {
        format!("min_{}_{}", self.as_str(), currency.key_suffix())
    }
}

impl std::fmt::Display for FeeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeeOperation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card_creation" | "creation" => Ok(FeeOperation::CardCreation),
            "card_reload" | "reload" | "funding" => Ok(FeeOperation::CardReload),
            other => Err(DomainError::ValidationError(format!(
                "Unknown fee operation: {}",
                other
            ))),
        }
    }
}

/// One persisted fee parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSetting {
    pub key: String,
    pub value: Decimal,
    pub currency: Option<Currency>,
    pub updated_at: DateTime<Utc>,
}

impl FeeSetting {
    /// Validates and builds a setting. Keys are `[a-z0-9_]+`, values are never negative.
    pub fn new(
        key: impl Into<String>,
        value: Decimal,
        currency: Option<Currency>,
    ) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(DomainError::ValidationError(format!(
                "Invalid fee setting key: '{}'",
                key
            )));
        }
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::ValidationError(format!(
                "Fee setting '{}' cannot be negative",
                key
            )));
        }
        Ok(Self {
            key,
            value,
            currency,
            updated_at: Utc::now(),
        })
    }
}

/// Immutable snapshot of all fee settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeSchedule {
    values: HashMap<String, Decimal>,
}

impl FeeSchedule {
    pub fn from_settings(settings: &[FeeSetting]) -> Self {
        Self {
            values: settings
                .iter()
                .map(|s| (s.key.clone(), s.value))
                .collect(),
        }
    }

    /// Builder used by tests and fixtures.
    pub fn with(mut self, key: impl Into<String>, value: Decimal) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn lookup(&self, key: &str) -> Option<Decimal> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Derived fee split for one operation. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub operation: FeeOperation,
    pub currency: Currency,
    pub base_amount: Decimal,
    pub fixed_fee: Decimal,
    /// Configured percentage, e.g. `2` for 2%.
    pub percent_rate: Decimal,
    pub percent_fee: Decimal,
    pub total_fee: Decimal,
    pub total_amount: Decimal,
}

impl FeeBreakdown {
    pub fn base(&self) -> Result<Money, DomainError> {
        Money::new(self.base_amount, self.currency)
    }

    pub fn total(&self) -> Result<Money, DomainError> {
        Money::new(self.total_amount, self.currency)
    }

    /// Human-readable split used in trail descriptions.
    pub fn describe(&self) -> String {
        format!(
            "principal {} {cur} + fees {} {cur} (fixed {} + {}% = {})",
            self.base_amount,
            self.total_fee,
            self.fixed_fee,
            self.percent_rate,
            self.percent_fee,
            cur = self.currency
        )
    }
}

fn round_fee(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Computes the fee split for `base_amount`.
///
/// Fails with `InvalidAmount` when the amount is zero or negative. Missing settings count as zero.
pub fn compute_fees(
    operation: FeeOperation,
    base_amount: Decimal,
    currency: Currency,
    schedule: &FeeSchedule,
) -> Result<FeeBreakdown, DomainError> {
    if base_amount <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!(
            "{} must be greater than zero, got {}",
            operation, base_amount
        )));
    }

    let fixed_fee = round_fee(
        schedule
            .lookup(&operation.fixed_fee_key(currency))
            .unwrap_or(Decimal::ZERO),
    );
    let percent_rate = schedule
        .lookup(&operation.percent_fee_key())
        .unwrap_or(Decimal::ZERO);
    let percent_fee = round_fee(
        base_amount
            .checked_mul(percent_rate)
            .ok_or_else(|| DomainError::InvalidAmount("amount overflow".into()))?
            / Decimal::ONE_HUNDRED,
    );
    let total_fee = fixed_fee + percent_fee;
    let total_amount = base_amount
        .checked_add(total_fee)
        .ok_or_else(|| DomainError::InvalidAmount("amount overflow".into()))?;

    Ok(FeeBreakdown {
        operation,
        currency,
        base_amount,
        fixed_fee,
        percent_rate,
        percent_fee,
        total_fee,
        total_amount,
    })
}

/// Smallest accepted base amount: `min_{operation}_{currency}` or the currency floor.
pub fn minimum_amount(
    operation: FeeOperation,
    currency: Currency,
    schedule: &FeeSchedule,
) -> Decimal {
    schedule
        .lookup(&operation.minimum_key(currency))
        .unwrap_or_else(|| currency.default_minimum())
}

/// Computes fees and enforces the minimum in one step.
pub fn quote(
    operation: FeeOperation,
    base_amount: Decimal,
    currency: Currency,
    schedule: &FeeSchedule,
) -> Result<FeeBreakdown, DomainError> {
    let breakdown = compute_fees(operation, base_amount, currency, schedule)?;
    let minimum = minimum_amount(operation, currency, schedule);
    if base_amount < minimum {
        return Err(DomainError::BelowMinimum {
            amount: Money::new(base_amount, currency)?,
            minimum: Money::new(minimum, currency)?,
        });
    }
    Ok(breakdown)
}
