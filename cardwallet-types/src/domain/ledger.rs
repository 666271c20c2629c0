//! Balance-carrying accounts (wallets and cards).

use super::money::Money;
use crate::error::DomainError;

/// A balance with a currency and a version token.
///
/// `debit` and `credit` are the only ways a balance changes. Both check the currency
/// before touching the balance and a debit never drives it below zero. Persisting the
/// new balance is a conditional write on [`version`](LedgerAccount::version): adapters
/// compare the version they read against the stored one.
pub trait LedgerAccount {
    fn balance(&self) -> Money;

    fn version(&self) -> i64;

    /// Stores an already validated balance and bumps the version.
    fn store_balance(&mut self, balance: Money);

    /// Subtracts `amount`, failing with `InsufficientFunds` or `CurrencyMismatch`.
    fn debit(&mut self, amount: Money) -> Result<Money, DomainError> {
        let next = self.balance().checked_sub(amount)?;
        self.store_balance(next);
        Ok(next)
    }

    /// Adds `amount`, failing with `CurrencyMismatch`.
    fn credit(&mut self, amount: Money) -> Result<Money, DomainError> {
        let next = self.balance().checked_add(amount)?;
        self.store_balance(next);
        Ok(next)
    }
}
