//! Card Wallet Application Service
//!
//! Orchestrates the ledger workflows through the repository and card issuer ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! Every workflow that touches the issuer calls it before any local balance moves, and
//! escalates to `CompensationNeeded` when the local write fails after the issuer said yes.

use std::future::Future;
use std::time::Duration;

use cardwallet_types::{
    AppError, Card, CardId, CardProviderClient, Currency, FeeSchedule, LedgerRepository, Money,
    ProviderError, UserId, Wallet,
};

mod admin;
mod cards;
mod fees;
mod funding;
mod provisioning;
mod reconcile;
mod wallets;

/// Limits applied by the workflows.
#[derive(Debug, Clone, Copy)]
pub struct ServicePolicy {
    pub max_cards_per_user: u32,
    /// Upper bound on any single issuer call, whatever the client does internally.
    pub provider_timeout: Duration,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            max_cards_per_user: 10,
            provider_timeout: Duration::from_secs(30),
        }
    }
}

/// Application service for the card wallet ledger.
///
/// Generic over `R: LedgerRepository` and `P: CardProviderClient` - both adapters are
/// injected at compile time, which lets tests swap in an in-memory repo and a scripted issuer.
pub struct CardWalletService<R: LedgerRepository, P: CardProviderClient> {
    repo: R,
    provider: P,
    policy: ServicePolicy,
}

impl<R: LedgerRepository, P: CardProviderClient> CardWalletService<R, P> {
    /// Creates a new service with the default policy.
    pub fn new(repo: R, provider: P) -> Self {
        Self {
            repo,
            provider,
            policy: ServicePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ServicePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Shared helpers
    // ─────────────────────────────────────────────────────────────────────────────

    /// Fresh snapshot of the fee settings for one workflow invocation.
    async fn fee_schedule(&self) -> Result<FeeSchedule, AppError> {
        let settings = self.repo.list_fee_settings().await?;
        Ok(FeeSchedule::from_settings(&settings))
    }

    /// Bounds an issuer call. Elapsed time is an ambiguous outcome, reported as `Timeout`.
    async fn call_provider<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.policy.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "{} did not answer within {:?}",
                operation, self.policy.provider_timeout
            ))),
        }
    }

    /// Loads a card the caller owns. Foreign and missing cards look the same to the caller.
    async fn owned_card(&self, user_id: UserId, card_id: &CardId) -> Result<Card, AppError> {
        match self.repo.get_card(card_id).await? {
            Some(card) if card.is_owned_by(user_id) => Ok(card),
            _ => Err(AppError::NotFoundOrUnauthorized(format!("Card {}", card_id))),
        }
    }

    async fn wallet_for(&self, user_id: UserId, currency: Currency) -> Result<Wallet, AppError> {
        self.repo
            .find_wallet(user_id, currency)
            .await?
            .ok_or(AppError::WalletNotFound(currency))
    }
}

pub(crate) fn parse_currency(raw: &str) -> Result<Currency, AppError> {
    raw.parse::<Currency>().map_err(AppError::from)
}

/// Refuses before any external call when the wallet cannot cover `required`.
pub(crate) fn ensure_covers(wallet: &Wallet, required: Money) -> Result<(), AppError> {
    if wallet.balance.covers(&required) {
        return Ok(());
    }
    Err(AppError::InsufficientFunds {
        available: wallet.balance,
        required,
        shortfall: wallet.balance.shortfall_to(&required),
    })
}
