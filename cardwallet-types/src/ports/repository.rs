//! Repository port trait.
//!
//! This is the persistence port of the ledger. Adapters (Postgres, SQLite, in-memory test
//! doubles) implement it.

use crate::domain::{
    BalanceChange, Card, CardEffect, CardId, CardTransaction, Currency, EntryDirection,
    EventReceipt, FeeSetting, FundingAttempt, FundingAttemptStatus, FundingBalances,
    FundingCommit, Money, UserId, Wallet, WalletEntry, WalletId, WalletTransaction, WebhookEvent,
};
use crate::error::RepoError;

/// Persistence port for wallets, cards, their trails, fee settings and webhook events.
///
/// Every method documented as a unit MUST apply all of its writes or none of them, and must
/// serialize concurrent balance changes on the same account.
#[async_trait::async_trait]
pub trait LedgerRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Fee Settings
    // ─────────────────────────────────────────────────────────────────────────────

    async fn list_fee_settings(&self) -> Result<Vec<FeeSetting>, RepoError>;

    /// Inserts or replaces the setting with the same key.
    async fn upsert_fee_setting(&self, setting: FeeSetting) -> Result<FeeSetting, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Wallets
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the user's wallet for `currency`, creating an empty one if absent.
    async fn open_wallet(&self, user_id: UserId, currency: Currency) -> Result<Wallet, RepoError>;

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError>;

    async fn find_wallet(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Wallet>, RepoError>;

    async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, RepoError>;

    /// Unit: moves the balance and appends the matching trail line.
    ///
    /// Fails with `InsufficientFunds` for a debit that would go negative and with `Conflict`
    /// when `entry.unique_reference` is set and the reference already exists on the wallet.
    async fn post_wallet_entry(&self, entry: WalletEntry) -> Result<BalanceChange, RepoError>;

    /// Moves the balance only. The returned change has no `transaction_id`.
    async fn change_wallet_balance(
        &self,
        wallet_id: WalletId,
        direction: EntryDirection,
        amount: Money,
    ) -> Result<BalanceChange, RepoError>;

    /// Appends a trail line without touching the balance.
    async fn append_wallet_transaction(&self, tx: WalletTransaction) -> Result<(), RepoError>;

    async fn find_wallet_transaction_by_reference(
        &self,
        wallet_id: WalletId,
        reference: &str,
    ) -> Result<Option<WalletTransaction>, RepoError>;

    /// Newest first.
    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Cards
    // ─────────────────────────────────────────────────────────────────────────────

    async fn count_cards(&self, user_id: UserId) -> Result<u32, RepoError>;

    async fn get_card(&self, card_id: &CardId) -> Result<Option<Card>, RepoError>;

    async fn list_cards(&self, user_id: UserId) -> Result<Vec<Card>, RepoError>;

    /// Unit: inserts the card and posts the wallet debit with its trail line.
    async fn commit_card_creation(
        &self,
        card: Card,
        debit: WalletEntry,
    ) -> Result<BalanceChange, RepoError>;

    /// Inserts a card without billing. Used when the billing unit failed.
    async fn insert_card(&self, card: Card) -> Result<(), RepoError>;

    async fn flag_card_for_reconciliation(
        &self,
        card_id: &CardId,
        note: &str,
    ) -> Result<(), RepoError>;

    /// Unit: applies the effect to the card, and when `receipt` is given marks that webhook
    /// event processed.
    async fn apply_card_effect(
        &self,
        card_id: &CardId,
        effect: CardEffect,
        receipt: Option<EventReceipt>,
    ) -> Result<Card, RepoError>;

    /// Newest first.
    async fn list_card_transactions(
        &self,
        card_id: &CardId,
    ) -> Result<Vec<CardTransaction>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Funding (idempotency + atomic commit)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Records a pending attempt. Fails with `Conflict` if the user already used the key.
    async fn begin_funding_attempt(&self, attempt: FundingAttempt) -> Result<(), RepoError>;

    /// Keys are scoped to the user who submitted them.
    async fn get_funding_attempt(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<FundingAttempt>, RepoError>;

    async fn finish_funding_attempt(
        &self,
        user_id: UserId,
        key: &str,
        status: FundingAttemptStatus,
        detail: Option<String>,
    ) -> Result<(), RepoError>;

    /// Unit: wallet debit + trail, card balance + card trail, attempt marked succeeded.
    async fn commit_card_funding(
        &self,
        commit: FundingCommit,
    ) -> Result<FundingBalances, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhook Events
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores the event. Returns `false` when the `event_id` was already recorded.
    async fn record_webhook_event(&self, event: WebhookEvent) -> Result<bool, RepoError>;

    async fn get_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, RepoError>;

    async fn mark_webhook_processed(&self, event_id: &str) -> Result<(), RepoError>;

    /// Bumps `attempts` and stores the error, leaving the event unprocessed.
    async fn mark_webhook_failed(&self, event_id: &str, error: &str) -> Result<(), RepoError>;

    /// Oldest first.
    async fn list_unprocessed_webhook_events(
        &self,
        limit: u32,
    ) -> Result<Vec<WebhookEvent>, RepoError>;
}
