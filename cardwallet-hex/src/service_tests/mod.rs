//! CardWalletService unit tests.
//!
//! The workflows run against an in-memory repository and a scripted card issuer, so each
//! test can decide exactly where a failure happens.

mod cards;
mod funding;
mod provisioning;
mod reconcile;
mod wallets;

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use cardwallet_types::ports::{
    CardDetail, CardFunded, CardStatusChanged, IssueCardRequest, IssuedCard,
};
use cardwallet_types::{
    BalanceChange, Card, CardEffect, CardId, CardProviderClient, CardStatus, CardTransaction,
    CardType, Currency, EntryDirection, EventReceipt, FeeSetting, FundingAttempt,
    FundingAttemptStatus, FundingBalances, FundingCommit, LedgerAccount, LedgerRepository, Money,
    ProviderError, RepoError, UserId, Wallet, WalletEntry, WalletId, WalletTransaction,
    WebhookEvent,
};

use crate::{CardWalletService, ServicePolicy};

// ─────────────────────────────────────────────────────────────────────────────
// In-memory repository
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Ledger {
    fees: HashMap<String, FeeSetting>,
    wallets: HashMap<WalletId, Wallet>,
    wallet_txs: Vec<WalletTransaction>,
    cards: HashMap<CardId, Card>,
    card_txs: Vec<CardTransaction>,
    attempts: HashMap<(UserId, String), FundingAttempt>,
    events: Vec<WebhookEvent>,
}

impl Ledger {
    fn wallet_mut(&mut self, id: WalletId) -> Result<&mut Wallet, RepoError> {
        self.wallets.get_mut(&id).ok_or(RepoError::NotFound)
    }

    fn has_reference(&self, wallet_id: WalletId, reference: &str) -> bool {
        self.wallet_txs
            .iter()
            .any(|t| t.wallet_id == wallet_id && t.reference == reference)
    }

    /// Checks and applies an entry without committing anything on failure.
    fn post(&mut self, entry: &WalletEntry) -> Result<BalanceChange, RepoError> {
        if entry.unique_reference && self.has_reference(entry.wallet_id, &entry.reference) {
            return Err(RepoError::Conflict(format!(
                "Reference {} already posted",
                entry.reference
            )));
        }
        let mut wallet = self.wallet_mut(entry.wallet_id)?.clone();
        let old_balance = wallet.balance.amount();
        match entry.direction {
            EntryDirection::Debit => wallet.debit(entry.amount)?,
            EntryDirection::Credit => wallet.credit(entry.amount)?,
        };
        let tx = entry.to_transaction();
        let change = BalanceChange {
            wallet_id: wallet.id,
            currency: wallet.currency(),
            old_balance,
            new_balance: wallet.balance.amount(),
            transaction_id: Some(tx.id),
        };
        self.wallets.insert(wallet.id, wallet);
        self.wallet_txs.push(tx);
        Ok(change)
    }

    fn event_mut(&mut self, event_id: &str) -> Result<&mut WebhookEvent, RepoError> {
        self.events
            .iter_mut()
            .find(|e| e.event_id == event_id)
            .ok_or(RepoError::NotFound)
    }
}

/// In-memory `LedgerRepository`. One mutex around everything makes every method a unit.
#[derive(Default)]
pub struct MockRepo {
    ledger: Mutex<Ledger>,
    fail_commits: AtomicBool,
    fail_appends: AtomicBool,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard schedule: USD creation 1.00 + 2%, USD reload 0.40 + 2%.
    pub fn with_standard_fees() -> Self {
        let repo = Self::new();
        {
            let mut ledger = repo.ledger.lock().unwrap();
            for (key, value, currency) in [
                ("card_creation_fixed_fee_usd", Decimal::ONE, Some(Currency::USD)),
                ("card_creation_percent_fee", Decimal::TWO, None),
                ("card_reload_fixed_fee_usd", Decimal::new(40, 2), Some(Currency::USD)),
                ("card_reload_percent_fee", Decimal::TWO, None),
            ] {
                let setting = FeeSetting::new(key, value, currency).unwrap();
                ledger.fees.insert(setting.key.clone(), setting);
            }
        }
        repo
    }

    /// Makes `commit_card_creation` and `commit_card_funding` fail.
    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    /// Makes `append_wallet_transaction` and `apply_card_effect` fail.
    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }

    pub fn seed_wallet(&self, user_id: UserId, amount: i64, currency: Currency) -> Wallet {
        let mut wallet = Wallet::open(user_id, currency);
        wallet.balance = Money::new(Decimal::from(amount), currency).unwrap();
        self.ledger
            .lock()
            .unwrap()
            .wallets
            .insert(wallet.id, wallet.clone());
        wallet
    }

    pub fn seed_card(&self, user_id: UserId, card_id: &str, balance: i64) -> Card {
        let now = Utc::now();
        let card = Card {
            card_id: CardId::new(card_id),
            user_id,
            customer_id: "cus-1".into(),
            balance: Money::new(Decimal::from(balance), Currency::USD).unwrap(),
            status: CardStatus::Active,
            card_type: CardType::Visa,
            name_on_card: "Ada Lovelace".into(),
            masked_number: None,
            expiry: None,
            raw_provider_response: serde_json::Value::Null,
            needs_reconciliation: false,
            reconciliation_note: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.ledger
            .lock()
            .unwrap()
            .cards
            .insert(card.card_id.clone(), card.clone());
        card
    }

    pub fn wallet(&self, id: WalletId) -> Wallet {
        self.ledger.lock().unwrap().wallets[&id].clone()
    }

    pub fn card(&self, id: &str) -> Option<Card> {
        self.ledger
            .lock()
            .unwrap()
            .cards
            .get(&CardId::new(id))
            .cloned()
    }

    pub fn wallet_trail(&self, id: WalletId) -> Vec<WalletTransaction> {
        self.ledger
            .lock()
            .unwrap()
            .wallet_txs
            .iter()
            .filter(|t| t.wallet_id == id)
            .cloned()
            .collect()
    }

    pub fn card_trail(&self, id: &str) -> Vec<CardTransaction> {
        self.ledger
            .lock()
            .unwrap()
            .card_txs
            .iter()
            .filter(|t| t.card_id.as_str() == id)
            .cloned()
            .collect()
    }

    pub fn event(&self, event_id: &str) -> Option<WebhookEvent> {
        self.ledger
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|e| e.event_id == event_id)
            .cloned()
    }

    fn check(&self, switch: &AtomicBool, what: &str) -> Result<(), RepoError> {
        if switch.load(Ordering::SeqCst) {
            return Err(RepoError::Database(format!("{} unavailable", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for MockRepo {
    async fn list_fee_settings(&self) -> Result<Vec<FeeSetting>, RepoError> {
        Ok(self.ledger.lock().unwrap().fees.values().cloned().collect())
    }

    async fn upsert_fee_setting(&self, setting: FeeSetting) -> Result<FeeSetting, RepoError> {
        self.ledger
            .lock()
            .unwrap()
            .fees
            .insert(setting.key.clone(), setting.clone());
        Ok(setting)
    }

    async fn open_wallet(&self, user_id: UserId, currency: Currency) -> Result<Wallet, RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        if let Some(wallet) = ledger
            .wallets
            .values()
            .find(|w| w.user_id == user_id && w.currency() == currency)
        {
            return Ok(wallet.clone());
        }
        let wallet = Wallet::open(user_id, currency);
        ledger.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError> {
        Ok(self.ledger.lock().unwrap().wallets.get(&id).cloned())
    }

    async fn find_wallet(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Wallet>, RepoError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .wallets
            .values()
            .find(|w| w.user_id == user_id && w.currency() == currency)
            .cloned())
    }

    async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, RepoError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .wallets
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn post_wallet_entry(&self, entry: WalletEntry) -> Result<BalanceChange, RepoError> {
        self.ledger.lock().unwrap().post(&entry)
    }

    async fn change_wallet_balance(
        &self,
        wallet_id: WalletId,
        direction: EntryDirection,
        amount: Money,
    ) -> Result<BalanceChange, RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        let wallet = ledger.wallet_mut(wallet_id)?;
        let old_balance = wallet.balance.amount();
        match direction {
            EntryDirection::Debit => wallet.debit(amount)?,
            EntryDirection::Credit => wallet.credit(amount)?,
        };
        Ok(BalanceChange {
            wallet_id,
            currency: wallet.currency(),
            old_balance,
            new_balance: wallet.balance.amount(),
            transaction_id: None,
        })
    }

    async fn append_wallet_transaction(&self, tx: WalletTransaction) -> Result<(), RepoError> {
        self.check(&self.fail_appends, "wallet trail")?;
        self.ledger.lock().unwrap().wallet_txs.push(tx);
        Ok(())
    }

    async fn find_wallet_transaction_by_reference(
        &self,
        wallet_id: WalletId,
        reference: &str,
    ) -> Result<Option<WalletTransaction>, RepoError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .wallet_txs
            .iter()
            .find(|t| t.wallet_id == wallet_id && t.reference == reference)
            .cloned())
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError> {
        let mut trail = self.wallet_trail(wallet_id);
        trail.reverse();
        Ok(trail)
    }

    async fn count_cards(&self, user_id: UserId) -> Result<u32, RepoError> {
        let ledger = self.ledger.lock().unwrap();
        Ok(ledger.cards.values().filter(|c| c.user_id == user_id).count() as u32)
    }

    async fn get_card(&self, card_id: &CardId) -> Result<Option<Card>, RepoError> {
        Ok(self.ledger.lock().unwrap().cards.get(card_id).cloned())
    }

    async fn list_cards(&self, user_id: UserId) -> Result<Vec<Card>, RepoError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .cards
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn commit_card_creation(
        &self,
        card: Card,
        debit: WalletEntry,
    ) -> Result<BalanceChange, RepoError> {
        self.check(&self.fail_commits, "ledger")?;
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.cards.contains_key(&card.card_id) {
            return Err(RepoError::Conflict(format!("Card {}", card.card_id)));
        }
        let change = ledger.post(&debit)?;
        ledger.cards.insert(card.card_id.clone(), card);
        Ok(change)
    }

    async fn insert_card(&self, card: Card) -> Result<(), RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.cards.contains_key(&card.card_id) {
            return Err(RepoError::Conflict(format!("Card {}", card.card_id)));
        }
        ledger.cards.insert(card.card_id.clone(), card);
        Ok(())
    }

    async fn flag_card_for_reconciliation(
        &self,
        card_id: &CardId,
        note: &str,
    ) -> Result<(), RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        let card = ledger.cards.get_mut(card_id).ok_or(RepoError::NotFound)?;
        card.needs_reconciliation = true;
        card.reconciliation_note = Some(note.to_string());
        Ok(())
    }

    async fn apply_card_effect(
        &self,
        card_id: &CardId,
        effect: CardEffect,
        receipt: Option<EventReceipt>,
    ) -> Result<Card, RepoError> {
        self.check(&self.fail_appends, "card trail")?;
        let mut ledger = self.ledger.lock().unwrap();
        let mut card = ledger.cards.get(card_id).cloned().ok_or(RepoError::NotFound)?;
        let line = effect.apply_to(&mut card)?;
        if let Some(receipt) = &receipt {
            let event = ledger.event_mut(&receipt.event_id)?;
            event.processed = true;
            event.processed_at = Some(Utc::now());
        }
        if let Some(line) = line {
            ledger.card_txs.push(line);
        }
        ledger.cards.insert(card_id.clone(), card.clone());
        Ok(card)
    }

    async fn list_card_transactions(
        &self,
        card_id: &CardId,
    ) -> Result<Vec<CardTransaction>, RepoError> {
        let mut trail = self.card_trail(card_id.as_str());
        trail.reverse();
        Ok(trail)
    }

    async fn begin_funding_attempt(&self, attempt: FundingAttempt) -> Result<(), RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        let slot = (attempt.user_id, attempt.idempotency_key.clone());
        if ledger.attempts.contains_key(&slot) {
            return Err(RepoError::Conflict(format!(
                "Funding attempt {}",
                attempt.idempotency_key
            )));
        }
        ledger.attempts.insert(slot, attempt);
        Ok(())
    }

    async fn get_funding_attempt(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<FundingAttempt>, RepoError> {
        let slot = (user_id, key.to_string());
        Ok(self.ledger.lock().unwrap().attempts.get(&slot).cloned())
    }

    async fn finish_funding_attempt(
        &self,
        user_id: UserId,
        key: &str,
        status: FundingAttemptStatus,
        detail: Option<String>,
    ) -> Result<(), RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        let attempt = ledger
            .attempts
            .get_mut(&(user_id, key.to_string()))
            .ok_or(RepoError::NotFound)?;
        attempt.status = status;
        attempt.detail = detail;
        attempt.updated_at = Utc::now();
        Ok(())
    }

    async fn commit_card_funding(
        &self,
        commit: FundingCommit,
    ) -> Result<FundingBalances, RepoError> {
        self.check(&self.fail_commits, "ledger")?;
        let mut ledger = self.ledger.lock().unwrap();
        let mut card = ledger
            .cards
            .get(&commit.card_id)
            .cloned()
            .ok_or(RepoError::NotFound)?;
        card.overwrite_balance(commit.card_balance)?;
        let slot = (commit.user_id, commit.idempotency_key.clone());
        if !ledger.attempts.contains_key(&slot) {
            return Err(RepoError::NotFound);
        }

        let change = ledger.post(&commit.wallet_debit)?;
        if let Some(attempt) = ledger.attempts.get_mut(&slot) {
            attempt.status = FundingAttemptStatus::Succeeded;
        }

        ledger.card_txs.push(commit.card_transaction);
        ledger.cards.insert(card.card_id.clone(), card.clone());
        Ok(FundingBalances {
            wallet_balance: Money::new(change.new_balance, change.currency)?,
            card_balance: card.balance,
        })
    }

    async fn record_webhook_event(&self, event: WebhookEvent) -> Result<bool, RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        if ledger.events.iter().any(|e| e.event_id == event.event_id) {
            return Ok(false);
        }
        ledger.events.push(event);
        Ok(true)
    }

    async fn get_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, RepoError> {
        Ok(self.event(event_id))
    }

    async fn mark_webhook_processed(&self, event_id: &str) -> Result<(), RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        let event = ledger.event_mut(event_id)?;
        event.processed = true;
        event.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_webhook_failed(&self, event_id: &str, error: &str) -> Result<(), RepoError> {
        let mut ledger = self.ledger.lock().unwrap();
        let event = ledger.event_mut(event_id)?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn list_unprocessed_webhook_events(
        &self,
        limit: u32,
    ) -> Result<Vec<WebhookEvent>, RepoError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| !e.processed)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted card issuer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Reject,
    /// Sleeps past any sensible service timeout.
    Hang,
}

pub struct MockProvider {
    script: Mutex<Script>,
    calls: AtomicUsize,
    next_card: AtomicUsize,
    /// Balance reported by `fetch_card_detail`.
    reported_balance: Mutex<Decimal>,
}

impl MockProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            next_card: AtomicUsize::new(1),
            reported_balance: Mutex::new(Decimal::ZERO),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn report_balance(&self, balance: i64) {
        *self.reported_balance.lock().unwrap() = Decimal::from(balance);
    }

    async fn enter(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = *self.script.lock().unwrap();
        match script {
            Script::Succeed => Ok(()),
            Script::Reject => Err(ProviderError::Rejected {
                status: 400,
                message: "card declined".into(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CardProviderClient for MockProvider {
    async fn create_card(&self, request: IssueCardRequest) -> Result<IssuedCard, ProviderError> {
        self.enter().await?;
        let n = self.next_card.fetch_add(1, Ordering::SeqCst);
        Ok(IssuedCard {
            card_id: CardId::new(format!("card-{}", n)),
            customer_id: format!("cus-{}", n),
            name_on_card: request.name_on_card,
            card_type: request.card_type,
            balance: request.amount.amount(),
            currency: request.amount.currency(),
            status: CardStatus::Active,
            last4: Some("4242".into()),
            expiry: Some("12/29".into()),
            raw: serde_json::json!({ "success": true }),
        })
    }

    async fn fund_card(&self, _card_id: &CardId, _amount: Money) -> Result<CardFunded, ProviderError> {
        self.enter().await?;
        Ok(CardFunded {
            balance_after: None,
            transaction_id: Some("ptx-1".into()),
            raw: serde_json::json!({ "success": true }),
        })
    }

    async fn block_card(
        &self,
        _card_id: &CardId,
        _reason: Option<&str>,
    ) -> Result<CardStatusChanged, ProviderError> {
        self.enter().await?;
        Ok(CardStatusChanged {
            status: CardStatus::Blocked,
            raw: serde_json::json!({ "status": "frozen" }),
        })
    }

    async fn unblock_card(&self, _card_id: &CardId) -> Result<CardStatusChanged, ProviderError> {
        self.enter().await?;
        Ok(CardStatusChanged {
            status: CardStatus::Active,
            raw: serde_json::json!({ "status": "active" }),
        })
    }

    async fn fetch_card_detail(&self, _card_id: &CardId) -> Result<CardDetail, ProviderError> {
        self.enter().await?;
        Ok(CardDetail {
            balance: *self.reported_balance.lock().unwrap(),
            status: CardStatus::Active,
            last4: Some("9876".into()),
            expiry: Some("01/30".into()),
            raw: serde_json::Value::Null,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

pub type TestService = CardWalletService<MockRepo, MockProvider>;

pub fn service(script: Script) -> TestService {
    CardWalletService::new(MockRepo::with_standard_fees(), MockProvider::new(script))
}

pub fn service_with_timeout(script: Script, timeout: Duration) -> TestService {
    service(script).with_policy(ServicePolicy {
        provider_timeout: timeout,
        ..ServicePolicy::default()
    })
}

pub fn usd(amount: i64) -> Decimal {
    Decimal::from(amount)
}
