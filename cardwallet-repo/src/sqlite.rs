//! SQLite repository adapter.
//!
//! SQLite has no row locks, so balance writes are serialized in-process with a per-account
//! async mutex and guarded across processes by a `version` compare-and-swap.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use cardwallet_types::{
    BalanceChange, Card, CardEffect, CardId, CardTransaction, Currency, EntryDirection,
    EventReceipt, FeeSetting, FundingAttempt, FundingAttemptStatus, FundingBalances,
    FundingCommit, LedgerAccount, LedgerRepository, Money, RepoError, UserId, Wallet, WalletEntry,
    WalletId, WalletTransaction, WebhookEvent,
};

use crate::types::lite::{
    CardRow, CardTxRow, FeeRow, FundingRow, WalletRow, WalletTxRow, WebhookRow, ts,
};
use crate::types::{
    CARD_COLUMNS, CARD_TX_COLUMNS, FEE_COLUMNS, FUNDING_COLUMNS, WALLET_COLUMNS,
    WALLET_TX_COLUMNS, WEBHOOK_COLUMNS,
};
use crate::{MAX_VERSION_RETRIES, db_err, insert_err, stale_version, tx_err};

const MIGRATIONS: [(&str, &str); 3] = [
    ("0001", include_str!("../migrations/0001_create_ledger.sql")),
    ("0002", include_str!("../migrations/0002_create_cards.sql")),
    (
        "0003",
        include_str!("../migrations/0003_create_webhook_events.sql"),
    ),
];

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
    for (name, sql) in MIGRATIONS {
        for statement in sql.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(pool)
                    .await
                    .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
            }
        }
    }
    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        run_migrations(&pool).await?;
        info!(in_memory, "sqlite ledger ready");

        Ok(Self {
            pool,
            locks: DashMap::new(),
        })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn lock_for(&self, key: String) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_default().value().clone()
    }

    fn wallet_lock(&self, id: WalletId) -> Arc<Mutex<()>> {
        self.lock_for(format!("wallet:{}", id))
    }

    fn card_lock(&self, id: &CardId) -> Arc<Mutex<()>> {
        self.lock_for(format!("card:{}", id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers (run inside a caller's transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn load_wallet(
    conn: &mut SqliteConnection,
    id: WalletId,
) -> Result<Option<Wallet>, RepoError> {
    let row: Option<WalletRow> = sqlx::query_as(&format!(
        "SELECT {} FROM wallets WHERE id = ?",
        WALLET_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.map(WalletRow::into_domain).transpose()
}

/// Conditional write: succeeds only if nobody bumped the version since it was read.
async fn store_wallet(
    conn: &mut SqliteConnection,
    wallet: &Wallet,
    expected_version: i64,
) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"UPDATE wallets SET balance = ?, version = ?, updated_at = ? WHERE id = ? AND version = ?"#,
    )
    .bind(wallet.balance.amount().to_string())
    .bind(wallet.version)
    .bind(ts(wallet.updated_at))
    .bind(wallet.id.to_string())
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(result.rows_affected() == 1)
}

async fn insert_wallet_tx(
    conn: &mut SqliteConnection,
    tx: &WalletTransaction,
) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO wallet_transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        WALLET_TX_COLUMNS
    ))
    .bind(tx.id.to_string())
    .bind(tx.wallet_id.to_string())
    .bind(tx.amount.to_string())
    .bind(tx.currency.code())
    .bind(tx.kind.as_str())
    .bind(&tx.description)
    .bind(&tx.reference)
    .bind(ts(tx.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_err(e, "wallet transaction"))?;

    Ok(())
}

async fn reference_exists(
    conn: &mut SqliteConnection,
    wallet_id: WalletId,
    reference: &str,
) -> Result<bool, RepoError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM wallet_transactions WHERE wallet_id = ? AND reference = ?"#,
    )
    .bind(wallet_id.to_string())
    .bind(reference)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(count > 0)
}

/// Moves a wallet balance. `None` means the version moved underneath us.
async fn move_balance(
    conn: &mut SqliteConnection,
    wallet_id: WalletId,
    direction: EntryDirection,
    amount: Money,
) -> Result<Option<BalanceChange>, RepoError> {
    let mut wallet = load_wallet(conn, wallet_id)
        .await?
        .ok_or(RepoError::NotFound)?;
    let old_balance = wallet.balance;
    let expected_version = wallet.version;

    match direction {
        EntryDirection::Debit => wallet.debit(amount)?,
        EntryDirection::Credit => wallet.credit(amount)?,
    };

    if !store_wallet(conn, &wallet, expected_version).await? {
        return Ok(None);
    }

    Ok(Some(BalanceChange {
        wallet_id,
        currency: wallet.currency(),
        old_balance: old_balance.amount(),
        new_balance: wallet.balance.amount(),
        transaction_id: None,
    }))
}

/// Balance movement plus its trail line.
async fn post_entry(
    conn: &mut SqliteConnection,
    entry: &WalletEntry,
) -> Result<Option<BalanceChange>, RepoError> {
    if entry.unique_reference && reference_exists(conn, entry.wallet_id, &entry.reference).await?
    {
        return Err(RepoError::Conflict(format!(
            "Reference '{}' already posted to wallet {}",
            entry.reference, entry.wallet_id
        )));
    }

    let Some(mut change) = move_balance(conn, entry.wallet_id, entry.direction, entry.amount).await?
    else {
        return Ok(None);
    };

    let tx = entry.to_transaction();
    insert_wallet_tx(conn, &tx).await?;
    change.transaction_id = Some(tx.id);
    Ok(Some(change))
}

async fn load_card(
    conn: &mut SqliteConnection,
    card_id: &CardId,
) -> Result<Option<Card>, RepoError> {
    let row: Option<CardRow> = sqlx::query_as(&format!(
        "SELECT {} FROM cards WHERE card_id = ?",
        CARD_COLUMNS
    ))
    .bind(card_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.map(CardRow::into_domain).transpose()
}

async fn insert_card_row(conn: &mut SqliteConnection, card: &Card) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO cards ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        CARD_COLUMNS
    ))
    .bind(card.card_id.as_str())
    .bind(card.user_id.to_string())
    .bind(&card.customer_id)
    .bind(card.currency().code())
    .bind(card.balance.amount().to_string())
    .bind(card.status.as_str())
    .bind(card.card_type.as_str())
    .bind(&card.name_on_card)
    .bind(&card.masked_number)
    .bind(&card.expiry)
    .bind(card.raw_provider_response.to_string())
    .bind(card.needs_reconciliation as i64)
    .bind(&card.reconciliation_note)
    .bind(card.version)
    .bind(ts(card.created_at))
    .bind(ts(card.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_err(e, "card"))?;

    Ok(())
}

async fn store_card(
    conn: &mut SqliteConnection,
    card: &Card,
    expected_version: i64,
) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"UPDATE cards
           SET balance = ?, status = ?, masked_number = ?, expiry = ?, version = ?, updated_at = ?
           WHERE card_id = ? AND version = ?"#,
    )
    .bind(card.balance.amount().to_string())
    .bind(card.status.as_str())
    .bind(&card.masked_number)
    .bind(&card.expiry)
    .bind(card.version)
    .bind(ts(card.updated_at))
    .bind(card.card_id.as_str())
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(result.rows_affected() == 1)
}

async fn insert_card_tx(
    conn: &mut SqliteConnection,
    tx: &CardTransaction,
) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO card_transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        CARD_TX_COLUMNS
    ))
    .bind(tx.id.to_string())
    .bind(tx.card_id.as_str())
    .bind(tx.user_id.to_string())
    .bind(tx.amount.amount().to_string())
    .bind(tx.amount.currency().code())
    .bind(tx.kind.as_str())
    .bind(&tx.status)
    .bind(&tx.provider_transaction_id)
    .bind(tx.raw_data.to_string())
    .bind(ts(tx.created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_err(e, "card transaction"))?;

    Ok(())
}

async fn mark_processed(conn: &mut SqliteConnection, event_id: &str) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"UPDATE webhook_events SET processed = 1, processed_at = ?, last_error = NULL WHERE event_id = ?"#,
    )
    .bind(ts(Utc::now()))
    .bind(event_id)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        return Err(RepoError::NotFound);
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerRepository for SqliteRepo {
    async fn list_fee_settings(&self) -> Result<Vec<FeeSetting>, RepoError> {
        let rows: Vec<FeeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM fee_settings ORDER BY key",
            FEE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(FeeRow::into_domain).collect()
    }

    async fn upsert_fee_setting(&self, setting: FeeSetting) -> Result<FeeSetting, RepoError> {
        sqlx::query(
            r#"INSERT INTO fee_settings (key, value, currency, updated_at) VALUES (?, ?, ?, ?)
               ON CONFLICT (key) DO UPDATE
               SET value = excluded.value, currency = excluded.currency, updated_at = excluded.updated_at"#,
        )
        .bind(&setting.key)
        .bind(setting.value.to_string())
        .bind(setting.currency.map(|c| c.code()))
        .bind(ts(setting.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(setting)
    }

    async fn open_wallet(&self, user_id: UserId, currency: Currency) -> Result<Wallet, RepoError> {
        let fresh = Wallet::open(user_id, currency);

        sqlx::query(
            r#"INSERT INTO wallets (id, user_id, currency, balance, version, created_at, updated_at)
               VALUES (?, ?, ?, '0', 0, ?, ?)
               ON CONFLICT (user_id, currency) DO NOTHING"#,
        )
        .bind(fresh.id.to_string())
        .bind(user_id.to_string())
        .bind(currency.code())
        .bind(ts(fresh.created_at))
        .bind(ts(fresh.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.find_wallet(user_id, currency)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_wallet(&mut conn, id).await
    }

    async fn find_wallet(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Wallet>, RepoError> {
        let row: Option<WalletRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallets WHERE user_id = ? AND currency = ?",
            WALLET_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(currency.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(WalletRow::into_domain).transpose()
    }

    async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, RepoError> {
        let rows: Vec<WalletRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallets WHERE user_id = ? ORDER BY currency",
            WALLET_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(WalletRow::into_domain).collect()
    }

    async fn post_wallet_entry(&self, entry: WalletEntry) -> Result<BalanceChange, RepoError> {
        let lock = self.wallet_lock(entry.wallet_id);
        let _guard = lock.lock().await;

        for _ in 0..MAX_VERSION_RETRIES {
            let mut tx = self.pool.begin().await.map_err(tx_err)?;
            if let Some(change) = post_entry(&mut tx, &entry).await? {
                tx.commit().await.map_err(tx_err)?;
                return Ok(change);
            }
            debug!(wallet_id = %entry.wallet_id, "wallet version moved, retrying");
        }
        Err(stale_version("wallet", entry.wallet_id))
    }

    async fn change_wallet_balance(
        &self,
        wallet_id: WalletId,
        direction: EntryDirection,
        amount: Money,
    ) -> Result<BalanceChange, RepoError> {
        let lock = self.wallet_lock(wallet_id);
        let _guard = lock.lock().await;

        for _ in 0..MAX_VERSION_RETRIES {
            let mut tx = self.pool.begin().await.map_err(tx_err)?;
            if let Some(change) = move_balance(&mut tx, wallet_id, direction, amount).await? {
                tx.commit().await.map_err(tx_err)?;
                return Ok(change);
            }
            debug!(%wallet_id, "wallet version moved, retrying");
        }
        Err(stale_version("wallet", wallet_id))
    }

    async fn append_wallet_transaction(&self, tx: WalletTransaction) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        insert_wallet_tx(&mut conn, &tx).await
    }

    async fn find_wallet_transaction_by_reference(
        &self,
        wallet_id: WalletId,
        reference: &str,
    ) -> Result<Option<WalletTransaction>, RepoError> {
        let row: Option<WalletTxRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallet_transactions WHERE wallet_id = ? AND reference = ? \
             ORDER BY created_at LIMIT 1",
            WALLET_TX_COLUMNS
        ))
        .bind(wallet_id.to_string())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(WalletTxRow::into_domain).transpose()
    }

    async fn list_wallet_transactions(
        &self,
        wallet_id: WalletId,
    ) -> Result<Vec<WalletTransaction>, RepoError> {
        let rows: Vec<WalletTxRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallet_transactions WHERE wallet_id = ? \
             ORDER BY created_at DESC, rowid DESC",
            WALLET_TX_COLUMNS
        ))
        .bind(wallet_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(WalletTxRow::into_domain).collect()
    }

    async fn count_cards(&self, user_id: UserId) -> Result<u32, RepoError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM cards WHERE user_id = ?"#)
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(count as u32)
    }

    async fn get_card(&self, card_id: &CardId) -> Result<Option<Card>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        load_card(&mut conn, card_id).await
    }

    async fn list_cards(&self, user_id: UserId) -> Result<Vec<Card>, RepoError> {
        let rows: Vec<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards WHERE user_id = ? ORDER BY created_at DESC",
            CARD_COLUMNS
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(CardRow::into_domain).collect()
    }

    async fn commit_card_creation(
        &self,
        card: Card,
        debit: WalletEntry,
    ) -> Result<BalanceChange, RepoError> {
        let lock = self.wallet_lock(debit.wallet_id);
        let _guard = lock.lock().await;

        for _ in 0..MAX_VERSION_RETRIES {
            let mut tx = self.pool.begin().await.map_err(tx_err)?;
            insert_card_row(&mut tx, &card).await?;
            if let Some(change) = post_entry(&mut tx, &debit).await? {
                tx.commit().await.map_err(tx_err)?;
                return Ok(change);
            }
            debug!(wallet_id = %debit.wallet_id, "wallet version moved, retrying");
        }
        Err(stale_version("wallet", debit.wallet_id))
    }

    async fn insert_card(&self, card: Card) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        insert_card_row(&mut conn, &card).await
    }

    async fn flag_card_for_reconciliation(
        &self,
        card_id: &CardId,
        note: &str,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE cards SET needs_reconciliation = 1, reconciliation_note = ?, updated_at = ?
               WHERE card_id = ?"#,
        )
        .bind(note)
        .bind(ts(Utc::now()))
        .bind(card_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn apply_card_effect(
        &self,
        card_id: &CardId,
        effect: CardEffect,
        receipt: Option<EventReceipt>,
    ) -> Result<Card, RepoError> {
        let lock = self.card_lock(card_id);
        let _guard = lock.lock().await;

        for _ in 0..MAX_VERSION_RETRIES {
            let mut tx = self.pool.begin().await.map_err(tx_err)?;
            let mut card = load_card(&mut tx, card_id)
                .await?
                .ok_or(RepoError::NotFound)?;
            let expected_version = card.version;
            let trail = effect.clone().apply_to(&mut card)?;

            if !store_card(&mut tx, &card, expected_version).await? {
                debug!(%card_id, "card version moved, retrying");
                continue;
            }
            if let Some(line) = &trail {
                insert_card_tx(&mut tx, line).await?;
            }
            if let Some(receipt) = &receipt {
                mark_processed(&mut tx, &receipt.event_id).await?;
            }

            tx.commit().await.map_err(tx_err)?;
            return Ok(card);
        }
        Err(stale_version("card", card_id))
    }

    async fn list_card_transactions(
        &self,
        card_id: &CardId,
    ) -> Result<Vec<CardTransaction>, RepoError> {
        let rows: Vec<CardTxRow> = sqlx::query_as(&format!(
            "SELECT {} FROM card_transactions WHERE card_id = ? \
             ORDER BY created_at DESC, rowid DESC",
            CARD_TX_COLUMNS
        ))
        .bind(card_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(CardTxRow::into_domain).collect()
    }

    async fn begin_funding_attempt(&self, attempt: FundingAttempt) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO funding_attempts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            FUNDING_COLUMNS
        ))
        .bind(&attempt.idempotency_key)
        .bind(attempt.user_id.to_string())
        .bind(attempt.card_id.as_str())
        .bind(attempt.amount.amount().to_string())
        .bind(attempt.amount.currency().code())
        .bind(attempt.status.as_str())
        .bind(&attempt.detail)
        .bind(ts(attempt.created_at))
        .bind(ts(attempt.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_err(e, "funding attempt"))?;

        Ok(())
    }

    async fn get_funding_attempt(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<FundingAttempt>, RepoError> {
        let row: Option<FundingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM funding_attempts WHERE user_id = ? AND idempotency_key = ?",
            FUNDING_COLUMNS
        ))
        .bind(user_id.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(FundingRow::into_domain).transpose()
    }

    async fn finish_funding_attempt(
        &self,
        user_id: UserId,
        key: &str,
        status: FundingAttemptStatus,
        detail: Option<String>,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE funding_attempts SET status = ?, detail = ?, updated_at = ?
               WHERE user_id = ? AND idempotency_key = ?"#,
        )
        .bind(status.as_str())
        .bind(detail)
        .bind(ts(Utc::now()))
        .bind(user_id.to_string())
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn commit_card_funding(
        &self,
        commit: FundingCommit,
    ) -> Result<FundingBalances, RepoError> {
        let wallet_id = commit.wallet_debit.wallet_id;
        let wallet_lock = self.wallet_lock(wallet_id);
        let _wallet_guard = wallet_lock.lock().await;
        let card_lock = self.card_lock(&commit.card_id);
        let _card_guard = card_lock.lock().await;

        for _ in 0..MAX_VERSION_RETRIES {
            let mut tx = self.pool.begin().await.map_err(tx_err)?;

            let Some(change) = post_entry(&mut tx, &commit.wallet_debit).await? else {
                debug!(%wallet_id, "wallet version moved, retrying");
                continue;
            };

            let mut card = load_card(&mut tx, &commit.card_id)
                .await?
                .ok_or(RepoError::NotFound)?;
            let expected_version = card.version;
            card.overwrite_balance(commit.card_balance)?;
            if !store_card(&mut tx, &card, expected_version).await? {
                debug!(card_id = %commit.card_id, "card version moved, retrying");
                continue;
            }
            insert_card_tx(&mut tx, &commit.card_transaction).await?;

            sqlx::query(
                r#"UPDATE funding_attempts SET status = ?, updated_at = ?
                   WHERE user_id = ? AND idempotency_key = ?"#,
            )
            .bind(FundingAttemptStatus::Succeeded.as_str())
            .bind(ts(Utc::now()))
            .bind(commit.user_id.to_string())
            .bind(&commit.idempotency_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            tx.commit().await.map_err(tx_err)?;

            return Ok(FundingBalances {
                wallet_balance: Money::new(change.new_balance, change.currency)?,
                card_balance: card.balance,
            });
        }
        Err(stale_version("wallet", wallet_id))
    }

    async fn record_webhook_event(&self, event: WebhookEvent) -> Result<bool, RepoError> {
        let result = sqlx::query(&format!(
            "INSERT INTO webhook_events ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (event_id) DO NOTHING",
            WEBHOOK_COLUMNS
        ))
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(event.card_id.as_ref().map(|c| c.as_str().to_string()))
        .bind(event.user_id.map(|u| u.to_string()))
        .bind(event.payload.to_string())
        .bind(event.signature_valid as i64)
        .bind(event.processed as i64)
        .bind(event.attempts)
        .bind(&event.last_error)
        .bind(ts(event.received_at))
        .bind(event.processed_at.map(ts))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, RepoError> {
        let row: Option<WebhookRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE event_id = ?",
            WEBHOOK_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(WebhookRow::into_domain).transpose()
    }

    async fn mark_webhook_processed(&self, event_id: &str) -> Result<(), RepoError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        mark_processed(&mut conn, event_id).await
    }

    async fn mark_webhook_failed(&self, event_id: &str, error: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE webhook_events SET attempts = attempts + 1, last_error = ? WHERE event_id = ?"#,
        )
        .bind(error)
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_unprocessed_webhook_events(
        &self,
        limit: u32,
    ) -> Result<Vec<WebhookEvent>, RepoError> {
        let rows: Vec<WebhookRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE processed = 0 ORDER BY received_at ASC LIMIT ?",
            WEBHOOK_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(WebhookRow::into_domain).collect()
    }
}
