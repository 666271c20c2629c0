//! PostgreSQL repository adapter.
//!
//! Balance writes lock the account row with `SELECT ... FOR UPDATE` inside the transaction,
//! so concurrent debits on one wallet queue behind each other.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use cardwallet_types::{
    BalanceChange, Card, CardEffect, CardId, CardTransaction, Currency, EntryDirection,
    EventReceipt, FeeSetting, FundingAttempt, FundingAttemptStatus, FundingBalances,
    FundingCommit, LedgerAccount, LedgerRepository, Money, RepoError, UserId, Wallet, WalletEntry,
    WalletId, WalletTransaction, WebhookEvent,
};

use crate::types::pg::{CardRow, CardTxRow, FeeRow, FundingRow, WalletRow, WalletTxRow, WebhookRow};
use crate::types::{
    CARD_COLUMNS, CARD_TX_COLUMNS, FEE_COLUMNS, FUNDING_COLUMNS, WALLET_COLUMNS,
    WALLET_TX_COLUMNS, WEBHOOK_COLUMNS,
};
use crate::{db_err, insert_err, tx_err};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_cards_pg.sql"),
        "0002",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0003_create_webhook_events_pg.sql"),
        "0003",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection-level helpers (run inside a caller's transaction)
// ─────────────────────────────────────────────────────────────────────────────

async fn lock_wallet(conn: &mut PgConnection, id: WalletId) -> Result<Wallet, RepoError> {
    let row: Option<WalletRow> = sqlx::query_as(&format!(
        "SELECT {} FROM wallets WHERE id = $1 FOR UPDATE",
        WALLET_COLUMNS
    ))
    .bind(id.into_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.ok_or(RepoError::NotFound)?.into_domain()
}

async fn move_balance(
    conn: &mut PgConnection,
    wallet_id: WalletId,
    direction: EntryDirection,
    amount: Money,
) -> Result<BalanceChange, RepoError> {
    let mut wallet = lock_wallet(conn, wallet_id).await?;
    let old_balance = wallet.balance;

    match direction {
        EntryDirection::Debit => wallet.debit(amount)?,
        EntryDirection::Credit => wallet.credit(amount)?,
    };

    sqlx::query(r#"UPDATE wallets SET balance = $1, version = $2, updated_at = $3 WHERE id = $4"#)
        .bind(wallet.balance.amount())
        .bind(wallet.version)
        .bind(wallet.updated_at)
        .bind(wallet_id.into_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    Ok(BalanceChange {
        wallet_id,
        currency: wallet.currency(),
        old_balance: old_balance.amount(),
        new_balance: wallet.balance.amount(),
        transaction_id: None,
    })
}

async fn insert_wallet_tx(conn: &mut PgConnection, tx: &WalletTransaction) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO wallet_transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        WALLET_TX_COLUMNS
    ))
    .bind(tx.id.into_uuid())
    .bind(tx.wallet_id.into_uuid())
    .bind(tx.amount)
    .bind(tx.currency.code())
    .bind(tx.kind.as_str())
    .bind(&tx.description)
    .bind(&tx.reference)
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_err(e, "wallet transaction"))?;

    Ok(())
}

async fn post_entry(conn: &mut PgConnection, entry: &WalletEntry) -> Result<BalanceChange, RepoError> {
    // Lock first so two postings with the same reference cannot both pass the check.
    let mut change = move_balance(conn, entry.wallet_id, entry.direction, entry.amount).await?;

    if entry.unique_reference {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM wallet_transactions WHERE wallet_id = $1 AND reference = $2"#,
        )
        .bind(entry.wallet_id.into_uuid())
        .bind(&entry.reference)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)?;

        if count > 0 {
            return Err(RepoError::Conflict(format!(
                "Reference '{}' already posted to wallet {}",
                entry.reference, entry.wallet_id
            )));
        }
    }

    let tx = entry.to_transaction();
    insert_wallet_tx(conn, &tx).await?;
    change.transaction_id = Some(tx.id);
    Ok(change)
}

async fn lock_card(conn: &mut PgConnection, card_id: &CardId) -> Result<Card, RepoError> {
    let row: Option<CardRow> = sqlx::query_as(&format!(
        "SELECT {} FROM cards WHERE card_id = $1 FOR UPDATE",
        CARD_COLUMNS
    ))
    .bind(card_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    row.ok_or(RepoError::NotFound)?.into_domain()
}

async fn insert_card_row(conn: &mut PgConnection, card: &Card) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO cards ({}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        CARD_COLUMNS
    ))
    .bind(card.card_id.as_str())
    .bind(card.user_id.into_uuid())
    .bind(&card.customer_id)
    .bind(card.currency().code())
    .bind(card.balance.amount())
    .bind(card.status.as_str())
    .bind(card.card_type.as_str())
    .bind(&card.name_on_card)
    .bind(&card.masked_number)
    .bind(&card.expiry)
    .bind(&card.raw_provider_response)
    .bind(card.needs_reconciliation)
    .bind(&card.reconciliation_note)
    .bind(card.version)
    .bind(card.created_at)
    .bind(card.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_err(e, "card"))?;

    Ok(())
}

async fn store_card(conn: &mut PgConnection, card: &Card) -> Result<(), RepoError> {
    sqlx::query(
        r#"UPDATE cards
           SET balance = $1, status = $2, masked_number = $3, expiry = $4, version = $5, updated_at = $6
           WHERE card_id = $7"#,
    )
    .bind(card.balance.amount())
    .bind(card.status.as_str())
    .bind(&card.masked_number)
    .bind(&card.expiry)
    .bind(card.version)
    .bind(card.updated_at)
    .bind(card.card_id.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

async fn insert_card_tx(conn: &mut PgConnection, tx: &CardTransaction) -> Result<(), RepoError> {
    sqlx::query(&format!(
        "INSERT INTO card_transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        CARD_TX_COLUMNS
    ))
    .bind(tx.id.into_uuid())
    .bind(tx.card_id.as_str())
    .bind(tx.user_id.into_uuid())
    .bind(tx.amount.amount())
    .bind(tx.amount.currency().code())
    .bind(tx.kind.as_str())
    .bind(&tx.status)
    .bind(&tx.provider_transaction_id)
    .bind(&tx.raw_data)
    .bind(tx.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| insert_err(e, "card transaction"))?;

    Ok(())
}

async fn mark_processed(conn: &mut PgConnection, event_id: &str) -> Result<(), RepoError> {
    let result = sqlx::query(
        r#"UPDATE webhook_events SET processed = TRUE, processed_at = $1, last_error = NULL WHERE event_id = $2"#,
    )
    .bind(Utc::now())
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
impl LedgerRepository for PostgresRepo {
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
            r#"INSERT INTO fee_settings (key, value, currency, updated_at) VALUES ($1, $2, $3, $4)
               ON CONFLICT (key) DO UPDATE
               SET value = EXCLUDED.value, currency = EXCLUDED.currency, updated_at = EXCLUDED.updated_at"#,
        )
        .bind(&setting.key)
        .bind(setting.value)
        .bind(setting.currency.map(|c| c.code()))
        .bind(setting.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(setting)
    }

    async fn open_wallet(&self, user_id: UserId, currency: Currency) -> Result<Wallet, RepoError> {
        let fresh = Wallet::open(user_id, currency);

        sqlx::query(
            r#"INSERT INTO wallets (id, user_id, currency, balance, version, created_at, updated_at)
               VALUES ($1, $2, $3, 0, 0, $4, $5)
               ON CONFLICT (user_id, currency) DO NOTHING"#,
        )
        .bind(fresh.id.into_uuid())
        .bind(user_id.into_uuid())
        .bind(currency.code())
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.find_wallet(user_id, currency)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Option<Wallet>, RepoError> {
        let row: Option<WalletRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallets WHERE id = $1",
            WALLET_COLUMNS
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(WalletRow::into_domain).transpose()
    }

    async fn find_wallet(
        &self,
        user_id: UserId,
        currency: Currency,
    ) -> Result<Option<Wallet>, RepoError> {
        let row: Option<WalletRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 AND currency = $2",
            WALLET_COLUMNS
        ))
        .bind(user_id.into_uuid())
        .bind(currency.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(WalletRow::into_domain).transpose()
    }

    async fn list_wallets(&self, user_id: UserId) -> Result<Vec<Wallet>, RepoError> {
        let rows: Vec<WalletRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 ORDER BY currency",
            WALLET_COLUMNS
        ))
        .bind(user_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(WalletRow::into_domain).collect()
    }

    async fn post_wallet_entry(&self, entry: WalletEntry) -> Result<BalanceChange, RepoError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        let change = post_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(tx_err)?;
        Ok(change)
    }

    async fn change_wallet_balance(
        &self,
        wallet_id: WalletId,
        direction: EntryDirection,
        amount: Money,
    ) -> Result<BalanceChange, RepoError> {
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        let change = move_balance(&mut tx, wallet_id, direction, amount).await?;
        tx.commit().await.map_err(tx_err)?;
        Ok(change)
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
            "SELECT {} FROM wallet_transactions WHERE wallet_id = $1 AND reference = $2 \
             ORDER BY created_at LIMIT 1",
            WALLET_TX_COLUMNS
        ))
        .bind(wallet_id.into_uuid())
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
            "SELECT {} FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at DESC",
            WALLET_TX_COLUMNS
        ))
        .bind(wallet_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(WalletTxRow::into_domain).collect()
    }

    async fn count_cards(&self, user_id: UserId) -> Result<u32, RepoError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM cards WHERE user_id = $1"#)
            .bind(user_id.into_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(count as u32)
    }

    async fn get_card(&self, card_id: &CardId) -> Result<Option<Card>, RepoError> {
        let row: Option<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards WHERE card_id = $1",
            CARD_COLUMNS
        ))
        .bind(card_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(CardRow::into_domain).transpose()
    }

    async fn list_cards(&self, user_id: UserId) -> Result<Vec<Card>, RepoError> {
        let rows: Vec<CardRow> = sqlx::query_as(&format!(
            "SELECT {} FROM cards WHERE user_id = $1 ORDER BY created_at DESC",
            CARD_COLUMNS
        ))
        .bind(user_id.into_uuid())
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
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        insert_card_row(&mut tx, &card).await?;
        let change = post_entry(&mut tx, &debit).await?;
        tx.commit().await.map_err(tx_err)?;
        Ok(change)
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
            r#"UPDATE cards SET needs_reconciliation = TRUE, reconciliation_note = $1, updated_at = $2
               WHERE card_id = $3"#,
        )
        .bind(note)
        .bind(Utc::now())
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
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        let mut card = lock_card(&mut tx, card_id).await?;
        let trail = effect.apply_to(&mut card)?;
        store_card(&mut tx, &card).await?;
        if let Some(line) = &trail {
            insert_card_tx(&mut tx, line).await?;
        }
        if let Some(receipt) = &receipt {
            mark_processed(&mut tx, &receipt.event_id).await?;
        }

        tx.commit().await.map_err(tx_err)?;
        Ok(card)
    }

    async fn list_card_transactions(
        &self,
        card_id: &CardId,
    ) -> Result<Vec<CardTransaction>, RepoError> {
        let rows: Vec<CardTxRow> = sqlx::query_as(&format!(
            "SELECT {} FROM card_transactions WHERE card_id = $1 ORDER BY created_at DESC",
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
            "INSERT INTO funding_attempts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            FUNDING_COLUMNS
        ))
        .bind(&attempt.idempotency_key)
        .bind(attempt.user_id.into_uuid())
        .bind(attempt.card_id.as_str())
        .bind(attempt.amount.amount())
        .bind(attempt.amount.currency().code())
        .bind(attempt.status.as_str())
        .bind(&attempt.detail)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
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
            "SELECT {} FROM funding_attempts WHERE user_id = $1 AND idempotency_key = $2",
            FUNDING_COLUMNS
        ))
        .bind(user_id.into_uuid())
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
            r#"UPDATE funding_attempts SET status = $1, detail = $2, updated_at = $3
               WHERE user_id = $4 AND idempotency_key = $5"#,
        )
        .bind(status.as_str())
        .bind(detail)
        .bind(Utc::now())
        .bind(user_id.into_uuid())
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
        let mut tx = self.pool.begin().await.map_err(tx_err)?;

        // Wallet row first, then card row: the same order every writer uses.
        let change = post_entry(&mut tx, &commit.wallet_debit).await?;

        let mut card = lock_card(&mut tx, &commit.card_id).await?;
        card.overwrite_balance(commit.card_balance)?;
        store_card(&mut tx, &card).await?;
        insert_card_tx(&mut tx, &commit.card_transaction).await?;

        sqlx::query(
            r#"UPDATE funding_attempts SET status = $1, updated_at = $2
               WHERE user_id = $3 AND idempotency_key = $4"#,
        )
        .bind(FundingAttemptStatus::Succeeded.as_str())
        .bind(Utc::now())
        .bind(commit.user_id.into_uuid())
        .bind(&commit.idempotency_key)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(tx_err)?;

        Ok(FundingBalances {
            wallet_balance: Money::new(change.new_balance, change.currency)?,
            card_balance: card.balance,
        })
    }

    async fn record_webhook_event(&self, event: WebhookEvent) -> Result<bool, RepoError> {
        let result = sqlx::query(&format!(
            "INSERT INTO webhook_events ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (event_id) DO NOTHING",
            WEBHOOK_COLUMNS
        ))
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(event.card_id.as_ref().map(|c| c.as_str().to_string()))
        .bind(event.user_id.map(UserId::into_uuid))
        .bind(&event.payload)
        .bind(event.signature_valid)
        .bind(event.processed)
        .bind(event.attempts)
        .bind(&event.last_error)
        .bind(event.received_at)
        .bind(event.processed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_webhook_event(&self, event_id: &str) -> Result<Option<WebhookEvent>, RepoError> {
        let row: Option<WebhookRow> = sqlx::query_as(&format!(
            "SELECT {} FROM webhook_events WHERE event_id = $1",
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
            r#"UPDATE webhook_events SET attempts = attempts + 1, last_error = $1 WHERE event_id = $2"#,
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
            "SELECT {} FROM webhook_events WHERE processed = FALSE \
             ORDER BY received_at ASC LIMIT $1",
            WEBHOOK_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(WebhookRow::into_domain).collect()
    }
}
