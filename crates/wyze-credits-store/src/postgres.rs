//! PostgreSQL storage implementation.
//!
//! This module provides the `PgStore` implementation of the `Store` trait.
//! Correctness of concurrent debits rests on the database: the balance row is
//! locked with `FOR UPDATE` for the life of the transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use wyze_credits_core::{
    CreditBalance, CreditTransaction, Feature, MonthlyUsage, UsageMonth, UsageRecord, UsageSummary,
    UserId,
};

use crate::error::{Result, StoreError};
use crate::schema::{
    owned_tables, table, BALANCE_COLUMNS, SUMMARY_COLUMNS, TRANSACTION_COLUMNS, USAGE_COLUMNS,
};
use crate::{Store, StoreTransaction};

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be established.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;

        tracing::debug!(max_connections, "PostgreSQL pool established");

        Ok(Self { pool })
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("Credit ledger migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM {} WHERE user_id = $1",
            table::CREDIT_BALANCE
        );

        sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(|row| balance_from_row(&row))
            .transpose()
    }

    async fn get_summary(
        &self,
        user_id: &UserId,
        month: UsageMonth,
    ) -> Result<Option<UsageSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM {} WHERE user_id = $1 AND month = $2",
            table::USAGE_SUMMARY
        );

        sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(month.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(|row| summary_from_row(&row))
            .transpose()
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM {} WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
            table::CREDIT_TRANSACTIONS
        );

        sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(transaction_from_row)
            .collect()
    }

    async fn list_usage(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        let sql = format!(
            "SELECT {USAGE_COLUMNS} FROM {} WHERE user_id = $1 AND created_at >= $2 \
             ORDER BY created_at ASC, id ASC",
            table::USAGE_TRACKING
        );

        sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(usage_from_row)
            .collect()
    }
}

/// An open database transaction. Dropping it rolls back.
struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_balance(&mut self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM {} WHERE user_id = $1 FOR UPDATE",
            table::CREDIT_BALANCE
        );

        sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .map(|row| balance_from_row(&row))
            .transpose()
    }

    async fn create_balance(
        &mut self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<CreditBalance> {
        // A concurrent first grant may insert the row between our insert and
        // select; DO NOTHING plus the locking read covers both orders.
        let sql = format!(
            "INSERT INTO {} (user_id, created_at, updated_at) VALUES ($1, $2, $2) \
             ON CONFLICT (user_id) DO NOTHING",
            table::CREDIT_BALANCE
        );

        sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        self.lock_balance(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "credit balance",
                id: user_id.to_string(),
            })
    }

    async fn save_balance(&mut self, balance: &CreditBalance) -> Result<CreditBalance> {
        let sql = format!(
            "UPDATE {} SET total_credits = $2, used_credits = $3, bonus_credits = $4, \
             monthly_allocation = $5, updated_at = $6 WHERE user_id = $1 \
             RETURNING {BALANCE_COLUMNS}",
            table::CREDIT_BALANCE
        );

        let row = sqlx::query(&sql)
            .bind(balance.user_id.as_str())
            .bind(balance.total_credits)
            .bind(balance.used_credits)
            .bind(balance.bonus_credits)
            .bind(balance.monthly_allocation)
            .bind(balance.updated_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "credit balance",
                id: balance.user_id.to_string(),
            })?;

        balance_from_row(&row)
    }

    async fn insert_usage(&mut self, record: &UsageRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({USAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)",
            table::USAGE_TRACKING
        );

        sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(record.user_id.as_str())
            .bind(record.feature.as_str())
            .bind(record.credits)
            .bind(&record.metadata)
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn record_summary(
        &mut self,
        user_id: &UserId,
        month: UsageMonth,
        feature: Feature,
        credits: i64,
        at: DateTime<Utc>,
    ) -> Result<UsageSummary> {
        let mut delta = MonthlyUsage::default();
        delta.record(feature, credits);

        let sql = format!(
            "INSERT INTO {table} ({SUMMARY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id, month) DO UPDATE SET \
             total_credits = {table}.total_credits + EXCLUDED.total_credits, \
             assessments_taken = {table}.assessments_taken + EXCLUDED.assessments_taken, \
             reports_generated = {table}.reports_generated + EXCLUDED.reports_generated, \
             ai_interactions = {table}.ai_interactions + EXCLUDED.ai_interactions, \
             api_calls = {table}.api_calls + EXCLUDED.api_calls, \
             updated_at = EXCLUDED.updated_at \
             RETURNING {SUMMARY_COLUMNS}",
            table = table::USAGE_SUMMARY
        );

        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(month.to_string())
            .bind(delta.total_credits)
            .bind(delta.assessments_taken)
            .bind(delta.reports_generated)
            .bind(delta.ai_interactions)
            .bind(delta.api_calls)
            .bind(at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;

        summary_from_row(&row)
    }

    async fn insert_transaction(&mut self, transaction: &CreditTransaction) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({TRANSACTION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            table::CREDIT_TRANSACTIONS
        );

        sqlx::query(&sql)
            .bind(transaction.id.to_string())
            .bind(transaction.user_id.as_str())
            .bind(transaction.transaction_type.as_str())
            .bind(transaction.amount)
            .bind(transaction.balance)
            .bind(&transaction.description)
            .bind(&transaction.metadata)
            .bind(transaction.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn purge_user(&mut self, user_id: &UserId) -> Result<u64> {
        let mut removed = 0;
        for name in owned_tables() {
            let sql = format!("DELETE FROM {name} WHERE user_id = $1");
            removed += sqlx::query(&sql)
                .bind(user_id.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?
                .rows_affected();
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(db_err)
    }
}

// ============================================================================
// Row decoding
// ============================================================================

#[allow(clippy::needless_pass_by_value)]
fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn decode_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(err.to_string())
}

fn user_id_from_row(row: &PgRow) -> Result<UserId> {
    row.try_get::<String, _>("user_id")
        .map_err(db_err)?
        .parse()
        .map_err(decode_err)
}

fn balance_from_row(row: &PgRow) -> Result<CreditBalance> {
    Ok(CreditBalance {
        user_id: user_id_from_row(row)?,
        total_credits: row.try_get("total_credits").map_err(db_err)?,
        used_credits: row.try_get("used_credits").map_err(db_err)?,
        bonus_credits: row.try_get("bonus_credits").map_err(db_err)?,
        monthly_allocation: row.try_get("monthly_allocation").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn summary_from_row(row: &PgRow) -> Result<UsageSummary> {
    Ok(UsageSummary {
        user_id: user_id_from_row(row)?,
        month: row
            .try_get::<String, _>("month")
            .map_err(db_err)?
            .parse()
            .map_err(decode_err)?,
        usage: MonthlyUsage {
            total_credits: row.try_get("total_credits").map_err(db_err)?,
            assessments_taken: row.try_get("assessments_taken").map_err(db_err)?,
            reports_generated: row.try_get("reports_generated").map_err(db_err)?,
            ai_interactions: row.try_get("ai_interactions").map_err(db_err)?,
            api_calls: row.try_get("api_calls").map_err(db_err)?,
        },
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<CreditTransaction> {
    Ok(CreditTransaction {
        id: row
            .try_get::<String, _>("id")
            .map_err(db_err)?
            .parse()
            .map_err(decode_err)?,
        user_id: user_id_from_row(row)?,
        transaction_type: row
            .try_get::<String, _>("type")
            .map_err(db_err)?
            .parse()
            .map_err(decode_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        balance: row.try_get("balance").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        metadata: row.try_get("metadata").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn usage_from_row(row: &PgRow) -> Result<UsageRecord> {
    Ok(UsageRecord {
        id: row
            .try_get::<String, _>("id")
            .map_err(db_err)?
            .parse()
            .map_err(decode_err)?,
        user_id: user_id_from_row(row)?,
        feature: row
            .try_get::<String, _>("feature")
            .map_err(db_err)?
            .parse()
            .map_err(decode_err)?,
        credits: row.try_get("credits").map_err(db_err)?,
        metadata: row.try_get("metadata").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}
