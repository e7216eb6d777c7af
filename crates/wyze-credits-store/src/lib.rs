//! Storage layer for wyze-credits.
//!
//! This crate persists the four ledger stores: credit balances, usage records,
//! monthly usage summaries, and credit transactions.
//!
//! # Backends
//!
//! - [`PgStore`]: PostgreSQL via `sqlx`. Balance rows are locked with
//!   `SELECT ... FOR UPDATE`, so concurrent debits of one user serialise.
//! - [`MemoryStore`]: in-process tables for tests and local runs. A
//!   transaction holds the store lock and publishes its staged copy on commit.
//!
//! # Transactions
//!
//! Every mutation runs inside a [`StoreTransaction`] obtained from
//! [`Store::begin`]. Dropping a transaction without calling
//! [`StoreTransaction::commit`] rolls it back.
//!
//! # Example
//!
//! ```no_run
//! use wyze_credits_core::{CreditGrant, UserId};
//! use wyze_credits_store::{MemoryStore, Store};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//!
//! let mut tx = store.begin().await?;
//! let mut balance = tx.create_balance(&user_id, chrono::Utc::now()).await?;
//! balance.apply_grant(CreditGrant::Purchase, 100, chrono::Utc::now())?;
//! tx.save_balance(&balance).await?;
//! tx.commit().await?;
//!
//! let stored = store.get_balance(&user_id).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
#[cfg(feature = "test-util")]
pub use memory::FailingWrite;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wyze_credits_core::{
    CreditBalance, CreditTransaction, Feature, UsageMonth, UsageRecord, UsageSummary, UserId,
};

/// The storage trait defining all read operations and the transaction entry point.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., PostgreSQL, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name, reported by health checks.
    fn backend(&self) -> &'static str;

    /// Open an atomic unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a user's balance row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>>;

    /// Get a user's summary row for a month.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_summary(
        &self,
        user_id: &UserId,
        month: UsageMonth,
    ) -> Result<Option<UsageSummary>>;

    /// List ledger rows for a user, newest first.
    ///
    /// Rows are ordered by `created_at` descending, ties broken by id descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;

    /// List usage records created at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_usage(&self, user_id: &UserId, since: DateTime<Utc>)
        -> Result<Vec<UsageRecord>>;
}

/// One open transaction against a [`Store`].
///
/// Reads made through the transaction see its own uncommitted writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read a balance row and hold it for the rest of the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn lock_balance(&mut self, user_id: &UserId) -> Result<Option<CreditBalance>>;

    /// Insert a zero balance row if none exists, then lock and return the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create_balance(&mut self, user_id: &UserId, at: DateTime<Utc>)
        -> Result<CreditBalance>;

    /// Persist the counters of an existing balance row.
    ///
    /// Returns the row as stored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the row doesn't exist.
    async fn save_balance(&mut self, balance: &CreditBalance) -> Result<CreditBalance>;

    /// Append a usage record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_usage(&mut self, record: &UsageRecord) -> Result<()>;

    /// Add one usage event to the `(user, month)` summary, creating it if needed.
    ///
    /// Returns the updated summary row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_summary(
        &mut self,
        user_id: &UserId,
        month: UsageMonth,
        feature: Feature,
        credits: i64,
        at: DateTime<Utc>,
    ) -> Result<UsageSummary>;

    /// Append a ledger row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_transaction(&mut self, transaction: &CreditTransaction) -> Result<()>;

    /// Delete every row the user owns in the four ledger stores.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn purge_user(&mut self, user_id: &UserId) -> Result<u64>;

    /// Make every write of this transaction visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; nothing is persisted in that case.
    async fn commit(self: Box<Self>) -> Result<()>;
}
