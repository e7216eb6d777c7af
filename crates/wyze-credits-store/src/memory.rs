//! In-memory storage implementation.
//!
//! This module provides the `MemoryStore` implementation of the `Store` trait.
//! It backs the test suites and local runs without a database.
//!
//! Failure injection and row counts need the `test-util` feature
//! (`cargo test -p wyze-credits-store --features test-util`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use wyze_credits_core::{
    CreditBalance, CreditTransaction, Feature, UsageMonth, UsageRecord, UsageSummary, UserId,
};

use crate::error::{Result, StoreError};
use crate::{Store, StoreTransaction};

/// A write that can be made to fail once, for exercising rollback paths.
#[cfg(feature = "test-util")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailingWrite {
    /// `StoreTransaction::save_balance`.
    SaveBalance,
    /// `StoreTransaction::insert_usage`.
    InsertUsage,
    /// `StoreTransaction::record_summary`.
    RecordSummary,
    /// `StoreTransaction::insert_transaction`.
    InsertTransaction,
    /// `StoreTransaction::commit`.
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    balances: HashMap<UserId, CreditBalance>,
    usage: Vec<UsageRecord>,
    summaries: HashMap<(UserId, UsageMonth), UsageSummary>,
    transactions: Vec<CreditTransaction>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    #[cfg(feature = "test-util")]
    failing: Option<FailingWrite>,
}

/// In-memory storage with serialised, all-or-nothing transactions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next occurrence of `write` fail with a database error.
    #[cfg(feature = "test-util")]
    pub async fn fail_next(&self, write: FailingWrite) {
        self.inner.lock().await.failing = Some(write);
    }

    /// Number of usage records across all users.
    #[cfg(feature = "test-util")]
    pub async fn usage_count(&self) -> usize {
        self.inner.lock().await.tables.usage.len()
    }

    /// Number of ledger rows across all users.
    #[cfg(feature = "test-util")]
    pub async fn transaction_count(&self) -> usize {
        self.inner.lock().await.tables.transactions.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let staged = guard.tables.clone();
        Ok(Box::new(MemoryTransaction { guard, staged }))
    }

    async fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        Ok(self.inner.lock().await.tables.balances.get(user_id).cloned())
    }

    async fn get_summary(
        &self,
        user_id: &UserId,
        month: UsageMonth,
    ) -> Result<Option<UsageSummary>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .summaries
            .get(&(user_id.clone(), month))
            .cloned())
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<_> = inner
            .tables
            .transactions
            .iter()
            .filter(|tx| &tx.user_id == user_id)
            .cloned()
            .collect();

        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_usage(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .usage
            .iter()
            .filter(|record| &record.user_id == user_id && record.created_at >= since)
            .cloned()
            .collect())
    }
}

/// A transaction over a private copy of the tables.
///
/// The store lock is held until the transaction is committed or dropped.
struct MemoryTransaction {
    guard: OwnedMutexGuard<Inner>,
    staged: Tables,
}

#[cfg(feature = "test-util")]
impl MemoryTransaction {
    fn check(&mut self, write: FailingWrite) -> Result<()> {
        if self.guard.failing == Some(write) {
            self.guard.failing = None;
            return Err(StoreError::Database(format!("injected failure: {write:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_balance(&mut self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        Ok(self.staged.balances.get(user_id).cloned())
    }

    async fn create_balance(
        &mut self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<CreditBalance> {
        Ok(self
            .staged
            .balances
            .entry(user_id.clone())
            .or_insert_with(|| CreditBalance::new_at(user_id.clone(), at))
            .clone())
    }

    async fn save_balance(&mut self, balance: &CreditBalance) -> Result<CreditBalance> {
        #[cfg(feature = "test-util")]
        self.check(FailingWrite::SaveBalance)?;
        let row = self
            .staged
            .balances
            .get_mut(&balance.user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "credit balance",
                id: balance.user_id.to_string(),
            })?;

        row.total_credits = balance.total_credits;
        row.used_credits = balance.used_credits;
        row.bonus_credits = balance.bonus_credits;
        row.monthly_allocation = balance.monthly_allocation;
        row.updated_at = balance.updated_at;

        Ok(row.clone())
    }

    async fn insert_usage(&mut self, record: &UsageRecord) -> Result<()> {
        #[cfg(feature = "test-util")]
        self.check(FailingWrite::InsertUsage)?;
        self.staged.usage.push(record.clone());
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
        #[cfg(feature = "test-util")]
        self.check(FailingWrite::RecordSummary)?;
        let summary = self
            .staged
            .summaries
            .entry((user_id.clone(), month))
            .or_insert_with(|| UsageSummary::new(user_id.clone(), month, at));
        summary.record(feature, credits, at);
        Ok(summary.clone())
    }

    async fn insert_transaction(&mut self, transaction: &CreditTransaction) -> Result<()> {
        #[cfg(feature = "test-util")]
        self.check(FailingWrite::InsertTransaction)?;
        self.staged.transactions.push(transaction.clone());
        Ok(())
    }

    async fn purge_user(&mut self, user_id: &UserId) -> Result<u64> {
        let tables = &mut self.staged;
        let before = tables.usage.len()
            + tables.transactions.len()
            + tables.summaries.len()
            + tables.balances.len();

        tables.transactions.retain(|tx| &tx.user_id != user_id);
        tables.usage.retain(|record| &record.user_id != user_id);
        tables.summaries.retain(|(owner, _), _| owner != user_id);
        tables.balances.remove(user_id);

        let after = tables.usage.len()
            + tables.transactions.len()
            + tables.summaries.len()
            + tables.balances.len();

        Ok((before - after) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        #[cfg_attr(not(feature = "test-util"), allow(unused_mut))]
        let mut this = self;
        #[cfg(feature = "test-util")]
        this.check(FailingWrite::Commit)?;
        let MemoryTransaction { mut guard, staged } = *this;
        guard.tables = staged;
        Ok(())
    }
}
