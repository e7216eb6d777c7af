//! The usage tracking service.
//!
//! `UsageTrackingService` is the only writer of the ledger. Each mutation runs
//! inside one store transaction that touches the balance, usage log, monthly
//! summary and ledger together, so a failure anywhere leaves all four
//! unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use wyze_credits_core::{
    CreditBalance, CreditGrant, CreditTransaction, CreditsError, Feature, MonthlyUsage, Result,
    TransactionId, UsageId, UsageMonth, UsageRecord, UserId,
};
use wyze_credits_store::Store;

/// History rows returned when the caller does not ask for a limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Upper bound on history rows per request.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// A request to debit credits for one feature use.
#[derive(Debug, Clone)]
pub struct TrackUsage {
    /// The user being charged.
    pub user_id: UserId,
    /// The feature used.
    pub feature: Feature,
    /// Credits to debit (default 1).
    pub credits: i64,
    /// Context stored with the usage record and ledger row.
    pub metadata: serde_json::Value,
}

impl TrackUsage {
    /// A single-credit debit with empty metadata.
    #[must_use]
    pub fn new(user_id: UserId, feature: Feature) -> Self {
        Self {
            user_id,
            feature,
            credits: 1,
            metadata: empty_metadata(),
        }
    }

    /// Set the number of credits to debit.
    #[must_use]
    pub fn with_credits(mut self, credits: i64) -> Self {
        self.credits = credits;
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A request to apply a credit grant.
#[derive(Debug, Clone)]
pub struct AddCredits {
    /// The user receiving the adjustment.
    pub user_id: UserId,
    /// Credits to grant (or refund).
    pub amount: i64,
    /// The kind of adjustment.
    pub grant: CreditGrant,
    /// Ledger description; a default is derived from the grant when absent.
    pub description: Option<String>,
    /// Context stored with the ledger row.
    pub metadata: serde_json::Value,
}

impl AddCredits {
    /// A grant with the default description and empty metadata.
    #[must_use]
    pub fn new(user_id: UserId, amount: i64, grant: CreditGrant) -> Self {
        Self {
            user_id,
            amount,
            grant,
            description: None,
            metadata: empty_metadata(),
        }
    }

    /// Set the ledger description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome of a committed debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReceipt {
    /// Available credits after the debit.
    pub remaining_credits: i64,
    /// The usage record written.
    pub usage_id: UsageId,
    /// The ledger row written.
    pub transaction_id: TransactionId,
}

/// Outcome of a committed grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditReceipt {
    /// Available credits after the grant, read back from the stored row.
    pub new_balance: i64,
    /// Credits that actually changed the balance (refunds may apply partially).
    pub applied: i64,
    /// The ledger row written.
    pub transaction_id: TransactionId,
}

/// Current-month usage paired with the spendable balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageOverview {
    /// The month the counters cover.
    pub month: UsageMonth,
    /// Counters for the month, zero when nothing was tracked.
    pub current_month: MonthlyUsage,
    /// Credits that can still be spent.
    pub available_credits: i64,
}

/// Result of an affordability pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCheck {
    /// Whether `available >= required`.
    pub sufficient: bool,
    /// Credits that can still be spent.
    pub available: i64,
    /// Credits the caller asked about.
    pub required: i64,
}

/// Orchestrates every read and write of the credit ledger.
#[derive(Clone)]
pub struct UsageTrackingService {
    store: Arc<dyn Store>,
    default_history_limit: usize,
}

impl UsageTrackingService {
    /// Create a service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            default_history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Override the history limit used when callers pass none.
    #[must_use]
    pub fn with_default_history_limit(mut self, limit: usize) -> Self {
        self.default_history_limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        self
    }

    /// The store backing this service.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Debit credits for one feature use and record it.
    ///
    /// # Errors
    ///
    /// - `CreditsError::InvalidAmount` if `credits <= 0`.
    /// - `CreditsError::UserNotFound` if the user has no balance.
    /// - `CreditsError::InsufficientCredits` if the debit exceeds the balance.
    /// - `CreditsError::Persistence` if the store fails; nothing is written.
    pub async fn track_usage(&self, request: TrackUsage) -> Result<UsageReceipt> {
        let user_id = request.user_id.clone();
        let result = self.debit(request).await;
        if let Err(err) = &result {
            log_failure("track_usage", &user_id, err);
        }
        result
    }

    /// Apply a credit grant, creating the balance row on first use.
    ///
    /// # Errors
    ///
    /// - `CreditsError::InvalidAmount` if `amount <= 0` or the grant would
    ///   overflow a credit counter.
    /// - `CreditsError::Persistence` if the store fails; nothing is written.
    pub async fn add_credits(&self, request: AddCredits) -> Result<CreditReceipt> {
        let user_id = request.user_id.clone();
        let result = self.grant(request).await;
        if let Err(err) = &result {
            log_failure("add_credits", &user_id, err);
        }
        result
    }

    /// Delete every ledger row a user owns.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Persistence` if the store fails.
    pub async fn purge_user(&self, user_id: &UserId) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        let removed = tx.purge_user(user_id).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user_id, removed, "Credit ledger purged for user");
        Ok(removed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Credits the user can still spend, `0` without a balance row.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Persistence` if the store fails.
    pub async fn get_available_credits(&self, user_id: &UserId) -> Result<i64> {
        Ok(self
            .store
            .get_balance(user_id)
            .await?
            .map_or(0, |balance| balance.available()))
    }

    /// The user's balance row, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Persistence` if the store fails.
    pub async fn get_balance(&self, user_id: &UserId) -> Result<Option<CreditBalance>> {
        Ok(self.store.get_balance(user_id).await?)
    }

    /// Current-month usage counters and available credits.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Persistence` if the store fails.
    pub async fn get_usage_summary(&self, user_id: &UserId) -> Result<UsageOverview> {
        let month = UsageMonth::current();
        let current_month = self
            .store
            .get_summary(user_id, month)
            .await?
            .map(|summary| summary.usage)
            .unwrap_or_default();
        let available_credits = self.get_available_credits(user_id).await?;

        tracing::debug!(user_id = %user_id, month = %month, "Usage summary read");

        Ok(UsageOverview {
            month,
            current_month,
            available_credits,
        })
    }

    /// The most recent ledger rows, newest first.
    ///
    /// `limit` defaults to the configured limit ([`DEFAULT_HISTORY_LIMIT`]
    /// unless overridden) and is clamped to
    /// `1..=MAX_HISTORY_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Persistence` if the store fails.
    pub async fn get_credit_history(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let limit = limit
            .unwrap_or(self.default_history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);

        Ok(self.store.list_transactions(user_id, limit, offset).await?)
    }

    /// Whether the user could afford a debit of `required` credits right now.
    ///
    /// # Errors
    ///
    /// - `CreditsError::InvalidAmount` if `required <= 0`.
    /// - `CreditsError::Persistence` if the store fails.
    pub async fn check_credits(&self, user_id: &UserId, required: i64) -> Result<CreditCheck> {
        let required = CreditsError::require_positive("required", required)?;
        let available = self.get_available_credits(user_id).await?;

        Ok(CreditCheck {
            sufficient: available >= required,
            available,
            required,
        })
    }

    /// Usage records created at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Persistence` if the store fails.
    pub async fn usage_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        Ok(self.store.list_usage(user_id, since).await?)
    }

    // =========================================================================
    // Transaction bodies
    // =========================================================================

    async fn debit(&self, request: TrackUsage) -> Result<UsageReceipt> {
        let TrackUsage {
            user_id,
            feature,
            credits,
            metadata,
        } = request;
        let credits = CreditsError::require_positive("credits", credits)?;
        let metadata = normalize_metadata(metadata);
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let mut balance = tx
            .lock_balance(&user_id)
            .await?
            .ok_or_else(|| CreditsError::UserNotFound {
                user_id: user_id.to_string(),
            })?;

        let available = balance.available();
        if !balance.has_sufficient_credits(credits) {
            return Err(CreditsError::InsufficientCredits {
                available,
                required: credits,
            });
        }

        balance.debit(credits, now)?;

        let record = UsageRecord::new(user_id.clone(), feature, credits, metadata.clone(), now);
        tx.insert_usage(&record).await?;

        let stored = tx.save_balance(&balance).await?;

        tx.record_summary(&user_id, UsageMonth::of(now), feature, credits, now)
            .await?;

        let remaining_credits = stored.available();
        let ledger_row = CreditTransaction::usage(
            user_id.clone(),
            credits,
            remaining_credits,
            format!("Used {credits} credits for {feature}"),
            metadata,
            now,
        );
        tx.insert_transaction(&ledger_row).await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            feature = %feature,
            credits,
            remaining_credits,
            "Usage tracked"
        );

        Ok(UsageReceipt {
            remaining_credits,
            usage_id: record.id,
            transaction_id: ledger_row.id,
        })
    }

    async fn grant(&self, request: AddCredits) -> Result<CreditReceipt> {
        let AddCredits {
            user_id,
            amount,
            grant,
            description,
            metadata,
        } = request;
        let amount = CreditsError::require_positive("amount", amount)?;
        let metadata = normalize_metadata(metadata);
        let now = Utc::now();

        let mut tx = self.store.begin().await?;

        let mut balance = tx.create_balance(&user_id, now).await?;
        let applied = balance.apply_grant(grant, amount, now)?;
        let stored = tx.save_balance(&balance).await?;

        // Read back from the stored row, not the pre-update copy.
        let new_balance = stored.available();

        let description = description.unwrap_or_else(|| grant.default_description(applied));
        let ledger_row = CreditTransaction::grant(
            user_id.clone(),
            grant,
            applied,
            new_balance,
            description,
            metadata,
            now,
        );
        tx.insert_transaction(&ledger_row).await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            grant = ?grant,
            amount,
            applied,
            new_balance,
            "Credits added"
        );

        Ok(CreditReceipt {
            new_balance,
            applied,
            transaction_id: ledger_row.id,
        })
    }
}

fn empty_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn normalize_metadata(metadata: serde_json::Value) -> serde_json::Value {
    if metadata.is_null() {
        empty_metadata()
    } else {
        metadata
    }
}

fn log_failure(operation: &'static str, user_id: &UserId, err: &CreditsError) {
    match err {
        CreditsError::InsufficientCredits {
            available,
            required,
        } => tracing::warn!(
            operation,
            user_id = %user_id,
            available,
            required,
            "Debit rejected: insufficient credits"
        ),
        CreditsError::UserNotFound { .. }
        | CreditsError::InvalidAmount(_)
        | CreditsError::InvalidId(_) => tracing::warn!(
            operation,
            user_id = %user_id,
            error = %err,
            "Ledger request rejected"
        ),
        CreditsError::Persistence(_) => tracing::error!(
            operation,
            user_id = %user_id,
            error = %err,
            "Ledger transaction rolled back"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_usage_defaults() {
        let request = TrackUsage::new(UserId::generate(), Feature::Report);
        assert_eq!(request.credits, 1);
        assert_eq!(request.metadata, serde_json::json!({}));
    }

    #[test]
    fn null_metadata_becomes_empty_object() {
        assert_eq!(
            normalize_metadata(serde_json::Value::Null),
            serde_json::json!({})
        );
        assert_eq!(
            normalize_metadata(serde_json::json!({"a": 1})),
            serde_json::json!({"a": 1})
        );
    }

    #[test]
    fn overview_serializes_camel_case() {
        let overview = UsageOverview {
            month: "2026-10".parse().unwrap(),
            current_month: MonthlyUsage::default(),
            available_credits: 42,
        };
        let json = serde_json::to_value(overview).unwrap();
        assert_eq!(json["month"], "2026-10");
        assert_eq!(json["availableCredits"], 42);
        assert_eq!(json["currentMonth"]["assessmentsTaken"], 0);
    }
}
