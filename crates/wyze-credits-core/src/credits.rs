//! Credit transaction types for wyze-credits.
//!
//! Every change to a balance writes exactly one ledger row. The ledger is
//! append-only and doubles as the audit trail.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// A ledger row (`ba_credit_transactions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    /// Signed amount. Negative for usage, positive otherwise.
    pub amount: i64,

    /// Available credits after this transaction.
    pub balance: i64,

    /// Human-readable description.
    pub description: String,

    /// Additional metadata supplied by the caller.
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a usage (debit) transaction.
    #[must_use]
    pub fn usage(
        user_id: UserId,
        credits: i64,
        balance: i64,
        description: String,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type: TransactionType::Usage,
            amount: -credits.abs(),
            balance,
            description,
            metadata,
            created_at: at,
        }
    }

    /// Create a transaction recording a credit grant.
    #[must_use]
    pub fn grant(
        user_id: UserId,
        grant: CreditGrant,
        amount: i64,
        balance: i64,
        description: String,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type: grant.transaction_type(),
            amount: amount.abs(),
            balance,
            description,
            metadata,
            created_at: at,
        }
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// User purchased credits.
    Purchase,

    /// Credits consumed by a tracked feature.
    Usage,

    /// Used credits given back.
    Refund,

    /// Promotional credits.
    Bonus,

    /// Recurring plan allocation.
    MonthlyAllocation,
}

impl TransactionType {
    /// Wire and column name of the type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Usage => "usage",
            Self::Refund => "refund",
            Self::Bonus => "bonus",
            Self::MonthlyAllocation => "monthly_allocation",
        }
    }

    /// Check if this transaction type removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Usage)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(Self::Purchase),
            "usage" => Ok(Self::Usage),
            "refund" => Ok(Self::Refund),
            "bonus" => Ok(Self::Bonus),
            "monthly_allocation" => Ok(Self::MonthlyAllocation),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// The kinds of adjustment accepted when adding credits.
///
/// Usage is the effect of tracking a feature and cannot be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditGrant {
    /// Paid credits: raises `total_credits`.
    Purchase,

    /// Promotional credits: raises `bonus_credits`.
    Bonus,

    /// Plan allocation: raises `total_credits` and `monthly_allocation`.
    MonthlyAllocation,

    /// Returns used credits: lowers `used_credits`, never below zero.
    Refund,
}

impl CreditGrant {
    /// The ledger type written for this grant.
    #[must_use]
    pub const fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Purchase => TransactionType::Purchase,
            Self::Bonus => TransactionType::Bonus,
            Self::MonthlyAllocation => TransactionType::MonthlyAllocation,
            Self::Refund => TransactionType::Refund,
        }
    }

    /// Description used when the caller does not provide one.
    #[must_use]
    pub fn default_description(&self, amount: i64) -> String {
        match self {
            Self::Purchase => format!("Purchased {amount} credits"),
            Self::Bonus => format!("Bonus of {amount} credits"),
            Self::MonthlyAllocation => format!("Monthly allocation of {amount} credits"),
            Self::Refund => format!("Refund of {amount} credits"),
        }
    }
}

impl TryFrom<TransactionType> for CreditGrant {
    type Error = UnknownVariant;

    fn try_from(value: TransactionType) -> Result<Self, Self::Error> {
        match value {
            TransactionType::Purchase => Ok(Self::Purchase),
            TransactionType::Bonus => Ok(Self::Bonus),
            TransactionType::MonthlyAllocation => Ok(Self::MonthlyAllocation),
            TransactionType::Refund => Ok(Self::Refund),
            TransactionType::Usage => Err(UnknownVariant("usage".to_string())),
        }
    }
}

/// A stored discriminator did not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);
