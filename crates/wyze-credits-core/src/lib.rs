//! Core types for the wyze-credits ledger.
//!
//! This crate provides the foundational types shared by the store and the service:
//!
//! - **Identifiers**: `UserId`, `TransactionId`, `UsageId`
//! - **Balance**: `CreditBalance`
//! - **Ledger**: `CreditTransaction`, `TransactionType`, `CreditGrant`
//! - **Usage**: `Feature`, `UsageRecord`, `UsageSummary`, `UsageMonth`
//!
//! # Credits
//!
//! A credit is the unit debited per feature use. Counters are stored as `i64`.
//! Available credits are always derived:
//!
//! ```text
//! available = total_credits + bonus_credits - used_credits
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod credits;
pub mod error;
pub mod ids;
pub mod usage;

pub use balance::CreditBalance;
pub use credits::{CreditGrant, CreditTransaction, TransactionType, UnknownVariant};
pub use error::{CreditsError, Result};
pub use ids::{IdError, TransactionId, UsageId, UserId, MAX_USER_ID_LEN};
pub use usage::{Feature, InvalidMonth, MonthlyUsage, UsageMonth, UsageRecord, UsageSummary};
