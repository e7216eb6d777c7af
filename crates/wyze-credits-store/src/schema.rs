//! Table names and column lists shared by the SQL backend.

/// Table names as created by the migrations.
pub mod table {
    /// One row per user, unique on `user_id`.
    pub const CREDIT_BALANCE: &str = "ba_credit_balance";

    /// Append-only metered events.
    pub const USAGE_TRACKING: &str = "ba_usage_tracking";

    /// Monthly rollups, keyed by `(user_id, month)`.
    pub const USAGE_SUMMARY: &str = "ba_usage_summary";

    /// Append-only signed ledger.
    pub const CREDIT_TRANSACTIONS: &str = "ba_credit_transactions";
}

/// Columns selected for a balance row.
pub const BALANCE_COLUMNS: &str =
    "user_id, total_credits, used_credits, bonus_credits, monthly_allocation, created_at, updated_at";

/// Columns selected for a summary row.
pub const SUMMARY_COLUMNS: &str = "user_id, month, total_credits, assessments_taken, \
     reports_generated, ai_interactions, api_calls, updated_at";

/// Columns selected for a ledger row.
pub const TRANSACTION_COLUMNS: &str =
    "id, user_id, type, amount, balance, description, metadata, created_at";

/// Columns selected for a usage row.
pub const USAGE_COLUMNS: &str = "id, user_id, feature, credits, metadata, created_at";

/// Every ledger table, in the order rows are removed when purging a user.
#[must_use]
pub fn owned_tables() -> Vec<&'static str> {
    vec![
        table::CREDIT_TRANSACTIONS,
        table::USAGE_SUMMARY,
        table::USAGE_TRACKING,
        table::CREDIT_BALANCE,
    ]
}
