//! Credit balance for wyze-credits.
//!
//! One balance row exists per user. It is created lazily by the first credit
//! grant and mutated only by the ledger service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CreditGrant, CreditsError, Result, UserId};

/// The credit counters of a single user (`ba_credit_balance`).
///
/// Available credits are derived, never stored:
/// `total_credits + bonus_credits - used_credits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    /// The user who owns this balance.
    pub user_id: UserId,

    /// Credits granted by purchases and monthly allocations.
    pub total_credits: i64,

    /// Credits consumed by tracked usage, net of refunds.
    pub used_credits: i64,

    /// Promotional credits, kept apart from `total_credits`.
    pub bonus_credits: i64,

    /// Sum of all monthly allocations granted so far.
    pub monthly_allocation: i64,

    /// When the balance row was created.
    pub created_at: DateTime<Utc>,

    /// When the balance row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    /// Create a new balance with all counters at zero.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self::new_at(user_id, Utc::now())
    }

    /// Create a new zero balance stamped with the given time.
    #[must_use]
    pub fn new_at(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            total_credits: 0,
            used_credits: 0,
            bonus_credits: 0,
            monthly_allocation: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Credits that can still be spent.
    ///
    /// Saturates instead of wrapping; the mutators below keep the counters
    /// within range.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.total_credits
            .saturating_add(self.bonus_credits)
            .saturating_sub(self.used_credits)
    }

    /// Check if the balance covers a debit of `credits`.
    #[must_use]
    pub const fn has_sufficient_credits(&self, credits: i64) -> bool {
        self.available() >= credits
    }

    /// Record consumption of `credits`.
    ///
    /// The caller checks affordability first; this only moves the counter.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidAmount` if `used_credits` would overflow.
    /// The balance is left unchanged.
    pub fn debit(&mut self, credits: i64, at: DateTime<Utc>) -> Result<()> {
        let used = checked(self.used_credits.checked_add(credits))?;
        self.used_credits = used;
        self.updated_at = at;
        Ok(())
    }

    /// Apply a credit grant and return the amount that actually changed the
    /// available credits.
    ///
    /// Refunds only give back credits that were used, so a refund larger than
    /// `used_credits` applies partially.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidAmount` if a counter, or the available
    /// credits derived from them, would overflow. The balance is left
    /// unchanged.
    pub fn apply_grant(
        &mut self,
        grant: CreditGrant,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut total = self.total_credits;
        let mut bonus = self.bonus_credits;
        let mut allocation = self.monthly_allocation;
        let mut used = self.used_credits;

        let applied = match grant {
            CreditGrant::Purchase => {
                total = checked(total.checked_add(amount))?;
                amount
            }
            CreditGrant::Bonus => {
                bonus = checked(bonus.checked_add(amount))?;
                amount
            }
            CreditGrant::MonthlyAllocation => {
                total = checked(total.checked_add(amount))?;
                allocation = checked(allocation.checked_add(amount))?;
                amount
            }
            CreditGrant::Refund => {
                let refunded = amount.min(used).max(0);
                used -= refunded;
                refunded
            }
        };

        // used >= 0, so available never exceeds total + bonus
        checked(total.checked_add(bonus))?;

        self.total_credits = total;
        self.bonus_credits = bonus;
        self.monthly_allocation = allocation;
        self.used_credits = used;
        self.updated_at = at;
        Ok(applied)
    }
}

fn checked(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(CreditsError::counter_overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(total: i64, used: i64, bonus: i64) -> CreditBalance {
        let mut balance = CreditBalance::new(UserId::generate());
        balance.total_credits = total;
        balance.used_credits = used;
        balance.bonus_credits = bonus;
        balance
    }

    #[test]
    fn new_balance_is_empty() {
        let balance = CreditBalance::new(UserId::generate());
        assert_eq!(balance.available(), 0);
        assert_eq!(balance.monthly_allocation, 0);
    }

    #[test]
    fn available_includes_bonus() {
        let balance = balance(100, 0, 10);
        assert_eq!(balance.available(), 110);
        assert!(balance.has_sufficient_credits(110));
        assert!(!balance.has_sufficient_credits(111));
    }

    #[test]
    fn debit_moves_used_credits() {
        let mut balance = balance(100, 0, 10);
        balance.debit(30, Utc::now()).unwrap();
        assert_eq!(balance.used_credits, 30);
        assert_eq!(balance.available(), 80);
    }

    #[test]
    fn purchase_raises_total() {
        let mut balance = balance(100, 0, 0);
        assert_eq!(
            balance
                .apply_grant(CreditGrant::Purchase, 50, Utc::now())
                .unwrap(),
            50
        );
        assert_eq!(balance.total_credits, 150);
        assert_eq!(balance.bonus_credits, 0);
    }

    #[test]
    fn bonus_leaves_total_alone() {
        let mut balance = balance(100, 0, 0);
        balance.apply_grant(CreditGrant::Bonus, 20, Utc::now()).unwrap();
        assert_eq!(balance.total_credits, 100);
        assert_eq!(balance.bonus_credits, 20);
    }

    #[test]
    fn monthly_allocation_tracks_both_counters() {
        let mut balance = balance(0, 0, 0);
        balance
            .apply_grant(CreditGrant::MonthlyAllocation, 500, Utc::now())
            .unwrap();
        balance
            .apply_grant(CreditGrant::MonthlyAllocation, 500, Utc::now())
            .unwrap();
        assert_eq!(balance.total_credits, 1000);
        assert_eq!(balance.monthly_allocation, 1000);
    }

    #[test]
    fn refund_is_clamped_at_used_credits() {
        let mut balance = balance(100, 30, 0);
        let refunded = balance
            .apply_grant(CreditGrant::Refund, 10, Utc::now())
            .unwrap();
        assert_eq!(refunded, 10);
        assert_eq!(balance.used_credits, 20);
        let refunded = balance
            .apply_grant(CreditGrant::Refund, 50, Utc::now())
            .unwrap();
        assert_eq!(refunded, 20);
        assert_eq!(balance.used_credits, 0);
        let refunded = balance
            .apply_grant(CreditGrant::Refund, 5, Utc::now())
            .unwrap();
        assert_eq!(refunded, 0);
    }

    #[test]
    fn overflowing_grant_leaves_balance_unchanged() {
        let mut balance = balance(i64::MAX - 5, 0, 0);
        let before = balance.clone();

        for grant in [
            CreditGrant::Purchase,
            CreditGrant::MonthlyAllocation,
            CreditGrant::Bonus,
        ] {
            assert!(matches!(
                balance.apply_grant(grant, 10, Utc::now()),
                Err(CreditsError::InvalidAmount(_))
            ));
            assert_eq!(balance, before);
        }

        // Fits exactly.
        assert_eq!(
            balance.apply_grant(CreditGrant::Bonus, 5, Utc::now()).unwrap(),
            5
        );
        assert_eq!(balance.available(), i64::MAX);
    }

    #[test]
    fn overflowing_debit_leaves_balance_unchanged() {
        let mut balance = balance(0, i64::MAX, 0);
        let before = balance.clone();
        assert!(balance.debit(1, Utc::now()).is_err());
        assert_eq!(balance, before);
    }

    #[test]
    fn available_saturates() {
        assert_eq!(balance(i64::MAX, 0, i64::MAX).available(), i64::MAX);
        assert_eq!(balance(0, i64::MAX, 0).available(), -i64::MAX);
    }
}
