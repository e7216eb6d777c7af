//! Ledger behaviour of `UsageTrackingService` over the in-memory store.

mod common;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use wyze_credits_core::{
    CreditGrant, CreditsError, Feature, MonthlyUsage, TransactionType, UsageMonth, UserId,
};
use wyze_credits_service::{
    AddCredits, AddCreditsResult, TrackUsage, TrackUsageResult, UsageTrackingService,
};
use wyze_credits_store::{FailingWrite, MemoryStore, Store};

use common::fund;

fn service() -> (Arc<MemoryStore>, UsageTrackingService) {
    let store = Arc::new(MemoryStore::new());
    let service = UsageTrackingService::new(store.clone());
    (store, service)
}

/// Sum of signed ledger amounts for a user.
async fn ledger_sum(service: &UsageTrackingService, user_id: &UserId) -> i64 {
    service
        .get_credit_history(user_id, Some(100), 0)
        .await
        .unwrap()
        .iter()
        .map(|tx| tx.amount)
        .sum()
}

// ============================================================================
// trackUsage
// ============================================================================

#[tokio::test]
async fn debit_within_balance() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 10).await;

    let receipt = service
        .track_usage(TrackUsage::new(user.clone(), Feature::Assessment).with_credits(30))
        .await
        .unwrap();

    assert_eq!(receipt.remaining_credits, 80);
    let balance = service.get_balance(&user).await.unwrap().unwrap();
    assert_eq!(balance.used_credits, 30);
    assert_eq!(balance.total_credits, 100);
    assert_eq!(balance.bonus_credits, 10);
    assert_eq!(service.get_available_credits(&user).await.unwrap(), 80);
}

#[tokio::test]
async fn debit_writes_usage_summary_and_ledger() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 50, 0).await;

    service
        .track_usage(
            TrackUsage::new(user.clone(), Feature::AiChat)
                .with_credits(3)
                .with_metadata(json!({ "sessionId": "abc" })),
        )
        .await
        .unwrap();

    let history = service.get_credit_history(&user, None, 0).await.unwrap();
    let usage_row = &history[0];
    assert_eq!(usage_row.transaction_type, TransactionType::Usage);
    assert_eq!(usage_row.amount, -3);
    assert_eq!(usage_row.balance, 47);
    assert_eq!(usage_row.description, "Used 3 credits for ai_chat");
    assert_eq!(usage_row.metadata["sessionId"], "abc");

    let records = service
        .usage_since(&user, Utc::now() - chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].feature, Feature::AiChat);
    assert_eq!(records[0].credits, 3);

    let overview = service.get_usage_summary(&user).await.unwrap();
    assert_eq!(overview.month, UsageMonth::current());
    assert_eq!(overview.current_month.ai_interactions, 1);
    assert_eq!(overview.current_month.total_credits, 3);
    assert_eq!(overview.available_credits, 47);
}

#[tokio::test]
async fn insufficient_credits_writes_nothing() {
    let (store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 10).await;
    let ledger_rows = store.transaction_count().await;

    let err = service
        .track_usage(TrackUsage::new(user.clone(), Feature::Report).with_credits(200))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreditsError::InsufficientCredits {
            available: 110,
            required: 200
        }
    ));

    let envelope = TrackUsageResult::from(Err(err));
    assert!(!envelope.success);
    assert_eq!(envelope.remaining_credits, 110);
    assert_eq!(envelope.error.as_deref(), Some("Insufficient credits"));

    assert_eq!(store.usage_count().await, 0);
    assert_eq!(store.transaction_count().await, ledger_rows);
    assert_eq!(service.get_available_credits(&user).await.unwrap(), 110);
    let overview = service.get_usage_summary(&user).await.unwrap();
    assert_eq!(overview.current_month, MonthlyUsage::default());
}

#[tokio::test]
async fn debit_of_exact_balance_reaches_zero() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 5, 0).await;

    let receipt = service
        .track_usage(TrackUsage::new(user.clone(), Feature::ApiCall).with_credits(5))
        .await
        .unwrap();
    assert_eq!(receipt.remaining_credits, 0);

    let err = service
        .track_usage(TrackUsage::new(user, Feature::ApiCall))
        .await
        .unwrap_err();
    assert!(matches!(err, CreditsError::InsufficientCredits { available: 0, .. }));
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let (store, service) = service();

    let result = TrackUsageResult::from(
        service
            .track_usage(TrackUsage::new(UserId::generate(), Feature::Assessment))
            .await,
    );

    assert!(!result.success);
    assert_eq!(result.remaining_credits, 0);
    assert_eq!(result.error.as_deref(), Some("User not found"));
    assert_eq!(store.usage_count().await, 0);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let (store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 10, 0).await;
    let rows = store.transaction_count().await;

    for credits in [0, -4] {
        let err = service
            .track_usage(TrackUsage::new(user.clone(), Feature::Report).with_credits(credits))
            .await
            .unwrap_err();
        assert!(matches!(err, CreditsError::InvalidAmount(_)));

        let err = service
            .add_credits(AddCredits::new(user.clone(), credits, CreditGrant::Bonus))
            .await
            .unwrap_err();
        assert!(matches!(err, CreditsError::InvalidAmount(_)));
    }

    assert_eq!(store.transaction_count().await, rows);
    assert_eq!(service.get_available_credits(&user).await.unwrap(), 10);
}

#[tokio::test]
async fn failed_write_rolls_back_the_whole_debit() {
    let (store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 20, 0).await;
    let rows = store.transaction_count().await;

    for write in [
        FailingWrite::InsertUsage,
        FailingWrite::SaveBalance,
        FailingWrite::RecordSummary,
        FailingWrite::InsertTransaction,
        FailingWrite::Commit,
    ] {
        store.fail_next(write).await;

        let result = TrackUsageResult::from(
            service
                .track_usage(TrackUsage::new(user.clone(), Feature::Assessment).with_credits(4))
                .await,
        );
        assert!(!result.success, "{write:?} should fail the debit");
        assert_eq!(result.error.as_deref(), Some("Failed to track usage"));

        assert_eq!(service.get_available_credits(&user).await.unwrap(), 20);
        assert_eq!(store.usage_count().await, 0);
        assert_eq!(store.transaction_count().await, rows);
        assert_eq!(
            service.get_usage_summary(&user).await.unwrap().current_month,
            MonthlyUsage::default()
        );
    }

    // The failure is one-shot; the next debit goes through.
    let receipt = service
        .track_usage(TrackUsage::new(user, Feature::Assessment).with_credits(4))
        .await
        .unwrap();
    assert_eq!(receipt.remaining_credits, 16);
}

// ============================================================================
// addCredits
// ============================================================================

#[tokio::test]
async fn purchase_raises_total() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 0).await;

    let receipt = service
        .add_credits(AddCredits::new(user.clone(), 50, CreditGrant::Purchase))
        .await
        .unwrap();

    let balance = service.get_balance(&user).await.unwrap().unwrap();
    assert_eq!(balance.total_credits, 150);
    assert_eq!(receipt.new_balance, balance.available());
    assert_eq!(receipt.new_balance, 150);

    let history = service.get_credit_history(&user, Some(1), 0).await.unwrap();
    assert_eq!(history[0].transaction_type, TransactionType::Purchase);
    assert_eq!(history[0].description, "Purchased 50 credits");
    assert_eq!(history[0].balance, 150);
}

#[tokio::test]
async fn bonus_only_raises_bonus() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 0).await;

    service
        .add_credits(
            AddCredits::new(user.clone(), 20, CreditGrant::Bonus)
                .with_description("Welcome bonus"),
        )
        .await
        .unwrap();

    let balance = service.get_balance(&user).await.unwrap().unwrap();
    assert_eq!(balance.total_credits, 100);
    assert_eq!(balance.bonus_credits, 20);
    assert_eq!(balance.used_credits, 0);

    let history = service.get_credit_history(&user, Some(1), 0).await.unwrap();
    assert_eq!(history[0].description, "Welcome bonus");
}

#[tokio::test]
async fn first_grant_creates_balance() {
    let (_store, service) = service();
    let user = UserId::generate();
    assert!(service.get_balance(&user).await.unwrap().is_none());
    assert_eq!(service.get_available_credits(&user).await.unwrap(), 0);

    let result = AddCreditsResult::from(
        service
            .add_credits(AddCredits::new(user.clone(), 200, CreditGrant::MonthlyAllocation))
            .await,
    );
    assert!(result.success);
    assert_eq!(result.new_balance, 200);

    let balance = service.get_balance(&user).await.unwrap().unwrap();
    assert_eq!(balance.monthly_allocation, 200);
    assert_eq!(balance.total_credits, 200);
}

#[tokio::test]
async fn refund_is_clamped_to_used_credits() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 0).await;
    service
        .track_usage(TrackUsage::new(user.clone(), Feature::Report).with_credits(10))
        .await
        .unwrap();

    let receipt = service
        .add_credits(AddCredits::new(user.clone(), 25, CreditGrant::Refund))
        .await
        .unwrap();

    assert_eq!(receipt.applied, 10);
    assert_eq!(receipt.new_balance, 100);
    let history = service.get_credit_history(&user, Some(1), 0).await.unwrap();
    assert_eq!(history[0].amount, 10);
    assert_eq!(history[0].description, "Refund of 10 credits");
    let balance = service.get_balance(&user).await.unwrap().unwrap();
    assert_eq!(balance.used_credits, 0);
    assert_eq!(ledger_sum(&service, &user).await, 100);

    // Usage counters count events, refunds leave them alone.
    let overview = service.get_usage_summary(&user).await.unwrap();
    assert_eq!(overview.current_month.reports_generated, 1);
    assert_eq!(overview.current_month.total_credits, 10);
}

#[tokio::test]
async fn failed_grant_rolls_back() {
    let (store, service) = service();
    let user = UserId::generate();
    store.fail_next(FailingWrite::InsertTransaction).await;

    let result = AddCreditsResult::from(
        service
            .add_credits(AddCredits::new(user.clone(), 30, CreditGrant::Purchase))
            .await,
    );

    assert!(!result.success);
    assert_eq!(result.new_balance, 0);
    assert_eq!(result.error.as_deref(), Some("Failed to add credits"));
    assert!(service.get_balance(&user).await.unwrap().is_none());
    assert_eq!(store.transaction_count().await, 0);
}

// ============================================================================
// Counter bounds
// ============================================================================

#[tokio::test]
async fn overflowing_grant_is_rejected_without_writes() {
    let (store, service) = service();
    let user = UserId::generate();

    let receipt = service
        .add_credits(AddCredits::new(user.clone(), i64::MAX, CreditGrant::Purchase))
        .await
        .unwrap();
    assert_eq!(receipt.new_balance, i64::MAX);
    let rows = store.transaction_count().await;

    for grant in [
        CreditGrant::Bonus,
        CreditGrant::Purchase,
        CreditGrant::MonthlyAllocation,
    ] {
        let result = AddCreditsResult::from(
            service
                .add_credits(AddCredits::new(user.clone(), 1, grant))
                .await,
        );
        assert!(!result.success, "{grant:?} should overflow");
        assert_eq!(result.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(
            result.error.as_deref(),
            Some("invalid amount: credit counters would overflow")
        );
    }

    let balance = service.get_balance(&user).await.unwrap().unwrap();
    assert_eq!(balance.total_credits, i64::MAX);
    assert_eq!(balance.bonus_credits, 0);
    assert_eq!(balance.monthly_allocation, 0);
    assert_eq!(store.transaction_count().await, rows);
    assert_eq!(ledger_sum(&service, &user).await, i64::MAX);
}

#[tokio::test]
async fn extreme_debit_is_rejected_without_writes() {
    let (store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 10, 0).await;
    let rows = store.transaction_count().await;

    let err = service
        .track_usage(TrackUsage::new(user.clone(), Feature::ApiCall).with_credits(i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreditsError::InsufficientCredits {
            available: 10,
            required: i64::MAX
        }
    ));

    assert_eq!(service.get_available_credits(&user).await.unwrap(), 10);
    assert_eq!(store.usage_count().await, 0);
    assert_eq!(store.transaction_count().await, rows);
}

#[tokio::test]
async fn spending_a_maximal_balance_stays_consistent() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, i64::MAX, 0).await;

    let receipt = service
        .track_usage(TrackUsage::new(user.clone(), Feature::Report).with_credits(i64::MAX))
        .await
        .unwrap();
    assert_eq!(receipt.remaining_credits, 0);

    // Every used credit can be refunded, and only those.
    let refund = service
        .add_credits(AddCredits::new(user.clone(), i64::MAX, CreditGrant::Refund))
        .await
        .unwrap();
    assert_eq!(refund.applied, i64::MAX);
    assert_eq!(refund.new_balance, i64::MAX);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn history_is_newest_first_and_limited() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 0).await;
    for credits in 1..=12 {
        service
            .track_usage(TrackUsage::new(user.clone(), Feature::ApiCall).with_credits(credits))
            .await
            .unwrap();
    }

    let page = service.get_credit_history(&user, None, 0).await.unwrap();
    assert_eq!(page.len(), 10);
    assert_eq!(page[0].amount, -12);
    assert!(page
        .windows(2)
        .all(|pair| (pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id)));

    let tail = service.get_credit_history(&user, Some(5), 10).await.unwrap();
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[2].transaction_type, TransactionType::Purchase);

    // Oversized and zero limits are clamped.
    assert_eq!(
        service.get_credit_history(&user, Some(1000), 0).await.unwrap().len(),
        13
    );
    assert_eq!(
        service.get_credit_history(&user, Some(0), 0).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn configured_default_history_limit() {
    let store = Arc::new(MemoryStore::new());
    let service = UsageTrackingService::new(store).with_default_history_limit(3);
    let user = UserId::generate();
    fund(&service, &user, 10, 0).await;
    for _ in 0..4 {
        service
            .track_usage(TrackUsage::new(user.clone(), Feature::Report))
            .await
            .unwrap();
    }

    assert_eq!(service.get_credit_history(&user, None, 0).await.unwrap().len(), 3);
}

#[tokio::test]
async fn summary_for_user_without_activity() {
    let (_store, service) = service();

    let overview = service.get_usage_summary(&UserId::generate()).await.unwrap();

    assert_eq!(overview.current_month, MonthlyUsage::default());
    assert_eq!(overview.available_credits, 0);
}

#[tokio::test]
async fn check_credits_reports_affordability() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 5, 2).await;

    let check = service.check_credits(&user, 7).await.unwrap();
    assert!(check.sufficient);
    assert_eq!(check.available, 7);

    let check = service.check_credits(&user, 8).await.unwrap();
    assert!(!check.sufficient);

    assert!(matches!(
        service.check_credits(&user, 0).await,
        Err(CreditsError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn purge_removes_everything() {
    let (store, service) = service();
    let user = UserId::generate();
    let other = UserId::generate();
    fund(&service, &user, 10, 0).await;
    fund(&service, &other, 10, 0).await;
    service
        .track_usage(TrackUsage::new(user.clone(), Feature::Assessment))
        .await
        .unwrap();

    let removed = service.purge_user(&user).await.unwrap();

    // balance + usage + summary + two ledger rows
    assert_eq!(removed, 5);
    assert!(service.get_balance(&user).await.unwrap().is_none());
    assert!(service
        .get_credit_history(&user, None, 0)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.usage_count().await, 0);
    assert_eq!(service.get_available_credits(&other).await.unwrap(), 10);
}

// ============================================================================
// Invariants
// ============================================================================

#[tokio::test]
async fn ledger_sum_matches_available_after_mixed_operations() {
    let (_store, service) = service();
    let user = UserId::generate();

    fund(&service, &user, 40, 5).await;
    for (feature, credits) in [
        (Feature::Assessment, 10),
        (Feature::AiChat, 2),
        (Feature::Report, 50), // rejected
        (Feature::ApiCall, 1),
    ] {
        let _ = service
            .track_usage(TrackUsage::new(user.clone(), feature).with_credits(credits))
            .await;
    }
    service
        .add_credits(AddCredits::new(user.clone(), 4, CreditGrant::Refund))
        .await
        .unwrap();
    service
        .add_credits(AddCredits::new(user.clone(), 12, CreditGrant::MonthlyAllocation))
        .await
        .unwrap();
    service
        .add_credits(AddCredits::new(user.clone(), 100, CreditGrant::Refund))
        .await
        .unwrap();

    let available = service.get_available_credits(&user).await.unwrap();
    assert_eq!(available, 57);
    assert_eq!(ledger_sum(&service, &user).await, available);
}

#[tokio::test]
async fn summary_equals_sum_of_usage_records() {
    let (_store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 100, 0).await;

    let start = UsageMonth::current().start().unwrap();
    for (feature, credits) in [
        (Feature::Assessment, 5),
        (Feature::Assessment, 3),
        (Feature::Report, 2),
        (Feature::AiChat, 1),
        (Feature::ApiCall, 1),
        (Feature::ApiCall, 1),
    ] {
        service
            .track_usage(TrackUsage::new(user.clone(), feature).with_credits(credits))
            .await
            .unwrap();
    }

    let records = service.usage_since(&user, start).await.unwrap();
    let overview = service.get_usage_summary(&user).await.unwrap();

    assert_eq!(overview.current_month, MonthlyUsage::from_records(&records));
    assert_eq!(overview.current_month.total_credits, 13);
    assert_eq!(overview.current_month.assessments_taken, 2);
    assert_eq!(overview.current_month.api_calls, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let (store, service) = service();
    let user = UserId::generate();
    fund(&service, &user, 10, 0).await;

    let attempts = futures::future::join_all((0..25).map(|_| {
        let service = service.clone();
        let user = user.clone();
        tokio::spawn(async move {
            service
                .track_usage(TrackUsage::new(user, Feature::ApiCall))
                .await
        })
    }))
    .await;

    let mut succeeded = 0;
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.unwrap() {
            Ok(_) => succeeded += 1,
            Err(CreditsError::InsufficientCredits { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 15);
    assert_eq!(service.get_available_credits(&user).await.unwrap(), 0);
    assert_eq!(store.usage_count().await, 10);
    assert_eq!(ledger_sum(&service, &user).await, 0);
    assert_eq!(store.backend(), "memory");
}
