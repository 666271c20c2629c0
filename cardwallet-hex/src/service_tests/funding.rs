use std::time::Duration;

use rust_decimal::Decimal;

use cardwallet_types::{
    AppError, CardId, CardTransactionType, Currency, FeeSetting, FundCardRequest,
    FundingAttemptStatus, LedgerRepository, UserId,
};

use super::{Script, service, service_with_timeout, usd};

fn fund(amount: i64, key: Option<&str>) -> FundCardRequest {
    FundCardRequest {
        amount: Decimal::from(amount),
        idempotency_key: key.map(str::to_string),
    }
}

#[tokio::test]
async fn test_fund_card_moves_both_balances() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().seed_card(user, "c-1", 5);

    let funded = svc
        .fund_card(user, &CardId::new("c-1"), fund(30, Some("k-1")))
        .await
        .unwrap();

    assert_eq!(funded.fees.total_amount, usd(31));
    assert_eq!(funded.wallet_balance, usd(69));
    assert_eq!(funded.card_balance, usd(35));
    assert_eq!(funded.provider_transaction_id.as_deref(), Some("ptx-1"));

    let wallet_trail = svc.repo().wallet_trail(wallet.id);
    assert_eq!(wallet_trail.len(), 1);
    assert_eq!(wallet_trail[0].amount, usd(-31));

    let card_trail = svc.repo().card_trail("c-1");
    assert_eq!(card_trail.len(), 1);
    assert_eq!(card_trail[0].kind, CardTransactionType::Fund);
    assert_eq!(card_trail[0].amount.amount(), usd(30));

    let attempt = svc.repo().get_funding_attempt(user, "k-1").await.unwrap().unwrap();
    assert_eq!(attempt.status, FundingAttemptStatus::Succeeded);
}

#[tokio::test]
async fn test_fund_card_insufficient_wallet_never_calls_issuer() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_wallet(user, 25, Currency::USD);
    svc.repo().seed_card(user, "c-1", 5);

    let err = svc
        .fund_card(user, &CardId::new("c-1"), fund(30, None))
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientFunds {
            available,
            required,
            shortfall,
        } => {
            assert_eq!(available.amount(), usd(25));
            assert_eq!(required.amount(), usd(31));
            assert_eq!(shortfall.amount(), usd(6));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(svc.provider().calls(), 0);
    assert_eq!(svc.repo().card("c-1").unwrap().balance.amount(), usd(5));
}

#[tokio::test]
async fn test_fund_card_below_minimum_never_reaches_issuer() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().seed_card(user, "c-1", 5);
    svc.repo()
        .upsert_fee_setting(
            FeeSetting::new("min_card_reload_usd", Decimal::TEN, Some(Currency::USD)).unwrap(),
        )
        .await
        .unwrap();

    let err = svc
        .fund_card(user, &CardId::new("c-1"), fund(5, Some("k-min")))
        .await
        .unwrap_err();

    match err {
        AppError::BelowMinimum { amount, minimum } => {
            assert_eq!(amount.amount(), usd(5));
            assert_eq!(minimum.amount(), usd(10));
        }
        other => panic!("expected BelowMinimum, got {:?}", other),
    }
    assert_eq!(svc.provider().calls(), 0);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(100));
    assert_eq!(svc.repo().card("c-1").unwrap().balance.amount(), usd(5));
    assert!(svc.repo().wallet_trail(wallet.id).is_empty());
    assert!(svc.repo().card_trail("c-1").is_empty());
    assert!(
        svc.repo()
            .get_funding_attempt(user, "k-min")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_fund_card_of_another_user_is_not_found() {
    let svc = service(Script::Succeed);
    let owner = UserId::new();
    let intruder = UserId::new();
    svc.repo().seed_card(owner, "c-1", 5);
    svc.repo().seed_wallet(intruder, 100, Currency::USD);

    let err = svc
        .fund_card(intruder, &CardId::new("c-1"), fund(30, None))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NOT_FOUND_OR_UNAUTHORIZED");
    assert_eq!(svc.provider().calls(), 0);
}

#[tokio::test]
async fn test_resubmitted_key_is_refused_without_issuer_call() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().seed_card(user, "c-1", 0);
    let card_id = CardId::new("c-1");

    svc.fund_card(user, &card_id, fund(30, Some("same")))
        .await
        .unwrap();
    let err = svc
        .fund_card(user, &card_id, fund(30, Some("same")))
        .await
        .unwrap_err();

    match err {
        AppError::DuplicateFundingAttempt { key, status } => {
            assert_eq!(key, "same");
            assert_eq!(status, "succeeded");
        }
        other => panic!("expected DuplicateFundingAttempt, got {:?}", other),
    }
    assert_eq!(svc.provider().calls(), 1);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(69));
}

#[tokio::test]
async fn test_same_key_from_two_users_funds_both_cards() {
    let svc = service(Script::Succeed);
    let alice = UserId::new();
    let bob = UserId::new();
    let alice_wallet = svc.repo().seed_wallet(alice, 100, Currency::USD);
    let bob_wallet = svc.repo().seed_wallet(bob, 100, Currency::USD);
    svc.repo().seed_card(alice, "c-a", 0);
    svc.repo().seed_card(bob, "c-b", 0);

    svc.fund_card(alice, &CardId::new("c-a"), fund(30, Some("shared")))
        .await
        .unwrap();
    let funded = svc
        .fund_card(bob, &CardId::new("c-b"), fund(30, Some("shared")))
        .await
        .unwrap();

    assert_eq!(funded.wallet_balance, usd(69));
    assert_eq!(svc.provider().calls(), 2);
    assert_eq!(svc.repo().wallet(alice_wallet.id).balance.amount(), usd(69));
    assert_eq!(svc.repo().wallet(bob_wallet.id).balance.amount(), usd(69));
    for (user, card) in [(alice, "c-a"), (bob, "c-b")] {
        let attempt = svc
            .repo()
            .get_funding_attempt(user, "shared")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempt.status, FundingAttemptStatus::Succeeded);
        assert_eq!(attempt.card_id.as_str(), card);
    }
}

#[tokio::test]
async fn test_issuer_rejection_marks_attempt_failed() {
    let svc = service(Script::Reject);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().seed_card(user, "c-1", 0);

    let err = svc
        .fund_card(user, &CardId::new("c-1"), fund(30, Some("k-1")))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROVIDER_REJECTED");
    let attempt = svc.repo().get_funding_attempt(user, "k-1").await.unwrap().unwrap();
    assert_eq!(attempt.status, FundingAttemptStatus::Failed);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(100));
    assert!(svc.repo().card_trail("c-1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_issuer_timeout_leaves_attempt_for_reconciliation() {
    let svc = service_with_timeout(Script::Hang, Duration::from_secs(5));
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().seed_card(user, "c-1", 0);

    let err = svc
        .fund_card(user, &CardId::new("c-1"), fund(30, Some("k-1")))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROVIDER_TIMEOUT");
    let attempt = svc.repo().get_funding_attempt(user, "k-1").await.unwrap().unwrap();
    assert_eq!(attempt.status, FundingAttemptStatus::NeedsReconciliation);
    assert!(svc.repo().card("c-1").unwrap().needs_reconciliation);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(100));
}

#[tokio::test]
async fn test_failed_commit_after_issuer_load_escalates() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().seed_card(user, "c-1", 0);
    svc.repo().fail_commits();

    let err = svc
        .fund_card(user, &CardId::new("c-1"), fund(30, Some("k-1")))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "COMPENSATION_NEEDED");
    let attempt = svc.repo().get_funding_attempt(user, "k-1").await.unwrap().unwrap();
    assert_eq!(attempt.status, FundingAttemptStatus::NeedsReconciliation);
    assert!(svc.repo().card("c-1").unwrap().needs_reconciliation);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(100));
}
