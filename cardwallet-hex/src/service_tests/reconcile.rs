use serde_json::json;

use cardwallet_types::{
    AppError, ApplyOutcome, CardId, CardStatus, CardTransactionType, UserId, WebhookEvent,
};

use super::{Script, service, usd};

fn event(event_id: &str, event_type: &str, card_id: &str, payload: serde_json::Value) -> WebhookEvent {
    WebhookEvent::new(
        event_id,
        event_type,
        Some(CardId::new(card_id)),
        payload,
        true,
    )
}

#[tokio::test]
async fn test_transaction_event_applies_once() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_card(user, "c-1", 50);
    let payload = json!({
        "data": { "amount": "-12.50", "type": "charge", "newBalance": "37.50", "transaction_id": "tx-9" }
    });

    let first = svc
        .apply_webhook(event("evt-1", "card.transaction", "c-1", payload.clone()))
        .await
        .unwrap();
    let second = svc
        .apply_webhook(event("evt-1", "card.transaction", "c-1", payload))
        .await
        .unwrap();

    assert_eq!(first, ApplyOutcome::Applied);
    assert_eq!(second, ApplyOutcome::Duplicate);

    let trail = svc.repo().card_trail("c-1");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].kind, CardTransactionType::Charge);
    assert_eq!(trail[0].amount.amount(), rust_decimal::Decimal::new(1250, 2));
    assert_eq!(trail[0].provider_transaction_id.as_deref(), Some("tx-9"));

    let card = svc.repo().card("c-1").unwrap();
    assert_eq!(card.balance.amount(), rust_decimal::Decimal::new(3750, 2));

    let recorded = svc.repo().event("evt-1").unwrap();
    assert!(recorded.processed);
    assert_eq!(recorded.user_id, Some(user));
}

#[tokio::test]
async fn test_untrusted_event_is_not_recorded() {
    let svc = service(Script::Succeed);
    svc.repo().seed_card(UserId::new(), "c-1", 50);
    let mut untrusted = event("evt-1", "card.blocked", "c-1", json!({}));
    untrusted.signature_valid = false;

    let err = svc.apply_webhook(untrusted).await.unwrap_err();

    assert!(matches!(err, AppError::Reconcile(_)));
    assert!(svc.repo().event("evt-1").is_none());
    assert_eq!(svc.repo().card("c-1").unwrap().status, CardStatus::Active);
}

#[tokio::test]
async fn test_unknown_type_is_acknowledged() {
    let svc = service(Script::Succeed);
    svc.repo().seed_card(UserId::new(), "c-1", 50);

    let outcome = svc
        .apply_webhook(event("evt-1", "kyc.updated", "c-1", json!({})))
        .await
        .unwrap();

    assert_eq!(outcome, ApplyOutcome::Ignored);
    assert!(svc.repo().event("evt-1").unwrap().processed);
}

#[tokio::test]
async fn test_status_and_balance_events() {
    let svc = service(Script::Succeed);
    svc.repo().seed_card(UserId::new(), "c-1", 50);

    svc.apply_webhook(event("evt-1", "card.blocked", "c-1", json!({})))
        .await
        .unwrap();
    assert_eq!(svc.repo().card("c-1").unwrap().status, CardStatus::Blocked);

    svc.apply_webhook(event(
        "evt-2",
        "status_changed",
        "c-1",
        json!({ "status": "ACTIVE" }),
    ))
    .await
    .unwrap();
    assert_eq!(svc.repo().card("c-1").unwrap().status, CardStatus::Active);

    svc.apply_webhook(event(
        "evt-3",
        "card.balance_changed",
        "c-1",
        json!({ "data": { "balance": 44 } }),
    ))
    .await
    .unwrap();
    assert_eq!(svc.repo().card("c-1").unwrap().balance.amount(), usd(44));
}

#[tokio::test]
async fn test_event_for_unknown_card_is_retried_later() {
    let svc = service(Script::Succeed);
    let payload = json!({ "data": { "balance": "80" } });

    let err = svc
        .apply_webhook(event("evt-1", "card.funded", "c-late", payload))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Reconcile(_)));

    let recorded = svc.repo().event("evt-1").unwrap();
    assert!(!recorded.processed);
    assert_eq!(recorded.attempts, 1);
    assert!(recorded.last_error.is_some());

    let still_missing = svc.retry_pending_events(None).await.unwrap();
    assert_eq!(still_missing.attempted, 1);
    assert_eq!(still_missing.failed, 1);

    svc.repo().seed_card(UserId::new(), "c-late", 0);
    let retried = svc.retry_pending_events(Some(10)).await.unwrap();
    assert_eq!(retried.attempted, 1);
    assert_eq!(retried.applied, 1);
    assert_eq!(svc.repo().card("c-late").unwrap().balance.amount(), usd(80));
    assert!(svc.repo().event("evt-1").unwrap().processed);

    let idle = svc.retry_pending_events(None).await.unwrap();
    assert_eq!(idle.attempted, 0);
}

#[tokio::test]
async fn test_malformed_event_stays_unprocessed() {
    let svc = service(Script::Succeed);
    svc.repo().seed_card(UserId::new(), "c-1", 50);

    let err = svc
        .apply_webhook(event("evt-1", "card.transaction", "c-1", json!({ "data": {} })))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Reconcile(_)));
    assert!(!svc.repo().event("evt-1").unwrap().processed);
    assert!(svc.repo().card_trail("c-1").is_empty());
}
