use cardwallet_types::{CardId, CardStatus, CardTransactionType, UserId};

use super::{Script, service, usd};

#[tokio::test]
async fn test_block_then_unblock_records_trail() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_card(user, "c-1", 20);
    let card_id = CardId::new("c-1");

    let blocked = svc.block_card(user, &card_id, Some("lost")).await.unwrap();
    assert_eq!(blocked.status, CardStatus::Blocked);

    let active = svc.unblock_card(user, &card_id).await.unwrap();
    assert_eq!(active.status, CardStatus::Active);
    assert_eq!(active.balance.amount(), usd(20));

    let history = svc.card_history(user, &card_id).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![CardTransactionType::Unblock, CardTransactionType::Block]
    );
    assert!(history.iter().all(|t| t.amount.is_zero()));
}

#[tokio::test]
async fn test_block_refused_by_issuer_keeps_status() {
    let svc = service(Script::Reject);
    let user = UserId::new();
    svc.repo().seed_card(user, "c-1", 20);

    let err = svc
        .block_card(user, &CardId::new("c-1"), None)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROVIDER_REJECTED");
    assert_eq!(svc.repo().card("c-1").unwrap().status, CardStatus::Active);
}

#[tokio::test]
async fn test_status_not_stored_after_issuer_change_escalates() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_card(user, "c-1", 20);
    svc.repo().fail_appends();

    let err = svc
        .block_card(user, &CardId::new("c-1"), None)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "COMPENSATION_NEEDED");
    assert!(svc.repo().card("c-1").unwrap().needs_reconciliation);
}

#[tokio::test]
async fn test_sync_overwrites_from_issuer() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_card(user, "c-1", 20);
    svc.provider().report_balance(12);

    let synced = svc.sync_card(user, &CardId::new("c-1")).await.unwrap();

    assert_eq!(synced.balance.amount(), usd(12));
    assert_eq!(synced.masked_number.as_deref(), Some("**** **** **** 9876"));
    assert_eq!(synced.expiry.as_deref(), Some("01/30"));
    assert!(svc.repo().card_trail("c-1").is_empty());
}

#[tokio::test]
async fn test_cards_are_listed_per_owner() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_card(user, "c-1", 0);
    svc.repo().seed_card(user, "c-2", 0);
    svc.repo().seed_card(UserId::new(), "c-3", 0);

    assert_eq!(svc.list_cards(user).await.unwrap().len(), 2);
    let err = svc.get_card(user, &CardId::new("c-3")).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND_OR_UNAUTHORIZED");
}
