use rust_decimal::Decimal;

use cardwallet_types::{AppError, CreateCardRequest, Currency, UserId, WalletTransactionType};

use super::{Script, service, usd};

fn card_request(currency: &str, amount: Decimal) -> CreateCardRequest {
    CreateCardRequest {
        customer_email: "ada@example.com".into(),
        name_on_card: "Ada Lovelace".into(),
        currency: currency.into(),
        card_type: "visa".into(),
        amount,
    }
}

#[tokio::test]
async fn test_create_card_charges_principal_plus_fees() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);

    let created = svc
        .create_card(user, card_request("USD", usd(50)))
        .await
        .unwrap();

    assert_eq!(created.fees.fixed_fee, usd(1));
    assert_eq!(created.fees.percent_fee, usd(1));
    assert_eq!(created.fees.total_amount, usd(52));
    assert_eq!(created.wallet_balance, usd(48));
    assert_eq!(created.card.balance, usd(50));
    assert_eq!(
        created.card.masked_number.as_deref(),
        Some("**** **** **** 4242")
    );

    let trail = svc.repo().wallet_trail(wallet.id);
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].amount, usd(-52));
    assert_eq!(trail[0].kind, WalletTransactionType::CardCreation);
    assert_eq!(trail[0].reference, created.card.card_id.as_str());
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(48));
}

#[tokio::test]
async fn test_below_minimum_never_reaches_issuer() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 4000, Currency::XOF);

    let result = svc.create_card(user, card_request("XOF", usd(4500))).await;

    match result {
        Err(AppError::BelowMinimum { minimum, .. }) => {
            assert_eq!(minimum.amount(), usd(5000));
        }
        other => panic!("expected BelowMinimum, got {:?}", other),
    }
    assert_eq!(svc.provider().calls(), 0);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(4000));
    assert!(svc.repo().wallet_trail(wallet.id).is_empty());
}

#[tokio::test]
async fn test_insufficient_wallet_reports_shortfall() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_wallet(user, 40, Currency::USD);

    let err = svc
        .create_card(user, card_request("USD", usd(50)))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    assert_eq!(err.details()["shortfall"], "12");
    assert_eq!(svc.provider().calls(), 0);
}

#[tokio::test]
async fn test_missing_wallet() {
    let svc = service(Script::Succeed);

    let err = svc
        .create_card(UserId::new(), card_request("USD", usd(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::WalletNotFound(Currency::USD)));
}

#[tokio::test]
async fn test_issuer_rejection_leaves_wallet_untouched() {
    let svc = service(Script::Reject);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);

    let err = svc
        .create_card(user, card_request("USD", usd(50)))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROVIDER_REJECTED");
    assert_eq!(svc.provider().calls(), 1);
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(100));
    assert!(svc.repo().wallet_trail(wallet.id).is_empty());
    assert!(svc.repo().card("card-1").is_none());
}

#[tokio::test]
async fn test_card_limit() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_wallet(user, 1000, Currency::USD);
    for n in 0..svc.policy().max_cards_per_user {
        svc.repo().seed_card(user, &format!("old-{}", n), 0);
    }

    let err = svc
        .create_card(user, card_request("USD", usd(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CardLimitReached { limit: 10 }));
    assert_eq!(svc.provider().calls(), 0);
}

#[tokio::test]
async fn test_failed_debit_after_issuance_flags_card() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 100, Currency::USD);
    svc.repo().fail_commits();

    let err = svc
        .create_card(user, card_request("USD", usd(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CompensationNeeded(_)));
    let card = svc.repo().card("card-1").expect("issued card is kept on file");
    assert!(card.needs_reconciliation);
    assert!(card.reconciliation_note.is_some());
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(100));
}

#[tokio::test]
async fn test_invalid_inputs_are_refused_first() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    svc.repo().seed_wallet(user, 100, Currency::USD);

    let mut bad_type = card_request("USD", usd(50));
    bad_type.card_type = "amex".into();
    assert_eq!(
        svc.create_card(user, bad_type).await.unwrap_err().code(),
        "VALIDATION_ERROR"
    );

    let err = svc
        .create_card(user, card_request("EUR", usd(50)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = svc
        .create_card(user, card_request("USD", usd(0)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_AMOUNT");
    assert_eq!(svc.provider().calls(), 0);
}
