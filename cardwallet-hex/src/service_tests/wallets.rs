use rust_decimal::Decimal;

use cardwallet_types::{
    AdjustmentAction, AppError, CreditDepositRequest, Currency, DepositProvider,
    FeeOperation, FeeQuoteQuery, ManageWalletRequest, OpenWalletRequest, UpsertFeeSettingRequest,
    UserId, WalletId, WalletTransactionType,
};

use super::{Script, service, usd};

fn deposit(user_id: UserId, amount: i64, reference: &str) -> CreditDepositRequest {
    CreditDepositRequest {
        user_id,
        currency: "usd".into(),
        amount: Decimal::from(amount),
        provider: DepositProvider::Moneroo,
        reference: reference.into(),
    }
}

fn adjust(
    action: AdjustmentAction,
    user_id: UserId,
    wallet_id: WalletId,
    amount: i64,
) -> ManageWalletRequest {
    ManageWalletRequest {
        action,
        user_id,
        wallet_id,
        amount: Decimal::from(amount),
        description: None,
    }
}

#[tokio::test]
async fn test_open_wallet_is_idempotent() {
    let svc = service(Script::Succeed);
    let user = UserId::new();

    let first = svc
        .open_wallet(user, OpenWalletRequest { currency: "xof".into() })
        .await
        .unwrap();
    let second = svc
        .open_wallet(user, OpenWalletRequest { currency: "XOF".into() })
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(svc.list_wallets(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deposit_credits_once_per_reference() {
    let svc = service(Script::Succeed);
    let user = UserId::new();

    let first = svc.credit_deposit(deposit(user, 100, "pay-1")).await.unwrap();
    assert!(!first.duplicate);
    assert_eq!(first.new_balance, usd(100));

    let again = svc.credit_deposit(deposit(user, 100, "pay-1")).await.unwrap();
    assert!(again.duplicate);
    assert_eq!(again.old_balance, usd(100));
    assert_eq!(again.new_balance, usd(100));
    assert_eq!(again.transaction_id, first.transaction_id);

    let trail = svc.wallet_history(user, first.wallet_id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].kind, WalletTransactionType::Deposit);
    assert_eq!(trail[0].reference, "moneroo:pay-1");
}

#[tokio::test]
async fn test_deposit_rejects_non_positive_amount() {
    let svc = service(Script::Succeed);

    let err = svc
        .credit_deposit(deposit(UserId::new(), 0, "pay-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidAmount(_)));
}

#[tokio::test]
async fn test_history_of_foreign_wallet_is_hidden() {
    let svc = service(Script::Succeed);
    let owner = UserId::new();
    let wallet = svc.repo().seed_wallet(owner, 10, Currency::USD);

    let err = svc
        .wallet_history(UserId::new(), wallet.id)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NOT_FOUND_OR_UNAUTHORIZED");
}

#[tokio::test]
async fn test_admin_adjustment_records_trail() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 10, Currency::USD);

    let res = svc
        .manage_wallet(UserId::new(), adjust(AdjustmentAction::Add, user, wallet.id, 15))
        .await
        .unwrap();

    assert!(res.success);
    assert!(res.transaction_recorded);
    assert_eq!(res.wallet.old_balance, usd(10));
    assert_eq!(res.wallet.new_balance, usd(25));
    assert_eq!(res.wallet.amount_changed, usd(15));

    let trail = svc.repo().wallet_trail(wallet.id);
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].kind, WalletTransactionType::AdminAdjustment);
    assert!(trail[0].reference.starts_with("admin-add-"));
}

#[tokio::test]
async fn test_admin_balance_change_stands_when_trail_fails() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 40, Currency::USD);
    svc.repo().fail_appends();

    let res = svc
        .manage_wallet(
            UserId::new(),
            adjust(AdjustmentAction::Subtract, user, wallet.id, 15),
        )
        .await
        .unwrap();

    assert!(!res.transaction_recorded);
    assert_eq!(res.wallet.new_balance, usd(25));
    assert_eq!(res.wallet.amount_changed, usd(-15));
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(25));
    assert!(svc.repo().wallet_trail(wallet.id).is_empty());
}

#[tokio::test]
async fn test_admin_subtract_cannot_overdraw() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 10, Currency::USD);

    let err = svc
        .manage_wallet(
            UserId::new(),
            adjust(AdjustmentAction::Subtract, user, wallet.id, 15),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    assert_eq!(svc.repo().wallet(wallet.id).balance.amount(), usd(10));
}

#[tokio::test]
async fn test_admin_adjustment_validates_target() {
    let svc = service(Script::Succeed);
    let user = UserId::new();
    let wallet = svc.repo().seed_wallet(user, 10, Currency::USD);

    let err = svc
        .manage_wallet(UserId::new(), adjust(AdjustmentAction::Add, user, wallet.id, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = svc
        .manage_wallet(
            UserId::new(),
            adjust(AdjustmentAction::Add, UserId::new(), wallet.id, 5),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_fee_quote_follows_updated_settings() {
    let svc = service(Script::Succeed);
    let query = FeeQuoteQuery {
        operation: FeeOperation::CardReload,
        amount: usd(30),
        currency: "USD".into(),
    };

    let before = svc.quote_fees(query.clone()).await.unwrap();
    assert_eq!(before.breakdown.total_fee, usd(1));
    assert_eq!(before.minimum_amount, usd(1));

    svc.upsert_fee_setting(UpsertFeeSettingRequest {
        key: "CARD_RELOAD_PERCENT_FEE".into(),
        value: Decimal::new(35, 1),
        currency: None,
    })
    .await
    .unwrap();

    let after = svc.quote_fees(query).await.unwrap();
    assert_eq!(after.breakdown.percent_fee, Decimal::new(105, 2));
    assert_eq!(after.breakdown.total_amount, Decimal::new(3145, 2));
}

#[tokio::test]
async fn test_negative_fee_setting_is_refused() {
    let svc = service(Script::Succeed);

    let err = svc
        .upsert_fee_setting(UpsertFeeSettingRequest {
            key: "card_reload_percent_fee".into(),
            value: Decimal::from(-1),
            currency: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
}
