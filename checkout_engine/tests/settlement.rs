use checkout_engine::{
    db_types::{
        CartLine,
        CouponKind,
        CouponScope,
        CouponScopeType,
        CouponSnapshot,
        Money,
        NewCoupon,
        NewOrder,
        OrderItem,
        PaymentInfo,
    },
    test_utils::{
        fixtures::{add_product, shipping_info},
        prepare_env::new_test_db,
    },
    traits::{
        CartManagement,
        CouponClaimFailure,
        CouponFinalization,
        CouponManagement,
        OrderManagement,
        ProductCatalog,
        StepResult,
    },
    SettlementCoordinator,
    SettlementOutcome,
    SqliteDatabase,
};
use chrono::{Duration, Utc};

const USER: &str = "bob";

fn new_order(product_id: i64, payment_id: &str, coupon: Option<CouponSnapshot>) -> NewOrder {
    let price = Money::from_cents(1000);
    NewOrder {
        user_id: USER.into(),
        shipping_info: shipping_info(),
        items: vec![OrderItem {
            product_id: Some(product_id),
            name: "Popcorn".into(),
            unit_price: price,
            quantity: 1,
            line_total: price,
            is_gift: false,
        }],
        items_price: price,
        discount_amount: Money::default(),
        shipping_amount: Money::from_cents(500),
        tax_amount: Money::from_cents(150),
        total_amount: Money::from_cents(1650),
        processor_total: Some(Money::from_cents(1650)),
        payment_info: PaymentInfo { external_payment_id: payment_id.into(), status: "COMPLETED".into() },
        external_order_id: format!("EXT-{payment_id}"),
        coupon,
    }
}

async fn coupon_snapshot(db: &SqliteDatabase, scope: CouponScope) -> CouponSnapshot {
    let kind = CouponKind::Percentage { percentage: 10, max_deduction: None };
    let coupon = NewCoupon::new("TEN", scope, kind.clone(), Utc::now() + Duration::days(1));
    let coupon = db.insert_coupon(coupon).await.expect("Error inserting coupon");
    CouponSnapshot {
        coupon_id: coupon.id,
        code: coupon.code,
        scope: coupon.scope.scope_type(),
        kind,
        discount_applied: Money::from_cents(100),
        gift: None,
    }
}

async fn settle(
    coordinator: &SettlementCoordinator<SqliteDatabase>,
    order: NewOrder,
) -> (i64, Option<CouponFinalization>) {
    match coordinator.settle(order).await.expect("Error settling order") {
        SettlementOutcome::Settled { order, report } => {
            assert!(report.is_complete(), "{report:?}");
            (order.id, report.coupon)
        },
        SettlementOutcome::AlreadyExists(o) => panic!("Order #{} already existed", o.id),
        SettlementOutcome::CouponUnavailable(reason) => panic!("Coupon could not be claimed: {reason}"),
    }
}

async fn expect_coupon_unavailable(
    coordinator: &SettlementCoordinator<SqliteDatabase>,
    order: NewOrder,
) -> CouponClaimFailure {
    match coordinator.settle(order).await.expect("Error settling order") {
        SettlementOutcome::CouponUnavailable(reason) => reason,
        other => panic!("Expected the coupon claim to fail, got {other:?}"),
    }
}

#[tokio::test]
async fn second_insert_of_a_payment_is_a_no_op() {
    let db = new_test_db().await;
    let product = add_product(&db, "Popcorn", 1000, 5).await;
    let coordinator = SettlementCoordinator::new(db.clone());
    let (order_id, _) = settle(&coordinator, new_order(product.id, "PAY-1", None)).await;
    match coordinator.settle(new_order(product.id, "PAY-1", None)).await.unwrap() {
        SettlementOutcome::AlreadyExists(o) => assert_eq!(o.id, order_id),
        other => panic!("Expected AlreadyExists, got {other:?}"),
    }
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 4);
}

#[tokio::test]
async fn each_step_applies_once() {
    let db = new_test_db().await;
    let product = add_product(&db, "Popcorn", 1000, 5).await;
    db.upsert_cart_line(USER, CartLine { product_id: product.id, variant: None, quantity: 1 }).await.unwrap();
    let coordinator = SettlementCoordinator::new(db.clone());
    let (order_id, coupon) = settle(&coordinator, new_order(product.id, "PAY-2", None)).await;
    assert_eq!(coupon, Some(CouponFinalization::NoCoupon));

    assert_eq!(db.apply_stock_for_order(order_id).await.unwrap(), StepResult::AlreadyApplied);
    assert_eq!(db.clear_cart_for_order(order_id).await.unwrap(), StepResult::AlreadyApplied);
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 4);
    assert!(db.fetch_cart(USER).await.unwrap().is_empty());

    let order = db.fetch_order(order_id).await.unwrap().unwrap();
    assert!(order.is_fully_settled());
    let report = coordinator.resume(&order).await;
    assert!(report.is_complete());
    assert!(report.stock.is_none() && report.cart_lines_cleared.is_none() && report.coupon.is_none());
}

#[tokio::test]
async fn steps_on_a_missing_order_fail() {
    let db = new_test_db().await;
    assert!(db.apply_stock_for_order(999).await.is_err());
    assert!(db.clear_cart_for_order(999).await.is_err());
}

#[tokio::test]
async fn second_redemption_of_a_global_coupon_saves_nothing() {
    let db = new_test_db().await;
    let product = add_product(&db, "Popcorn", 1000, 5).await;
    let snapshot = coupon_snapshot(&db, CouponScope::Global { max_redemptions: None, per_user_limit: 1 }).await;
    assert_eq!(snapshot.scope, CouponScopeType::Global);
    let coordinator = SettlementCoordinator::new(db.clone());

    let (first, coupon) = settle(&coordinator, new_order(product.id, "PAY-3", Some(snapshot.clone()))).await;
    assert_eq!(coupon, Some(CouponFinalization::Redeemed));
    let second = new_order(product.id, "PAY-4", Some(snapshot.clone()));
    let reason = expect_coupon_unavailable(&coordinator, second).await;
    assert_eq!(reason, CouponClaimFailure::PerUserLimitReached);
    assert!(db.fetch_order_by_payment_id("PAY-4").await.unwrap().is_none());
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 4);

    let redemption = db.fetch_redemption(snapshot.coupon_id, USER).await.unwrap().expect("ledger entry");
    assert_eq!(redemption.order_id, first);
    let counts = db.redemption_counts(snapshot.coupon_id, USER).await.unwrap();
    assert_eq!(counts.total, 1);
    assert_eq!(counts.for_user, 1);

    // The same payment priced without the coupon goes through
    let (_, coupon) = settle(&coordinator, new_order(product.id, "PAY-4", None)).await;
    assert_eq!(coupon, Some(CouponFinalization::NoCoupon));
}

#[tokio::test]
async fn global_coupon_cap_is_checked_when_the_order_is_saved() {
    let db = new_test_db().await;
    let product = add_product(&db, "Popcorn", 1000, 5).await;
    let snapshot = coupon_snapshot(&db, CouponScope::Global { max_redemptions: Some(1), per_user_limit: 1 }).await;
    let coordinator = SettlementCoordinator::new(db.clone());

    let (_, coupon) = settle(&coordinator, new_order(product.id, "PAY-10", Some(snapshot.clone()))).await;
    assert_eq!(coupon, Some(CouponFinalization::Redeemed));
    let mut order = new_order(product.id, "PAY-11", Some(snapshot.clone()));
    order.user_id = "alice".into();
    let reason = expect_coupon_unavailable(&coordinator, order).await;
    assert_eq!(reason, CouponClaimFailure::RedemptionCapReached);
    assert_eq!(db.redemption_counts(snapshot.coupon_id, "alice").await.unwrap().total, 1);
}

#[tokio::test]
async fn personal_coupon_is_only_used_once() {
    let db = new_test_db().await;
    let product = add_product(&db, "Popcorn", 1000, 5).await;
    let scope = CouponScope::User { assigned_to: USER.into(), used: false };
    let snapshot = coupon_snapshot(&db, scope).await;
    let coordinator = SettlementCoordinator::new(db.clone());

    let (_, coupon) = settle(&coordinator, new_order(product.id, "PAY-5", Some(snapshot.clone()))).await;
    assert_eq!(coupon, Some(CouponFinalization::MarkedUsed));
    let second = new_order(product.id, "PAY-6", Some(snapshot.clone()));
    let reason = expect_coupon_unavailable(&coordinator, second).await;
    assert_eq!(reason, CouponClaimFailure::AlreadyUsed);
    assert!(db.fetch_order_by_payment_id("PAY-6").await.unwrap().is_none());
    assert!(db.fetch_coupon(snapshot.coupon_id).await.unwrap().unwrap().is_used());
}

#[tokio::test]
async fn deleted_coupon_cannot_be_claimed() {
    let db = new_test_db().await;
    let product = add_product(&db, "Popcorn", 1000, 5).await;
    let scope = CouponScope::User { assigned_to: USER.into(), used: false };
    let snapshot = coupon_snapshot(&db, scope).await;
    assert!(db.delete_coupon(snapshot.coupon_id).await.unwrap());
    let coordinator = SettlementCoordinator::new(db.clone());
    let reason = expect_coupon_unavailable(&coordinator, new_order(product.id, "PAY-7", Some(snapshot))).await;
    assert_eq!(reason, CouponClaimFailure::Gone);
    assert!(db.fetch_order_by_payment_id("PAY-7").await.unwrap().is_none());
}

#[tokio::test]
async fn a_failing_stock_line_does_not_undo_the_others() {
    let db = new_test_db().await;
    let popcorn = add_product(&db, "Popcorn", 1000, 5).await;
    let candy = add_product(&db, "Candy", 300, 5).await;
    let trigger = format!(
        "CREATE TRIGGER candy_stock_locked BEFORE UPDATE OF stock ON products WHEN NEW.id = {} BEGIN SELECT \
         RAISE(ABORT, 'candy stock is locked'); END;",
        candy.id
    );
    sqlx::query(&trigger).execute(db.pool()).await.expect("Error creating trigger");

    let mut order = new_order(popcorn.id, "PAY-8", None);
    order.items.push(OrderItem {
        product_id: Some(candy.id),
        name: "Candy".into(),
        unit_price: Money::from_cents(300),
        quantity: 2,
        line_total: Money::from_cents(600),
        is_gift: false,
    });
    let coordinator = SettlementCoordinator::new(db.clone());
    let report = match coordinator.settle(order).await.expect("Error settling order") {
        SettlementOutcome::Settled { report, .. } => report,
        other => panic!("Expected Settled, got {other:?}"),
    };
    assert!(report.is_complete(), "{report:?}");
    let lines = report.stock.as_ref().expect("stock was applied");
    assert_eq!(lines.len(), 2);
    assert!(lines[0].applied);
    assert!(lines[0].error.is_none());
    assert!(!lines[1].applied);
    assert!(lines[1].error.as_deref().unwrap_or_default().contains("candy stock is locked"));
    assert_eq!(report.failed_stock_lines().len(), 1);

    assert_eq!(db.fetch_product(popcorn.id).await.unwrap().unwrap().stock, 4);
    assert_eq!(db.fetch_product(candy.id).await.unwrap().unwrap().stock, 5);
    let order_id = report.order_id;
    assert_eq!(db.apply_stock_for_order(order_id).await.unwrap(), StepResult::AlreadyApplied);
}
