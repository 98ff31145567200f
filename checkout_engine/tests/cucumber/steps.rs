use checkout_engine::{
    db_types::{CartLine, Money},
    order_objects::CheckoutRequest,
    test_utils::fixtures::{completed_payment_event, payment_event, shipping_info, sign},
    traits::{CouponManagement, ProductCatalog},
    ReconcileOutcome,
};
use cucumber::{then, when};

use crate::cucumber::StorefrontWorld;

#[when(expr = "{word} puts {int} {string} in their cart")]
async fn add_to_cart(world: &mut StorefrontWorld, user: String, quantity: i64, product: String) {
    let product_id = world.product(&product).id;
    world
        .sys()
        .carts
        .upsert_line(&user, CartLine { product_id, variant: None, quantity })
        .await
        .expect("Error updating cart");
}

#[when(expr = "{word} checks out as session {word}")]
async fn checkout(world: &mut StorefrontWorld, user: String, session: String) {
    checkout_with(world, user, session, None).await;
}

#[when(expr = "{word} checks out as session {word} with coupon {word}")]
async fn checkout_with_coupon(world: &mut StorefrontWorld, user: String, session: String, code: String) {
    checkout_with(world, user, session, Some(code)).await;
}

async fn checkout_with(world: &mut StorefrontWorld, user: String, name: String, code: Option<String>) {
    let request = CheckoutRequest { shipping_info: shipping_info(), coupon_id: None, coupon_code: code };
    let session = world.sys().checkout.create_session(&user, request).await.expect("Error creating session");
    world.sessions.insert(name, session);
}

#[when(expr = "payment {word} for session {word} completes")]
async fn payment_completes(world: &mut StorefrontWorld, payment_id: String, session: String) {
    let session = world.session(&session);
    let body = completed_payment_event(&payment_id, &session.external_order_id, session.breakdown.total_amount);
    deliver(world, Some(sign(&body)), body).await;
}

#[when(expr = "payment {word} for session {word} is reported as {word}")]
async fn payment_status(world: &mut StorefrontWorld, payment_id: String, session: String, status: String) {
    let session = world.session(&session);
    let body = payment_event(&payment_id, &session.external_order_id, &status, session.breakdown.total_amount);
    deliver(world, Some(sign(&body)), body).await;
}

#[when(expr = "a forged notification for payment {word} of session {word} arrives")]
async fn forged_payment(world: &mut StorefrontWorld, payment_id: String, session: String) {
    let session = world.session(&session);
    let body = completed_payment_event(&payment_id, &session.external_order_id, session.breakdown.total_amount);
    deliver(world, Some("c2lnbmF0dXJl".into()), body).await;
}

async fn deliver(world: &mut StorefrontWorld, signature: Option<String>, body: Vec<u8>) {
    let outcome = world.sys().reconciler.handle_webhook(signature.as_deref(), &body).await;
    world.outcomes.push(outcome);
}

#[then(expr = "the notification is {word}")]
async fn check_outcome(world: &mut StorefrontWorld, expected: String) {
    let outcome = world.last_outcome();
    let matched = match expected.as_str() {
        "settled" => matches!(outcome, ReconcileOutcome::Settled { .. }),
        "ignored" => matches!(outcome, ReconcileOutcome::Ignored { .. }),
        "duplicate" => matches!(outcome, ReconcileOutcome::Duplicate { .. }),
        "rejected" => matches!(outcome, ReconcileOutcome::Rejected { .. }),
        "retryable" => outcome.is_retryable(),
        other => panic!("Unknown outcome {other}"),
    };
    assert!(matched, "Expected the notification to be {expected}, but got {outcome:?}");
}

#[then(expr = "{word} has {int} order(s)")]
async fn order_count(world: &mut StorefrontWorld, user: String, count: usize) {
    let orders = world.sys().orders.orders_for_user(&user).await.expect("Error fetching orders");
    assert_eq!(orders.len(), count);
}

#[then(expr = "the latest order for {word} totals {word}")]
async fn order_total(world: &mut StorefrontWorld, user: String, total: String) {
    let order = world.latest_order(&user).await;
    let expected: Money = total.parse().expect("Not a money amount");
    assert_eq!(order.total_amount, expected);
}

#[then(expr = "the latest order for {word} used coupon {word}")]
async fn order_coupon(world: &mut StorefrontWorld, user: String, code: String) {
    let order = world.latest_order(&user).await;
    assert_eq!(order.coupon.map(|c| c.code), Some(code));
}

#[then(expr = "the latest order for {word} has no coupon")]
async fn order_without_coupon(world: &mut StorefrontWorld, user: String) {
    let order = world.latest_order(&user).await;
    assert!(order.coupon.is_none(), "Order has coupon {:?}", order.coupon);
}

#[then(expr = "the latest order for {word} includes {int} free {string}")]
async fn order_gift(world: &mut StorefrontWorld, user: String, qty: i64, product: String) {
    let order = world.latest_order(&user).await;
    let gift = order.items.iter().find(|i| i.is_gift).expect("The order has no gift line");
    assert_eq!(gift.name, product);
    assert_eq!(gift.quantity, qty);
}

#[then(expr = "{string} has {int} in stock")]
async fn stock_level(world: &mut StorefrontWorld, product: String, stock: i64) {
    let id = world.product(&product).id;
    let product = world.sys().db.fetch_product(id).await.expect("Error fetching product").expect("No product");
    assert_eq!(product.stock, stock);
}

#[then(expr = "{word}'s cart is empty")]
async fn cart_empty(world: &mut StorefrontWorld, user: String) {
    let cart = world.sys().carts.fetch_cart(&user).await.expect("Error fetching cart");
    assert!(cart.lines.is_empty(), "Cart has {} lines", cart.lines.len());
}

#[then(expr = "{word}'s coupon {word} is used")]
async fn coupon_used(world: &mut StorefrontWorld, user: String, code: String) {
    let coupon = world
        .sys()
        .db
        .fetch_user_coupon_by_code(&user, &code)
        .await
        .expect("Error fetching coupon")
        .expect("No such coupon");
    assert!(coupon.is_used());
}
