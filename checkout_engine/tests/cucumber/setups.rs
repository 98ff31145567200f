use checkout_engine::{
    coupon_objects::{NewGlobalCouponRequest, NewUserCouponRequest},
    db_types::{CouponKind, Money},
    test_utils::{fixtures::add_product, system::TestSystem},
};
use cucumber::given;

use crate::cucumber::StorefrontWorld;

fn money(s: &str) -> Money {
    s.parse().unwrap_or_else(|e| panic!("{s} is not a money amount. {e}"))
}

#[given("a fresh install")]
async fn fresh_install(world: &mut StorefrontWorld) {
    world.system = Some(TestSystem::new().await);
}

#[given(expr = "a product {string} costing {word} with {int} in stock")]
async fn product(world: &mut StorefrontWorld, name: String, price: String, stock: i64) {
    let product = add_product(&world.sys().db, &name, money(&price).cents(), stock).await;
    world.products.insert(name, product);
}

#[given(expr = "a global coupon {word} for {int}% off, limited to {int} redemptions")]
async fn capped_global_coupon(world: &mut StorefrontWorld, code: String, percentage: i64, max: i64) {
    global_coupon(world, code, CouponKind::Percentage { percentage, max_deduction: None }, Some(max)).await;
}

#[given(expr = "a global coupon {word} for {int}% off")]
async fn percentage_global_coupon(world: &mut StorefrontWorld, code: String, percentage: i64) {
    global_coupon(world, code, CouponKind::Percentage { percentage, max_deduction: None }, None).await;
}

#[given(expr = "a global coupon {word} giving {int} {string} on orders over {word}")]
async fn gift_global_coupon(world: &mut StorefrontWorld, code: String, qty: i64, product: String, threshold: String) {
    let gift_product_id = world.product(&product).id;
    let kind = CouponKind::FreeGift { gift_product_id, gift_qty: qty, threshold: money(&threshold) };
    global_coupon(world, code, kind, None).await;
}

async fn global_coupon(world: &mut StorefrontWorld, code: String, kind: CouponKind, max_redemptions: Option<i64>) {
    let request = NewGlobalCouponRequest {
        code,
        kind,
        days_valid: 30,
        start_at: None,
        max_redemptions,
        per_user_limit: 1,
        note: None,
    };
    world.sys().coupons.create_global_coupon(request, "admin").await.expect("Error creating global coupon");
}

#[given(expr = "{word} has a personal coupon {word} for {int}% off")]
async fn personal_coupon(world: &mut StorefrontWorld, user: String, code: String, percentage: i64) {
    let request = NewUserCouponRequest {
        user_id: user,
        code,
        kind: CouponKind::Percentage { percentage, max_deduction: None },
        days_valid: 30,
        note: None,
    };
    world.sys().coupons.create_user_coupon(request, "admin").await.expect("Error creating personal coupon");
}
