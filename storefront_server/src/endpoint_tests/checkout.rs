use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use checkout_engine::{
    coupon_objects::NewGlobalCouponRequest,
    db_types::{CouponKind, Role},
    test_utils::fixtures::shipping_info,
    CheckoutApi,
    CheckoutConfig,
    ProcessorError,
    SqliteDatabase,
};
use serde_json::{json as json_value, Value};

use super::{
    helpers::{json, with_token, TestServer, ADMIN, ALICE},
    mocks::MockProcessor,
};
use crate::{auth::TokenIssuer, middleware::JwtAuthMiddlewareFactory, routes::CheckoutRoute};

fn checkout_body() -> Value {
    json_value!({ "shipping_info": shipping_info() })
}

#[actix_web::test]
async fn checkout_requires_a_token() {
    let server = TestServer::new().await;
    let (status, body) = server.post_json("", "/api/checkout", checkout_body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json(&body)["error"].as_str().unwrap().contains("No access token"));
}

#[actix_web::test]
async fn checkout_returns_the_payment_page() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 2).await;
    let token = server.user_token(ALICE);
    let (status, body) = server.post_json(&token, "/api/checkout", checkout_body()).await;
    assert_eq!(status, StatusCode::OK);
    let url = json(&body)["url"].as_str().expect("url").to_string();
    assert!(url.starts_with("https://checkout.example.com/pay/"));

    let checkouts = server.sys.processor.checkouts();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].reference_id, ALICE);
    // The cart is only cleared once the payment arrives
    assert_eq!(server.sys.carts.fetch_cart(ALICE).await.unwrap().lines.len(), 1);
}

#[actix_web::test]
async fn checkout_with_an_empty_cart_is_a_bad_request() {
    let server = TestServer::new().await;
    let token = server.user_token(ALICE);
    let (status, body) = server.post_json(&token, "/api/checkout", checkout_body()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());
    assert!(server.sys.processor.checkouts().is_empty());
}

#[actix_web::test]
async fn checkout_with_incomplete_shipping_info_is_a_bad_request() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let mut shipping = shipping_info();
    shipping.zip_code = String::new();
    let token = server.user_token(ALICE);
    let (status, _) = server.post_json(&token, "/api/checkout", json_value!({ "shipping_info": shipping })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn coupon_by_id_and_code_is_ambiguous() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let token = server.user_token(ALICE);
    let body = json_value!({ "shipping_info": shipping_info(), "coupon_id": 1, "coupon_code": "SPRING" });
    let (status, body) = server.post_json(&token, "/api/checkout", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Provide either a coupon id or a coupon code, not both");
}

#[actix_web::test]
async fn coupon_codes_discount_the_payment_page() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 2).await;
    let request = NewGlobalCouponRequest {
        code: "SPRING".into(),
        kind: CouponKind::Percentage { percentage: 20, max_deduction: None },
        days_valid: 30,
        start_at: None,
        max_redemptions: None,
        per_user_limit: 1,
        note: None,
    };
    server.sys.coupons.create_global_coupon(request, ADMIN).await.expect("Error creating coupon");
    let token = server.user_token(ALICE);
    let body = json_value!({ "shipping_info": shipping_info(), "coupon_code": "spring" });
    let (status, _) = server.post_json(&token, "/api/checkout", body).await;
    assert_eq!(status, StatusCode::OK);
    let checkouts = server.sys.processor.checkouts();
    let discount = checkouts[0].discount.as_ref().expect("discount");
    assert_eq!(discount.name, "Coupon SPRING");
    assert!(!discount.amount.is_zero());
}

#[actix_web::test]
async fn unknown_coupon_codes_are_not_found() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let token = server.user_token(ALICE);
    let body = json_value!({ "shipping_info": shipping_info(), "coupon_code": "NOPE" });
    let (status, _) = server.post_json(&token, "/api/checkout", body).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(server.sys.processor.checkouts().is_empty());
}

#[actix_web::test]
async fn processor_failures_are_bad_gateway() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;

    let mut processor = MockProcessor::new();
    processor
        .expect_create_payment_link()
        .times(1)
        .returning(|_| Err(ProcessorError::Rejected { status: 400, message: "INVALID_LOCATION".into() }));
    let api = CheckoutApi::new(server.sys.db.clone(), processor, CheckoutConfig::default());
    let issuer = TokenIssuer::new(&server.config.auth);
    let app = App::new().app_data(web::Data::new(api)).service(
        web::scope("/api")
            .wrap(JwtAuthMiddlewareFactory::new(issuer))
            .service(CheckoutRoute::<SqliteDatabase, MockProcessor>::new()),
    );
    let service = test::init_service(app).await;
    let token = server.token(ALICE, &[Role::User]);
    let req = with_token(TestRequest::post().uri("/api/checkout").set_json(checkout_body()), &token);
    let res = test::call_service(&service, req.to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = test::read_body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("INVALID_LOCATION"));
}
