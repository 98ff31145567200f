use actix_web::http::StatusCode;
use checkout_engine::test_utils::fixtures::{completed_payment_event, sign};

use super::helpers::{json, TestServer, ALICE, BOB};

/// Runs a full purchase for Alice and returns the new order's id.
async fn settled_order(server: &TestServer) -> i64 {
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let session = server.open_session(ALICE).await;
    let body = completed_payment_event("PAY-1", &session.external_order_id, session.breakdown.total_amount);
    let signature = sign(&body);
    server.sys.reconciler.handle_webhook(Some(&signature), &body).await;
    let orders = server.sys.orders.orders_for_user(ALICE).await.expect("Error fetching orders");
    assert_eq!(orders.len(), 1, "Expected the payment to settle");
    orders[0].id
}

#[actix_web::test]
async fn fetch_my_orders() {
    let server = TestServer::new().await;
    let order_id = settled_order(&server).await;
    let (status, body) = server.get(&server.user_token(ALICE), "/api/orders").await;
    assert_eq!(status, StatusCode::OK);
    let orders = json(&body);
    assert_eq!(orders.as_array().map(|a| a.len()), Some(1));
    assert_eq!(orders[0]["id"], order_id);
    assert_eq!(orders[0]["user_id"], ALICE);

    let (status, body) = server.get(&server.user_token(ALICE), &format!("/api/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], order_id);
}

#[actix_web::test]
async fn other_users_orders_are_not_found() {
    let server = TestServer::new().await;
    let order_id = settled_order(&server).await;
    let token = server.user_token(BOB);
    let (status, body) = server.get(&token, "/api/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), serde_json::json!([]));
    let (status, _) = server.get(&token, &format!("/api/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn admins_can_fetch_any_order() {
    let server = TestServer::new().await;
    let order_id = settled_order(&server).await;
    let path = format!("/api/admin/orders/{order_id}");
    let (status, _) = server.get(&server.user_token(BOB), &path).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = server.get(&server.admin_token(), &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["user_id"], ALICE);
    let (status, _) = server.get(&server.admin_token(), "/api/admin/orders/9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
