use actix_web::{http::StatusCode, test::TestRequest};
use checkout_engine::{db_types::Money, CartView};
use serde_json::json as json_value;

use super::helpers::{json, with_token, TestServer, ALICE, BOB};

fn cart(body: &str) -> CartView {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Not a cart. {e}\n{body}"))
}

#[actix_web::test]
async fn cart_requires_a_token() {
    let server = TestServer::new().await;
    let (status, _) = server.get("", "/api/cart").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = server.get("Bearer not.a.token", "/api/cart").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn add_and_fetch_cart_lines() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 1250, 10).await;
    let token = server.user_token(ALICE);
    let req = TestRequest::put().uri("/api/cart").set_json(json_value!({ "product_id": popcorn.id, "quantity": 2 }));
    let (status, body) = server.send(with_token(req, &token)).await;
    assert_eq!(status, StatusCode::OK);
    let view = cart(&body);
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].quantity, 2);
    assert_eq!(view.subtotal, Money::from_cents(2500));

    let (status, body) = server.get(&token, "/api/cart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart(&body), view);

    // Carts are private
    let (_, body) = server.get(&server.user_token(BOB), "/api/cart").await;
    assert!(cart(&body).lines.is_empty());
}

#[actix_web::test]
async fn quantities_are_clamped_to_stock() {
    let server = TestServer::new().await;
    let mug = server.add_product("Mug", 900, 3).await;
    let token = server.user_token(ALICE);
    let req = TestRequest::put().uri("/api/cart").set_json(json_value!({ "product_id": mug.id, "quantity": 7 }));
    let (status, body) = server.send(with_token(req, &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart(&body).lines[0].quantity, 3);
}

#[actix_web::test]
async fn invalid_cart_lines() {
    let server = TestServer::new().await;
    let mug = server.add_product("Mug", 900, 3).await;
    let token = server.user_token(ALICE);
    let req = TestRequest::put().uri("/api/cart").set_json(json_value!({ "product_id": mug.id, "quantity": 0 }));
    let (status, _) = server.send(with_token(req, &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let req = TestRequest::put().uri("/api/cart").set_json(json_value!({ "product_id": 9999, "quantity": 1 }));
    let (status, _) = server.send(with_token(req, &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn remove_and_clear() {
    let server = TestServer::new().await;
    let mug = server.add_product("Mug", 900, 3).await;
    let popcorn = server.add_product("Popcorn", 1250, 10).await;
    server.fill_cart(ALICE, &mug, 1).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let token = server.user_token(ALICE);

    let req = TestRequest::delete().uri(&format!("/api/cart/{}", mug.id));
    let (status, body) = server.send(with_token(req, &token)).await;
    assert_eq!(status, StatusCode::OK);
    let view = cart(&body);
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].product_id, popcorn.id);

    let (status, body) = server.send(with_token(TestRequest::delete().uri("/api/cart"), &token)).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "1 items removed from your cart");
    assert!(server.sys.carts.fetch_cart(ALICE).await.unwrap().lines.is_empty());
}
