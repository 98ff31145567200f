use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::{json as json_value, Value};

use super::helpers::{json, with_token, TestServer, ALICE, BOB};

fn spring_coupon() -> Value {
    json_value!({
        "code": "spring",
        "kind": { "type": "percentage", "percentage": 20 },
        "days_valid": 30
    })
}

#[actix_web::test]
async fn only_admins_create_coupons() {
    let server = TestServer::new().await;
    let token = server.user_token(ALICE);
    let (status, body) = server.post_json(&token, "/api/admin/coupons/global", spring_coupon()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json(&body)["error"].as_str().unwrap().contains("Insufficient Permissions"));
    let (status, _) = server.post_json("", "/api/admin/coupons/global", spring_coupon()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn create_global_coupon() {
    let server = TestServer::new().await;
    let token = server.admin_token();
    let (status, body) = server.post_json(&token, "/api/admin/coupons/global", spring_coupon()).await;
    assert_eq!(status, StatusCode::CREATED);
    let coupon = json(&body);
    assert_eq!(coupon["code"], "SPRING");
    assert_eq!(coupon["scope"], "global");
    assert_eq!(coupon["per_user_limit"], 1);

    let (status, _) = server.post_json(&token, "/api/admin/coupons/global", spring_coupon()).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_web::test]
async fn invalid_coupons_are_rejected() {
    let server = TestServer::new().await;
    let body = json_value!({
        "code": "HALF",
        "kind": { "type": "percentage", "percentage": 150 },
        "days_valid": 30
    });
    let (status, _) = server.post_json(&server.admin_token(), "/api/admin/coupons/global", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn personal_coupons_belong_to_their_owner() {
    let server = TestServer::new().await;
    let body = json_value!({
        "user_id": ALICE,
        "code": "WELCOME",
        "kind": { "type": "percentage", "percentage": 10 },
        "days_valid": 7
    });
    let (status, body) = server.post_json(&server.admin_token(), "/api/admin/coupons/user", body).await;
    assert_eq!(status, StatusCode::CREATED);
    let coupon = json(&body);
    assert_eq!(coupon["scope"], "user");
    assert_eq!(coupon["assigned_to"], ALICE);
    let id = coupon["id"].as_i64().expect("coupon id");

    let (status, body) = server.get(&server.user_token(ALICE), "/api/coupons").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().map(|a| a.len()), Some(1));
    let (status, _) = server.get(&server.user_token(ALICE), &format!("/api/coupons/{id}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get(&server.user_token(BOB), &format!("/api/coupons/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = server.get(&server.user_token(BOB), "/api/coupons").await;
    assert_eq!(json(&body), json_value!([]));
}

#[actix_web::test]
async fn validate_and_claim_a_global_coupon() {
    let server = TestServer::new().await;
    server.post_json(&server.admin_token(), "/api/admin/coupons/global", spring_coupon()).await;
    let token = server.user_token(ALICE);

    let (status, body) = server.get(&token, "/api/coupons/validate/Spring").await;
    assert_eq!(status, StatusCode::OK);
    let validation = json(&body);
    assert_eq!(validation["coupon"]["code"], "SPRING");
    assert!(validation["expires_at"].is_string());

    let (status, body) = server.get(&token, "/api/coupons/validate/NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "The data was not found. Coupon not found");

    let (status, body) = server.post_json(&token, "/api/coupons/claim", json_value!({ "code": "spring" })).await;
    assert_eq!(status, StatusCode::OK);
    let claimed = json(&body);
    assert_eq!(claimed["scope"], "user");
    assert_eq!(claimed["assigned_to"], ALICE);

    // Claiming again hands back the same copy
    let (status, body) = server.post_json(&token, "/api/coupons/claim", json_value!({ "code": "SPRING" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["id"], claimed["id"]);

    let (_, body) = server.get(&token, "/api/coupons?only_valid=true").await;
    assert_eq!(json(&body).as_array().map(|a| a.len()), Some(1));
}

#[actix_web::test]
async fn search_and_delete_coupons() {
    let server = TestServer::new().await;
    let admin = server.admin_token();
    server.post_json(&admin, "/api/admin/coupons/global", spring_coupon()).await;
    let personal = json_value!({
        "user_id": BOB,
        "code": "SORRY",
        "kind": { "type": "percentage", "percentage": 15 },
        "days_valid": 7
    });
    server.post_json(&admin, "/api/admin/coupons/user", personal).await;

    let (status, body) = server.get(&admin, "/api/admin/coupons").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body).as_array().map(|a| a.len()), Some(2));

    let (_, body) = server.get(&admin, "/api/admin/coupons?scope=user").await;
    let found = json(&body);
    assert_eq!(found.as_array().map(|a| a.len()), Some(1));
    assert_eq!(found[0]["code"], "SORRY");

    let (_, body) = server.get(&admin, &format!("/api/admin/coupons?assigned_to={BOB}&page=1&limit=5")).await;
    assert_eq!(json(&body).as_array().map(|a| a.len()), Some(1));

    let (status, _) = server.get(&admin, "/api/admin/coupons?limit=500").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = found[0]["id"].as_i64().expect("coupon id");
    let req = with_token(TestRequest::delete().uri(&format!("/api/admin/coupons/{id}")), &admin);
    let (status, body) = server.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["success"], true);
    let req = with_token(TestRequest::delete().uri(&format!("/api/admin/coupons/{id}")), &admin);
    let (status, _) = server.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
