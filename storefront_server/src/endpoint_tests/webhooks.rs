use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use checkout_engine::{
    db_types::Money,
    helpers::SIGNATURE_HEADER,
    test_utils::{
        fixtures::{completed_payment_event, payment_event, sign},
        system::test_reconciler_config,
    },
    PaymentReconciler,
    ProcessorError,
    SqliteDatabase,
};

use super::{
    helpers::{json, TestServer, ALICE},
    mocks::MockProcessor,
};
use crate::routes::SquareWebhookRoute;

fn notification(body: Vec<u8>, signature: Option<String>) -> TestRequest {
    let mut req = TestRequest::post().uri("/webhooks/square").set_payload(body);
    if let Some(sig) = signature {
        req = req.insert_header((SIGNATURE_HEADER, sig));
    }
    req
}

#[actix_web::test]
async fn bad_signatures_are_unauthorized() {
    let server = TestServer::new().await;
    let body = completed_payment_event("PAY-1", "ORDER-0001", Money::from_cents(1000));
    let (status, response) = server.send(notification(body.clone(), Some("bm90IGEgc2lnbmF0dXJl".into()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json(&response)["error"].as_str().unwrap().contains("signature"));

    let (status, _) = server.send(notification(body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn tampered_bodies_are_unauthorized() {
    let server = TestServer::new().await;
    let body = completed_payment_event("PAY-1", "ORDER-0001", Money::from_cents(1000));
    let signature = sign(&body);
    let tampered = completed_payment_event("PAY-1", "ORDER-0001", Money::from_cents(1));
    let (status, _) = server.send(notification(tampered, Some(signature))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn completed_payment_is_settled_and_acknowledged() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 2).await;
    let session = server.open_session(ALICE).await;

    let body = completed_payment_event("PAY-1", &session.external_order_id, session.breakdown.total_amount);
    let signature = sign(&body);
    let (status, response) = server.send(notification(body.clone(), Some(signature.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&response);
    assert_eq!(response["received"], true);
    assert_eq!(response["result"]["outcome"], "settled");
    let order_id = response["result"]["order_id"].as_i64().expect("order id");

    let orders = server.sys.orders.orders_for_user(ALICE).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, order_id);

    // Redelivery is acknowledged without creating a second order
    let (status, response) = server.send(notification(body, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&response);
    assert_eq!(response["result"]["outcome"], "duplicate");
    assert_eq!(response["result"]["order_id"], order_id);
    assert_eq!(server.sys.orders.orders_for_user(ALICE).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn other_payment_states_are_ignored() {
    let server = TestServer::new().await;
    let body = payment_event("PAY-2", "ORDER-0001", "APPROVED", Money::from_cents(1000));
    let signature = sign(&body);
    let (status, response) = server.send(notification(body, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&response)["result"]["outcome"], "ignored");
}

#[actix_web::test]
async fn transient_failures_are_acknowledged_by_default() {
    let server = TestServer::new().await;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let session = server.open_session(ALICE).await;
    server.sys.processor.fail_next_retrievals(vec![ProcessorError::Timeout("10s".into())]);

    let body = completed_payment_event("PAY-1", &session.external_order_id, session.breakdown.total_amount);
    let signature = sign(&body);
    let (status, response) = server.send(notification(body, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&response);
    assert_eq!(response["received"], true);
    assert_eq!(response["result"]["outcome"], "retryable_failure");
    assert!(server.sys.orders.orders_for_user(ALICE).await.unwrap().is_empty());
}

#[actix_web::test]
async fn transient_failures_are_nacked_when_configured() {
    let mut server = TestServer::new().await;
    server.config.webhooks.nack_retryable_events = true;
    let popcorn = server.add_product("Popcorn", 2000, 10).await;
    server.fill_cart(ALICE, &popcorn, 1).await;
    let session = server.open_session(ALICE).await;
    server.sys.processor.fail_next_retrievals(vec![ProcessorError::Transient("502 Bad Gateway".into())]);

    let body = completed_payment_event("PAY-1", &session.external_order_id, session.breakdown.total_amount);
    let signature = sign(&body);
    let (status, response) = server.send(notification(body.clone(), Some(signature.clone()))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&response)["received"], false);

    // Square delivers again once the processor has recovered
    let (status, response) = server.send(notification(body, Some(signature))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&response)["result"]["outcome"], "settled");
}

#[actix_web::test]
async fn unknown_external_orders_are_rejected_but_acknowledged() {
    let server = TestServer::new().await;
    let mut processor = MockProcessor::new();
    processor
        .expect_retrieve_order()
        .times(1)
        .returning(|id| Err(ProcessorError::Rejected { status: 404, message: format!("Order {id} not found") }));
    let reconciler = PaymentReconciler::new(server.sys.db.clone(), processor, test_reconciler_config());
    let app = App::new()
        .app_data(web::Data::new(reconciler))
        .app_data(web::Data::new(server.config.clone()))
        .service(SquareWebhookRoute::<SqliteDatabase, MockProcessor>::new());
    let service = test::init_service(app).await;

    let body = completed_payment_event("PAY-9", "ORDER-9999", Money::from_cents(1000));
    let signature = sign(&body);
    let req = notification(body, Some(signature)).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let response: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(response["result"]["outcome"], "rejected");
    assert_eq!(response["result"]["reason"]["reason"], "ExternalOrderUnavailable");
}
