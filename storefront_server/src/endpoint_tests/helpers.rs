use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, App};
use checkout_engine::{
    db_types::{CartLine, Product, Role},
    order_objects::{CheckoutRequest, CheckoutSession},
    test_utils::{
        fixtures::{add_product, shipping_info, TEST_NOTIFICATION_URL, TEST_SIGNATURE_KEY},
        system::TestSystem,
    },
};
use serde_json::Value;
use storefront_common::Secret;

use crate::{
    auth::TokenIssuer,
    config::{AuthConfig, ServerConfig},
    server::configure_app,
};

// Only for tests. Never use this key anywhere else.
const TEST_JWT_SECRET: &str = "endpoint-tests-secret-do-not-reuse-0123456789";

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";
pub const ADMIN: &str = "admin";

/// A fresh engine and a server configuration that trusts the test signing keys.
pub struct TestServer {
    pub sys: TestSystem,
    pub config: ServerConfig,
}

impl TestServer {
    pub async fn new() -> Self {
        let sys = TestSystem::new().await;
        let mut config = ServerConfig::default();
        config.auth = AuthConfig { jwt_secret: Secret::new(TEST_JWT_SECRET.to_string()) };
        config.webhooks.signature_key = Secret::new(TEST_SIGNATURE_KEY.to_string());
        config.webhooks.notification_url = TEST_NOTIFICATION_URL.to_string();
        config.webhooks.retrieve_attempts = 1;
        Self { sys, config }
    }

    pub fn token(&self, user: &str, roles: &[Role]) -> String {
        let token = TokenIssuer::new(&self.config.auth).issue_token(user, roles, None).expect("Failed to sign token");
        format!("Bearer {token}")
    }

    pub fn user_token(&self, user: &str) -> String {
        self.token(user, &[Role::User])
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN, &[Role::User, Role::Admin])
    }

    /// Runs the request through a server wired exactly like the real one. Errors raised by middleware are turned into
    /// the responses actix would send.
    pub async fn send(&self, req: TestRequest) -> (StatusCode, String) {
        let config = self.config.clone();
        let db = self.sys.db.clone();
        let processor = self.sys.processor.clone();
        let app = App::new().configure(move |cfg| configure_app(cfg, config, db, processor));
        let service = test::init_service(app).await;
        match test::try_call_service(&service, req.to_request()).await {
            Ok(res) => {
                let status = res.status();
                let body = test::read_body(res).await;
                (status, String::from_utf8_lossy(&body).into_owned())
            },
            Err(e) => {
                let res = e.error_response();
                let status = res.status();
                let body = res.into_body().try_into_bytes().unwrap_or_default();
                (status, String::from_utf8_lossy(&body).into_owned())
            },
        }
    }

    pub async fn get(&self, token: &str, path: &str) -> (StatusCode, String) {
        self.send(with_token(TestRequest::get().uri(path), token)).await
    }

    pub async fn post_json(&self, token: &str, path: &str, body: Value) -> (StatusCode, String) {
        self.send(with_token(TestRequest::post().uri(path).set_json(body), token)).await
    }

    pub async fn add_product(&self, name: &str, price_cents: i64, stock: i64) -> Product {
        add_product(&self.sys.db, name, price_cents, stock).await
    }

    pub async fn fill_cart(&self, user: &str, product: &Product, quantity: i64) {
        let line = CartLine { product_id: product.id, variant: None, quantity };
        self.sys.carts.upsert_line(user, line).await.expect("Error adding to cart");
    }

    pub async fn open_session(&self, user: &str) -> CheckoutSession {
        let request = CheckoutRequest { shipping_info: shipping_info(), coupon_id: None, coupon_code: None };
        self.sys.checkout.create_session(user, request).await.expect("Error creating checkout session")
    }
}

pub fn with_token(req: TestRequest, token: &str) -> TestRequest {
    if token.is_empty() {
        req
    } else {
        req.insert_header(("Authorization", token))
    }
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON. {e}\n{body}"))
}
