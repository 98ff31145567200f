use std::time::Duration;

use storefront_common::Secret;

use super::{
    fake_processor::FakeProcessor,
    fixtures::{TEST_NOTIFICATION_URL, TEST_SIGNATURE_KEY},
    prepare_env::{prepare_test_env, random_db_path},
};
use crate::{
    CartApi,
    CheckoutApi,
    CheckoutConfig,
    CouponApi,
    OrderApi,
    PaymentReconciler,
    ReconcilerConfig,
    SqliteDatabase,
};

/// A complete engine wired to a fresh database and an in-memory processor.
pub struct TestSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub processor: FakeProcessor,
    pub checkout: CheckoutApi<SqliteDatabase, FakeProcessor>,
    pub reconciler: PaymentReconciler<SqliteDatabase, FakeProcessor>,
    pub coupons: CouponApi<SqliteDatabase>,
    pub carts: CartApi<SqliteDatabase>,
    pub orders: OrderApi<SqliteDatabase>,
}

impl std::fmt::Debug for TestSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestSystem ({})", self.db_path)
    }
}

pub fn test_reconciler_config() -> ReconcilerConfig {
    ReconcilerConfig {
        signature_key: Secret::new(TEST_SIGNATURE_KEY.to_string()),
        notification_url: TEST_NOTIFICATION_URL.to_string(),
        retry_backoff: Duration::from_millis(5),
        ..Default::default()
    }
}

impl TestSystem {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 5).await.expect("Error creating connection to database");
        let processor = FakeProcessor::new();
        let checkout = CheckoutApi::new(db.clone(), processor.clone(), CheckoutConfig::default());
        let reconciler = PaymentReconciler::new(db.clone(), processor.clone(), test_reconciler_config());
        Self {
            db_path,
            coupons: CouponApi::new(db.clone()),
            carts: CartApi::new(db.clone()),
            orders: OrderApi::new(db.clone()),
            db,
            processor,
            checkout,
            reconciler,
        }
    }
}
