use serde_json::json;

use crate::{
    db_types::{Money, NewProduct, Product, ShippingInfo},
    helpers::sign_webhook,
    traits::ProductCatalog,
};

pub const TEST_SIGNATURE_KEY: &str = "test-signature-key";
pub const TEST_NOTIFICATION_URL: &str = "https://store.example.com/webhooks/square";

pub fn shipping_info() -> ShippingInfo {
    ShippingInfo {
        address: "742 Evergreen Terrace".into(),
        city: "Springfield".into(),
        phone_no: "555-0100".into(),
        zip_code: "49007".into(),
        country: "US".into(),
    }
}

pub async fn add_product<B: ProductCatalog>(db: &B, name: &str, price_cents: i64, stock: i64) -> Product {
    db.insert_product(NewProduct::new(name, Money::from_cents(price_cents), stock))
        .await
        .expect("Error inserting product")
}

/// The body of a `payment.updated` notification.
pub fn payment_event(payment_id: &str, order_id: &str, status: &str, total: Money) -> Vec<u8> {
    json!({
        "merchant_id": "MERCHANT",
        "type": "payment.updated",
        "event_id": format!("evt-{payment_id}-{status}"),
        "created_at": "2024-08-01T12:00:00Z",
        "data": {
            "type": "payment",
            "id": payment_id,
            "object": {
                "payment": {
                    "id": payment_id,
                    "order_id": order_id,
                    "status": status,
                    "total_money": { "amount": total.cents(), "currency": "USD" }
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn completed_payment_event(payment_id: &str, order_id: &str, total: Money) -> Vec<u8> {
    payment_event(payment_id, order_id, "COMPLETED", total)
}

/// Signs a body the way the processor would, using the test key and URL.
pub fn sign(body: &[u8]) -> String {
    sign_webhook(TEST_SIGNATURE_KEY, TEST_NOTIFICATION_URL, body).expect("Error signing webhook")
}
