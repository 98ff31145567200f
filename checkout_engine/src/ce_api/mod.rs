//! # Checkout engine public API
//!
//! Each API is a thin struct generic over the storage traits it needs, created by handing it a backend:
//!
//! ```rust,ignore
//! use checkout_engine::{CouponApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/store.db", 5).await?;
//! let api = CouponApi::new(db);
//! let coupon = api.resolve("user-42", &CouponRef::Code("SPRING".into())).await?;
//! ```
//!
//! * [`checkout_api`] turns a cart into a hosted payment session.
//! * [`reconciliation_api`] consumes payment notifications and settles paid orders.
//! * [`settlement`] applies the side effects of a paid order, each exactly once.
//! * [`coupon_api`] resolves coupons for pricing, and covers coupon administration and self-service.
//! * [`cart_api`] and [`order_api`] back the shopper-facing cart and order endpoints.
pub mod cart_api;
pub mod checkout_api;
pub mod coupon_api;
pub mod coupon_objects;
pub mod errors;
pub mod order_api;
pub mod order_objects;
pub mod payment_objects;
pub mod reconciliation_api;
pub mod settlement;
