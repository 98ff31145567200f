//! Storefront Checkout Engine
//!
//! The order finalization and payment reconciliation core of the storefront. It prices carts, resolves coupons,
//! opens hosted payment sessions and, when the payment processor confirms a payment, turns the payment into exactly
//! one settled order. It is provider-agnostic: the processor sits behind the [`PaymentProcessor`] trait.
//!
//! The library is divided into:
//! 1. Storage contracts ([`traits`]) and the SQLite backend ([`SqliteDatabase`]). The data types shared by all
//!    backends live in [`db_types`].
//! 2. Pure pricing ([`pricing`]).
//! 3. The public API ([`ce_api`]), generic over the storage traits.
pub mod ce_api;
pub mod db_types;
pub mod helpers;
pub mod pricing;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ce_api::{
    cart_api::{CartApi, CartView, CartViewLine},
    checkout_api::{CheckoutApi, CheckoutConfig},
    coupon_api::CouponApi,
    coupon_objects,
    errors::{CartApiError, CheckoutError, CouponApiError, CouponRejection, OrderApiError, ReconcileError},
    order_api::OrderApi,
    order_objects,
    payment_objects,
    reconciliation_api::{PaymentReconciler, ReconcileOutcome, ReconcileState, ReconcilerConfig, RejectReason},
    settlement::{SettlementCoordinator, SettlementOutcome, SettlementReport},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{PaymentProcessor, ProcessorError, StoreError, StorefrontDatabase};
