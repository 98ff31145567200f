//! # Storage and collaborator contracts
//!
//! This module defines the behaviour that storage backends and external collaborators must provide for the checkout
//! engine to work. The engine APIs in [`crate::ce_api`] are generic over these traits, so a backend (currently SQLite)
//! or a payment processor (currently Square, wired up in the server crate) can be swapped out freely.
//!
//! * [`ProductCatalog`] reads products and performs atomic stock decrements.
//! * [`CartManagement`] manages the single cart each user owns.
//! * [`CouponManagement`] stores coupons and exposes the append-only redemption ledger.
//! * [`OrderManagement`] persists orders and applies each settlement step exactly once.
//! * [`StorefrontDatabase`] bundles the above for backends that provide all of them.
//! * [`PaymentProcessor`] is the boundary to the hosted checkout provider.
mod cart_management;
mod coupon_management;
mod data_objects;
mod order_management;
mod payment_processor;
mod product_catalog;
mod storefront_database;

pub use cart_management::CartManagement;
pub use coupon_management::{CouponManagement, CouponQueryFilter, Pagination};
pub use data_objects::{
    CouponClaimFailure,
    CouponFinalization,
    ExternalOrder,
    InsertOrderResult,
    LineKind,
    PaymentLinkResult,
    ProcessorCheckout,
    ProcessorDiscount,
    ProcessorLine,
    StepResult,
    StockLineResult,
    StockUpdate,
};
pub use order_management::OrderManagement;
pub use payment_processor::{PaymentProcessor, ProcessorError};
pub use product_catalog::ProductCatalog;
pub use storefront_database::{StoreError, StorefrontDatabase};
