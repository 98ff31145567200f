use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::traits::{ProcessorError, StoreError};

/// The reasons a coupon cannot be applied. These are shown to the shopper, so the messages are phrased for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,
    #[error("This coupon has expired")]
    Expired,
    #[error("This coupon is not active yet")]
    NotStarted,
    #[error("This coupon has already been used")]
    AlreadyUsed,
    #[error("You have already used this coupon")]
    PerUserLimitReached,
    #[error("This coupon has reached its redemption limit")]
    RedemptionCapReached,
    #[error("Provide either a coupon id or a coupon code, not both")]
    AmbiguousReference,
    #[error("This coupon belongs to another user")]
    WrongOwner,
}

#[derive(Debug, Clone, Error)]
pub enum CouponApiError {
    #[error("{0}")]
    Rejected(#[from] CouponRejection),
    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),
    #[error("A coupon with this code already exists: {0}")]
    DuplicateCoupon(String),
    #[error("Coupon #{0} does not exist")]
    CouponNotFound(i64),
    #[error("Invalid query: {0}")]
    QueryError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for CouponApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(s) => CouponApiError::DuplicateCoupon(s),
            e => CouponApiError::DatabaseError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Coupon(CouponRejection),
    #[error("Your cart is empty, or none of its items are in stock")]
    EmptyCart,
    #[error("Shipping information is incomplete: {0} is required")]
    InvalidShippingInfo(String),
    #[error("Could not create a payment session. {0}")]
    Processor(#[from] ProcessorError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for CheckoutError {
    fn from(e: StoreError) -> Self {
        CheckoutError::DatabaseError(e.to_string())
    }
}

impl From<CouponApiError> for CheckoutError {
    fn from(e: CouponApiError) -> Self {
        match e {
            CouponApiError::Rejected(r) => CheckoutError::Coupon(r),
            e => CheckoutError::DatabaseError(e.to_string()),
        }
    }
}

/// Errors raised while driving a payment event through the reconciliation state machine.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("The webhook signature is missing or invalid")]
    BadSignature,
    #[error("The event could not be parsed: {0}")]
    Malformed(String),
    #[error("The external order could not be retrieved: {0}")]
    ExternalOrderUnavailable(String),
    #[error("A temporary failure occurred: {0}")]
    Retryable(String),
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        ReconcileError::Retryable(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CartApiError {
    #[error("Product #{0} does not exist")]
    ProductNotFound(i64),
    #[error("Quantity must be at least 1, not {0}")]
    InvalidQuantity(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for CartApiError {
    fn from(e: StoreError) -> Self {
        CartApiError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderApiError {
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StoreError> for OrderApiError {
    fn from(e: StoreError) -> Self {
        OrderApiError::DatabaseError(e.to_string())
    }
}
