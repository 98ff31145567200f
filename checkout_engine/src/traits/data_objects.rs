use std::{collections::HashMap, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::db_types::{Money, Order};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOrderResult {
    /// The order was saved. Its coupon, if any, was claimed in the same transaction.
    Inserted { order: Order, coupon: CouponFinalization },
    /// An order for the same external payment id already exists. The existing order is returned.
    AlreadyExists(Order),
    /// The order's coupon could not be claimed. Nothing was saved.
    CouponUnavailable(CouponClaimFailure),
}

impl InsertOrderResult {
    pub fn order(&self) -> Option<&Order> {
        match self {
            InsertOrderResult::Inserted { order, .. } | InsertOrderResult::AlreadyExists(order) => Some(order),
            InsertOrderResult::CouponUnavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockUpdate {
    Decremented { remaining: i64 },
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLineResult {
    pub product_id: i64,
    pub quantity: i64,
    pub applied: bool,
    /// Set if the decrement failed outright, as opposed to finding too little stock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The outcome of a guarded settlement step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult<T> {
    Applied(T),
    /// The step's progress flag was already set. Nothing was done.
    AlreadyApplied,
}

impl<T> StepResult<T> {
    pub fn was_applied(&self) -> bool {
        matches!(self, StepResult::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponFinalization {
    NoCoupon,
    /// The personal coupon was flipped to used
    MarkedUsed,
    /// A redemption of the global coupon was recorded against this order
    Redeemed,
    /// The coupon could not be claimed when the order was saved, so the order was priced without it
    Withdrawn(CouponClaimFailure),
}

/// Why a coupon could not be claimed for an order at the moment it was saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponClaimFailure {
    /// The coupon has been deleted
    Gone,
    /// The personal coupon has already been used, or is not assigned to this user
    AlreadyUsed,
    /// The user has already redeemed the global coupon, directly or through a claimed copy
    PerUserLimitReached,
    RedemptionCapReached,
}

impl Display for CouponClaimFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponClaimFailure::Gone => write!(f, "the coupon no longer exists"),
            CouponClaimFailure::AlreadyUsed => write!(f, "the personal coupon has already been used"),
            CouponClaimFailure::PerUserLimitReached => write!(f, "the user has already redeemed this coupon"),
            CouponClaimFailure::RedemptionCapReached => write!(f, "the coupon has reached its redemption cap"),
        }
    }
}

//--------------------------------------  Processor objects   ---------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    #[default]
    Product,
    Shipping,
    Tax,
}

impl Display for LineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineKind::Product => write!(f, "product"),
            LineKind::Shipping => write!(f, "shipping"),
            LineKind::Tax => write!(f, "tax"),
        }
    }
}

impl FromStr for LineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(Self::Product),
            "shipping" => Ok(Self::Shipping),
            "tax" => Ok(Self::Tax),
            _ => Err(format!("Unknown line kind: {s}")),
        }
    }
}

/// A line on the processor's side of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorLine {
    pub kind: LineKind,
    pub product_id: Option<i64>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl ProcessorLine {
    pub fn product<S: Into<String>>(product_id: i64, name: S, unit_price: Money, quantity: i64) -> Self {
        Self { kind: LineKind::Product, product_id: Some(product_id), name: name.into(), unit_price, quantity }
    }

    pub fn fee(kind: LineKind, amount: Money) -> Self {
        let name = match kind {
            LineKind::Shipping => "Shipping",
            LineKind::Tax => "Tax",
            LineKind::Product => "Fee",
        };
        Self { kind, product_id: None, name: name.to_string(), unit_price: amount, quantity: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorDiscount {
    pub name: String,
    pub amount: Money,
}

/// Everything a processor needs to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCheckout {
    pub idempotency_key: String,
    /// The user id
    pub reference_id: String,
    pub lines: Vec<ProcessorLine>,
    pub discount: Option<ProcessorDiscount>,
    pub metadata: HashMap<String, String>,
    pub redirect_url: Option<String>,
    pub support_email: Option<String>,
}

impl ProcessorCheckout {
    /// The total the processor is expected to charge.
    pub fn expected_total(&self) -> Money {
        let lines: Money = self.lines.iter().map(|l| l.unit_price * l.quantity).sum();
        lines - self.discount.as_ref().map(|d| d.amount).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkResult {
    pub url: String,
    pub external_order_id: String,
}

/// The processor's canonical record of an order, as retrieved after payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalOrder {
    pub id: String,
    pub reference_id: Option<String>,
    pub lines: Vec<ProcessorLine>,
    pub metadata: HashMap<String, String>,
    pub total: Option<Money>,
}
