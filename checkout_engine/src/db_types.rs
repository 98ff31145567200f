use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
pub use storefront_common::Money;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------        Role           ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Admin => write!(f, "Admin"),
        }
    }
}

//--------------------------------------       Product         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub image_url: Option<String>,
}

impl NewProduct {
    pub fn new<S: Into<String>>(name: S, price: Money, stock: i64) -> Self {
        Self { name: name.into(), price, stock, image_url: None }
    }
}

//--------------------------------------       CartLine        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i64,
    pub variant: Option<String>,
    pub quantity: i64,
}

//--------------------------------------     ShippingInfo      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub address: String,
    pub city: String,
    #[serde(alias = "phoneNo")]
    pub phone_no: String,
    #[serde(alias = "zipCode")]
    pub zip_code: String,
    pub country: String,
}

impl ShippingInfo {
    /// Returns the name of the first missing field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("address", &self.address),
            ("city", &self.city),
            ("phone_no", &self.phone_no),
            ("zip_code", &self.zip_code),
            ("country", &self.country),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
    }
}

//--------------------------------------      CouponKind       ---------------------------------------------------------
/// The discount a coupon grants. Coupons carry exactly one of these payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponKind {
    Percentage {
        percentage: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_deduction: Option<Money>,
    },
    FreeGift {
        gift_product_id: i64,
        gift_qty: i64,
        threshold: Money,
    },
}

impl CouponKind {
    pub fn validate(&self) -> Result<(), ConversionError> {
        match self {
            CouponKind::Percentage { percentage, max_deduction } => {
                if !(1..=100).contains(percentage) {
                    return Err(ConversionError(format!("Percentage must be between 1 and 100, not {percentage}")));
                }
                if max_deduction.map(|m| m.is_negative()).unwrap_or(false) {
                    return Err(ConversionError("Maximum deduction cannot be negative".into()));
                }
                Ok(())
            },
            CouponKind::FreeGift { gift_qty, threshold, .. } => {
                if *gift_qty < 1 {
                    return Err(ConversionError(format!("Gift quantity must be at least 1, not {gift_qty}")));
                }
                if threshold.is_negative() {
                    return Err(ConversionError("Gift threshold cannot be negative".into()));
                }
                Ok(())
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CouponKind::Percentage { .. } => "percentage",
            CouponKind::FreeGift { .. } => "free_gift",
        }
    }
}

//--------------------------------------     CouponScope       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CouponScope {
    /// A personal, single-use coupon
    User { assigned_to: String, used: bool },
    /// A coupon anyone can use, within the redemption caps
    Global { max_redemptions: Option<i64>, per_user_limit: i64 },
}

impl CouponScope {
    pub fn scope_type(&self) -> CouponScopeType {
        match self {
            CouponScope::User { .. } => CouponScopeType::User,
            CouponScope::Global { .. } => CouponScopeType::Global,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponScopeType {
    User,
    Global,
}

impl Display for CouponScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponScopeType::User => write!(f, "user"),
            CouponScopeType::Global => write!(f, "global"),
        }
    }
}

impl FromStr for CouponScopeType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "global" => Ok(Self::Global),
            s => Err(ConversionError(format!("Invalid coupon scope: {s}"))),
        }
    }
}

//--------------------------------------        Coupon         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    #[serde(flatten)]
    pub scope: CouponScope,
    pub kind: CouponKind,
    pub start_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub source_coupon_id: Option<i64>,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_started(&self, now: DateTime<Utc>) -> bool {
        self.start_at.map(|s| now >= s).unwrap_or(true)
    }

    pub fn is_used(&self) -> bool {
        matches!(self.scope, CouponScope::User { used: true, .. })
    }

    pub fn assigned_to(&self) -> Option<&str> {
        match &self.scope {
            CouponScope::User { assigned_to, .. } => Some(assigned_to.as_str()),
            CouponScope::Global { .. } => None,
        }
    }

    /// A coupon that could still be applied at `now`, ignoring redemption caps.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired(now) && self.is_started(now)
    }
}

/// Trims and upper-cases a coupon code.
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub scope: CouponScope,
    pub kind: CouponKind,
    pub start_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub source_coupon_id: Option<i64>,
    pub note: Option<String>,
    pub created_by: Option<String>,
}

impl NewCoupon {
    pub fn new(code: &str, scope: CouponScope, kind: CouponKind, expires_at: DateTime<Utc>) -> Self {
        Self {
            code: normalize_coupon_code(code),
            scope,
            kind,
            start_at: None,
            expires_at,
            source_coupon_id: None,
            note: None,
            created_by: None,
        }
    }

    pub fn with_start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_created_by<S: Into<String>>(mut self, created_by: S) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_source_coupon(mut self, id: i64) -> Self {
        self.source_coupon_id = Some(id);
        self
    }
}

//--------------------------------------   CouponRedemption    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CouponRedemption {
    pub id: i64,
    pub coupon_id: i64,
    pub user_id: String,
    pub order_id: i64,
    pub redeemed_at: DateTime<Utc>,
}

/// Redemption counts derived from the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionCounts {
    pub total: i64,
    pub for_user: i64,
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Payment has been confirmed and the order is awaiting fulfilment
    #[default]
    Processing,
    Shipped,
    Delivered,
    Refunding,
    Refunded,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Processing => write!(f, "Processing"),
            OrderStatusType::Shipped => write!(f, "Shipped"),
            OrderStatusType::Delivered => write!(f, "Delivered"),
            OrderStatusType::Refunding => write!(f, "Refunding"),
            OrderStatusType::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(Self::Processing),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Refunding" => Ok(Self::Refunding),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Processing");
            OrderStatusType::Processing
        })
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
pub const CARD_PAYMENT_METHOD: &str = "Card";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub external_payment_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Option<i64>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
    pub is_gift: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftSnapshot {
    pub product_id: i64,
    pub qty: i64,
}

/// The coupon as it was applied to an order. Frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub coupon_id: i64,
    pub code: String,
    pub scope: CouponScopeType,
    pub kind: CouponKind,
    pub discount_applied: Money,
    pub gift: Option<GiftSnapshot>,
}

/// Which settlement side effects have been applied to an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProgress {
    pub stock_applied: bool,
    pub cart_cleared: bool,
    pub coupon_finalized: bool,
}

impl SettlementProgress {
    pub fn is_complete(&self) -> bool {
        self.stock_applied && self.cart_cleared && self.coupon_finalized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: String,
    pub shipping_info: ShippingInfo,
    pub items: Vec<OrderItem>,
    pub items_price: Money,
    pub discount_amount: Money,
    pub shipping_amount: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub processor_total: Option<Money>,
    pub payment_method: String,
    pub payment_info: PaymentInfo,
    pub external_order_id: String,
    pub coupon: Option<CouponSnapshot>,
    pub order_status: OrderStatusType,
    pub settlement: SettlementProgress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_fully_settled(&self) -> bool {
        self.settlement.is_complete()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: String,
    pub shipping_info: ShippingInfo,
    pub items: Vec<OrderItem>,
    pub items_price: Money,
    pub discount_amount: Money,
    pub shipping_amount: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub processor_total: Option<Money>,
    pub payment_info: PaymentInfo,
    pub external_order_id: String,
    pub coupon: Option<CouponSnapshot>,
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn coupon_kind_is_a_tagged_union() {
        let kind: CouponKind = serde_json::from_str(r#"{"type":"percentage","percentage":20,"max_deduction":"10.00"}"#)
            .expect("valid percentage coupon");
        assert_eq!(kind, CouponKind::Percentage { percentage: 20, max_deduction: Some(Money::from_units(10)) });
        let kind: CouponKind =
            serde_json::from_str(r#"{"type":"free_gift","gift_product_id":3,"gift_qty":1,"threshold":"50.00"}"#)
                .expect("valid gift coupon");
        assert_eq!(kind.type_name(), "free_gift");
        assert!(serde_json::from_str::<CouponKind>(r#"{"type":"percentage","gift_product_id":3}"#).is_err());
    }

    #[test]
    fn coupon_kind_validation() {
        assert!(CouponKind::Percentage { percentage: 0, max_deduction: None }.validate().is_err());
        assert!(CouponKind::Percentage { percentage: 101, max_deduction: None }.validate().is_err());
        assert!(CouponKind::Percentage { percentage: 100, max_deduction: None }.validate().is_ok());
        let gift = CouponKind::FreeGift { gift_product_id: 1, gift_qty: 0, threshold: Money::from_units(50) };
        assert!(gift.validate().is_err());
    }

    #[test]
    fn coupon_codes_are_normalized() {
        assert_eq!(normalize_coupon_code("  spring10 "), "SPRING10");
        let c = NewCoupon::new(
            "welcome",
            CouponScope::Global { max_redemptions: None, per_user_limit: 1 },
            CouponKind::Percentage { percentage: 5, max_deduction: None },
            Utc::now(),
        );
        assert_eq!(c.code, "WELCOME");
    }

    #[test]
    fn coupon_liveness() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut coupon = Coupon {
            id: 1,
            code: "X".into(),
            scope: CouponScope::User { assigned_to: "alice".into(), used: false },
            kind: CouponKind::Percentage { percentage: 10, max_deduction: None },
            start_at: Some(now),
            expires_at: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
            used_at: None,
            source_coupon_id: None,
            note: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        assert!(coupon.is_live(now));
        assert!(!coupon.is_started(now - chrono::Duration::seconds(1)));
        assert!(coupon.is_expired(coupon.expires_at));
        coupon.scope = CouponScope::User { assigned_to: "alice".into(), used: true };
        assert!(!coupon.is_live(now));
    }

    #[test]
    fn shipping_info_accepts_camel_case() {
        let info: ShippingInfo = serde_json::from_str(
            r#"{"address":"1 Main St","city":"Springfield","phoneNo":"555-0100","zipCode":"12345","country":"US"}"#,
        )
        .unwrap();
        assert_eq!(info.phone_no, "555-0100");
        assert_eq!(info.missing_field(), None);
        let blank = ShippingInfo { city: " ".into(), ..info };
        assert_eq!(blank.missing_field(), Some("city"));
    }
}
