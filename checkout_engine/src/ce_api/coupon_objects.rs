use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ce_api::errors::CouponRejection,
    db_types::{normalize_coupon_code, Coupon, CouponKind, CouponScopeType, CouponSnapshot, GiftSnapshot},
    pricing::PriceBreakdown,
};

/// How a shopper refers to a coupon: by the id of one of their personal coupons, or by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponRef {
    Id(i64),
    Code(String),
}

impl CouponRef {
    /// Builds a reference from the optional id and code a client sent. Blank codes count as absent. Supplying both is
    /// an error.
    pub fn from_parts(id: Option<i64>, code: Option<&str>) -> Result<Option<Self>, CouponRejection> {
        let code = code.map(str::trim).filter(|c| !c.is_empty());
        match (id, code) {
            (Some(_), Some(_)) => Err(CouponRejection::AmbiguousReference),
            (Some(id), None) => Ok(Some(CouponRef::Id(id))),
            (None, Some(code)) => Ok(Some(CouponRef::Code(normalize_coupon_code(code)))),
            (None, None) => Ok(None),
        }
    }
}

/// A coupon that passed validation for a given user. Its terms are copied out of the stored coupon, so they cannot
/// change under a pricing run.
///
/// This is also what travels in the checkout session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCoupon {
    pub coupon_id: i64,
    pub code: String,
    pub scope: CouponScopeType,
    pub kind: CouponKind,
}

impl From<&Coupon> for ResolvedCoupon {
    fn from(coupon: &Coupon) -> Self {
        Self {
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            scope: coupon.scope.scope_type(),
            kind: coupon.kind.clone(),
        }
    }
}

impl ResolvedCoupon {
    /// The snapshot to store on the order, or `None` if the coupon had no effect on this basket (a gift coupon whose
    /// threshold was not met). A coupon with no effect is not consumed.
    pub fn snapshot(&self, breakdown: &PriceBreakdown) -> Option<CouponSnapshot> {
        let gift = breakdown.gift.map(|g| GiftSnapshot { product_id: g.product_id, qty: g.quantity });
        if matches!(self.kind, CouponKind::FreeGift { .. }) && gift.is_none() {
            return None;
        }
        Some(CouponSnapshot {
            coupon_id: self.coupon_id,
            code: self.code.clone(),
            scope: self.scope,
            kind: self.kind.clone(),
            discount_applied: breakdown.effective_discount(),
            gift,
        })
    }
}

/// Admin request to issue a personal coupon to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserCouponRequest {
    pub user_id: String,
    pub code: String,
    pub kind: CouponKind,
    pub days_valid: i64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Admin request to publish a coupon that any user can redeem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGlobalCouponRequest {
    pub code: String,
    pub kind: CouponKind,
    pub days_valid: i64,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_redemptions: Option<i64>,
    #[serde(default = "default_per_user_limit")]
    pub per_user_limit: i64,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_per_user_limit() -> i64 {
    1
}

/// The result of checking a code without claiming it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponValidation {
    pub coupon: ResolvedCoupon,
    pub expires_at: DateTime<Utc>,
}
