use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Coupon, CouponRedemption, CouponScopeType, NewCoupon, RedemptionCounts},
    traits::StoreError,
};

pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl Pagination {
    /// Checks that `page >= 1` and `1 <= limit <= 50`.
    pub fn new(page: u32, limit: u32) -> Result<Self, String> {
        if page < 1 {
            return Err("Page number must be at least 1".into());
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(format!("Page size must be between 1 and {MAX_PAGE_SIZE}"));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponQueryFilter {
    pub scope: Option<CouponScopeType>,
    pub assigned_to: Option<String>,
    /// Matches coupon codes containing this fragment
    pub code: Option<String>,
    /// If set, only coupons that are unused, started and unexpired at this instant are returned
    pub valid_at: Option<DateTime<Utc>>,
}

impl CouponQueryFilter {
    pub fn with_scope(mut self, scope: CouponScopeType) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_assigned_to<S: Into<String>>(mut self, user_id: S) -> Self {
        self.assigned_to = Some(user_id.into());
        self
    }

    pub fn with_code<S: Into<String>>(mut self, code: S) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn valid_at(mut self, now: DateTime<Utc>) -> Self {
        self.valid_at = Some(now);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_none() && self.assigned_to.is_none() && self.code.is_none() && self.valid_at.is_none()
    }
}

/// Coupon storage and the redemption ledger.
///
/// Coupons are immutable once issued, apart from the `used` flag on personal coupons. Redemptions are append-only;
/// the redemption counts used to enforce caps are always derived from the ledger.
#[allow(async_fn_in_trait)]
pub trait CouponManagement {
    /// Stores a new coupon. Returns [`StoreError::Duplicate`] if `(code, scope, assigned_to)` is already taken.
    async fn insert_coupon(&self, coupon: NewCoupon) -> Result<Coupon, StoreError>;

    async fn fetch_coupon(&self, coupon_id: i64) -> Result<Option<Coupon>, StoreError>;

    /// Fetches the personal coupon with the given (normalized) code assigned to `user_id`, if any.
    async fn fetch_user_coupon_by_code(&self, user_id: &str, code: &str) -> Result<Option<Coupon>, StoreError>;

    async fn fetch_global_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    /// The personal copy `user_id` claimed from the given global coupon, if any.
    async fn fetch_claimed_copy(&self, user_id: &str, global_coupon_id: i64) -> Result<Option<Coupon>, StoreError>;

    async fn redemption_counts(&self, coupon_id: i64, user_id: &str) -> Result<RedemptionCounts, StoreError>;

    async fn fetch_redemption(&self, coupon_id: i64, user_id: &str) -> Result<Option<CouponRedemption>, StoreError>;

    /// Coupons matching the filter, newest first.
    async fn search_coupons(
        &self,
        filter: CouponQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<Coupon>, StoreError>;

    /// Returns true if a coupon was deleted. The redemption ledger is left untouched.
    async fn delete_coupon(&self, coupon_id: i64) -> Result<bool, StoreError>;
}
