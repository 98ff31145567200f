use std::fmt::Display;

use checkout_engine::{
    db_types::{normalize_coupon_code, CouponScopeType},
    traits::{CouponQueryFilter, Pagination},
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantParam {
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimCouponRequest {
    pub code: String,
}

fn pagination(page: Option<u32>, limit: Option<u32>) -> Result<Pagination, ServerError> {
    let default = Pagination::default();
    Pagination::new(page.unwrap_or(default.page), limit.unwrap_or(default.limit)).map_err(ServerError::ValidationError)
}

/// Query parameters for a shopper's own coupon list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MyCouponsParams {
    #[serde(default)]
    pub only_valid: bool,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl MyCouponsParams {
    pub fn pagination(&self) -> Result<Pagination, ServerError> {
        pagination(self.page, self.limit)
    }
}

/// Query parameters for the admin coupon search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouponSearchParams {
    #[serde(default)]
    pub scope: Option<CouponScopeType>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl CouponSearchParams {
    pub fn pagination(&self) -> Result<Pagination, ServerError> {
        pagination(self.page, self.limit)
    }

    pub fn filter(&self) -> CouponQueryFilter {
        let mut filter = CouponQueryFilter::default();
        if let Some(scope) = self.scope {
            filter = filter.with_scope(scope);
        }
        if let Some(user) = self.assigned_to.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.with_assigned_to(user.trim());
        }
        if let Some(code) = self.code.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.with_code(normalize_coupon_code(code));
        }
        filter
    }
}
