use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    ce_api::{
        coupon_objects::{CouponRef, CouponValidation, NewGlobalCouponRequest, NewUserCouponRequest, ResolvedCoupon},
        errors::{CouponApiError, CouponRejection},
    },
    db_types::{normalize_coupon_code, Coupon, CouponScope, CouponScopeType, NewCoupon},
    traits::{CouponManagement, CouponQueryFilter, Pagination, StoreError},
};

const MAX_CODE_LENGTH: usize = 32;

/// `CouponApi` resolves coupon references for pricing, and handles coupon administration and self-service.
///
/// Redemption caps are always checked against counts derived from the redemption ledger.
pub struct CouponApi<B> {
    db: B,
}

impl<B> Debug for CouponApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CouponApi")
    }
}

impl<B> CouponApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CouponApi<B>
where B: CouponManagement
{
    pub async fn resolve(&self, user_id: &str, coupon: &CouponRef) -> Result<ResolvedCoupon, CouponApiError> {
        self.resolve_at(user_id, coupon, Utc::now()).await
    }

    /// Looks up and validates a coupon for `user_id` as of `now`.
    ///
    /// * An id must refer to an unused, unexpired personal coupon belonging to the user.
    /// * A code is tried first as one of the user's personal coupons, then as a global coupon. If neither is usable,
    ///   the most specific rejection is returned.
    pub async fn resolve_at(
        &self,
        user_id: &str,
        coupon: &CouponRef,
        now: DateTime<Utc>,
    ) -> Result<ResolvedCoupon, CouponApiError> {
        let result = match coupon {
            CouponRef::Id(id) => {
                let coupon = self.db.fetch_coupon(*id).await?.ok_or(CouponRejection::NotFound)?;
                if coupon.scope.scope_type() != CouponScopeType::User {
                    debug!("🏷️ Coupon #{id} is global and cannot be referenced by id");
                    return Err(CouponRejection::NotFound.into());
                }
                check_personal(&coupon, user_id, now)?;
                ResolvedCoupon::from(&coupon)
            },
            CouponRef::Code(code) => {
                let code = normalize_coupon_code(code);
                let personal = self.db.fetch_user_coupon_by_code(user_id, &code).await?;
                let personal_rejection = match &personal {
                    Some(c) => match check_personal(c, user_id, now) {
                        Ok(()) => return Ok(ResolvedCoupon::from(c)),
                        Err(r) => Some(r),
                    },
                    None => None,
                };
                match self.db.fetch_global_coupon_by_code(&code).await? {
                    Some(global) => {
                        self.check_global(&global, user_id, now, true).await?;
                        ResolvedCoupon::from(&global)
                    },
                    None => return Err(personal_rejection.unwrap_or(CouponRejection::NotFound).into()),
                }
            },
        };
        debug!("🏷️ Coupon [{}] resolved for user {user_id}", result.code);
        Ok(result)
    }

    /// Re-checks a coupon carried in checkout metadata at settlement time. The coupon must still exist with the same
    /// terms, a personal coupon must still be unused and owned by the user, and a global coupon must still be within
    /// its caps. The validity window is not re-checked, since it was checked when the session was created.
    pub async fn revalidate(&self, user_id: &str, claimed: &ResolvedCoupon) -> Result<ResolvedCoupon, CouponApiError> {
        let coupon = self.db.fetch_coupon(claimed.coupon_id).await?.ok_or(CouponRejection::NotFound)?;
        let current = ResolvedCoupon::from(&coupon);
        if current != *claimed {
            warn!(
                "🏷️ Coupon #{} in the session metadata does not match the stored coupon. Stored: {current:?}. Metadata: \
                 {claimed:?}",
                claimed.coupon_id
            );
            return Err(CouponRejection::NotFound.into());
        }
        match &coupon.scope {
            CouponScope::User { assigned_to, used } => {
                if assigned_to != user_id {
                    return Err(CouponRejection::WrongOwner.into());
                }
                if *used {
                    return Err(CouponRejection::AlreadyUsed.into());
                }
            },
            CouponScope::Global { .. } => self.check_global(&coupon, user_id, Utc::now(), false).await?,
        }
        Ok(current)
    }

    async fn check_global(
        &self,
        coupon: &Coupon,
        user_id: &str,
        now: DateTime<Utc>,
        check_window: bool,
    ) -> Result<(), CouponApiError> {
        let CouponScope::Global { max_redemptions, per_user_limit } = coupon.scope else {
            return Err(CouponRejection::NotFound.into());
        };
        if check_window {
            if !coupon.is_started(now) {
                return Err(CouponRejection::NotStarted.into());
            }
            if coupon.is_expired(now) {
                return Err(CouponRejection::Expired.into());
            }
        }
        let counts = self.db.redemption_counts(coupon.id, user_id).await?;
        trace!("🏷️ Global coupon #{} has {} redemptions, {} by {user_id}", coupon.id, counts.total, counts.for_user);
        // The ledger holds at most one redemption per user and coupon
        if counts.for_user >= per_user_limit.min(1) {
            return Err(CouponRejection::PerUserLimitReached.into());
        }
        // A claimed personal copy that has been spent counts against the user too
        if let Some(copy) = self.db.fetch_claimed_copy(user_id, coupon.id).await? {
            if copy.is_used() {
                return Err(CouponRejection::PerUserLimitReached.into());
            }
        }
        if let Some(max) = max_redemptions {
            if counts.total >= max {
                return Err(CouponRejection::RedemptionCapReached.into());
            }
        }
        Ok(())
    }

    //-------------------------------------- Administration --------------------------------------------------------

    pub async fn create_user_coupon(
        &self,
        request: NewUserCouponRequest,
        created_by: &str,
    ) -> Result<Coupon, CouponApiError> {
        let code = validate_code(&request.code)?;
        request.kind.validate().map_err(|e| CouponApiError::InvalidCoupon(e.0))?;
        let expires_at = expiry_from(Utc::now(), request.days_valid)?;
        if request.user_id.trim().is_empty() {
            return Err(CouponApiError::InvalidCoupon("A user id is required".into()));
        }
        if let Some(existing) = self.db.fetch_user_coupon_by_code(&request.user_id, &code).await? {
            let msg = if existing.is_live(Utc::now()) {
                format!("{} already has an active coupon {code}", request.user_id)
            } else {
                format!("{} already had a coupon {code}. Choose another code.", request.user_id)
            };
            return Err(CouponApiError::DuplicateCoupon(msg));
        }
        let scope = CouponScope::User { assigned_to: request.user_id.clone(), used: false };
        let mut coupon = NewCoupon::new(&code, scope, request.kind, expires_at).with_created_by(created_by);
        coupon.note = request.note;
        let coupon = self.db.insert_coupon(coupon).await?;
        info!("🏷️ Personal coupon #{} [{code}] issued to {} by {created_by}", coupon.id, request.user_id);
        Ok(coupon)
    }

    pub async fn create_global_coupon(
        &self,
        request: NewGlobalCouponRequest,
        created_by: &str,
    ) -> Result<Coupon, CouponApiError> {
        let code = validate_code(&request.code)?;
        request.kind.validate().map_err(|e| CouponApiError::InvalidCoupon(e.0))?;
        if request.per_user_limit < 1 {
            return Err(CouponApiError::InvalidCoupon("The per-user limit must be at least 1".into()));
        }
        if request.max_redemptions.map(|m| m < 1).unwrap_or(false) {
            return Err(CouponApiError::InvalidCoupon("The redemption limit must be at least 1".into()));
        }
        let now = Utc::now();
        let valid_from = request.start_at.map(|s| s.max(now)).unwrap_or(now);
        let expires_at = expiry_from(valid_from, request.days_valid)?;
        if self.db.fetch_global_coupon_by_code(&code).await?.is_some() {
            return Err(CouponApiError::DuplicateCoupon(format!("A global coupon {code} already exists")));
        }
        let scope =
            CouponScope::Global { max_redemptions: request.max_redemptions, per_user_limit: request.per_user_limit };
        let mut coupon = NewCoupon::new(&code, scope, request.kind, expires_at).with_created_by(created_by);
        coupon.start_at = request.start_at;
        coupon.note = request.note;
        let coupon = self.db.insert_coupon(coupon).await?;
        info!("🏷️ Global coupon #{} [{code}] created by {created_by}", coupon.id);
        Ok(coupon)
    }

    pub async fn search_coupons(
        &self,
        filter: CouponQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<Coupon>, CouponApiError> {
        Ok(self.db.search_coupons(filter, pagination).await?)
    }

    pub async fn delete_coupon(&self, coupon_id: i64) -> Result<(), CouponApiError> {
        if !self.db.delete_coupon(coupon_id).await? {
            return Err(CouponApiError::CouponNotFound(coupon_id));
        }
        info!("🏷️ Coupon #{coupon_id} deleted");
        Ok(())
    }

    //-------------------------------------- Self-service ---------------------------------------------------------

    pub async fn my_coupons(
        &self,
        user_id: &str,
        only_valid: bool,
        pagination: Pagination,
    ) -> Result<Vec<Coupon>, CouponApiError> {
        let mut filter = CouponQueryFilter::default().with_scope(CouponScopeType::User).with_assigned_to(user_id);
        if only_valid {
            filter = filter.valid_at(Utc::now());
        }
        Ok(self.db.search_coupons(filter, pagination).await?)
    }

    pub async fn my_coupon(&self, user_id: &str, coupon_id: i64) -> Result<Coupon, CouponApiError> {
        match self.db.fetch_coupon(coupon_id).await? {
            Some(c) if c.assigned_to() == Some(user_id) => Ok(c),
            _ => Err(CouponApiError::CouponNotFound(coupon_id)),
        }
    }

    /// Checks whether `code` could be applied by the user right now, without claiming or consuming it.
    pub async fn validate_code(&self, user_id: &str, code: &str) -> Result<CouponValidation, CouponApiError> {
        let coupon_ref = CouponRef::Code(normalize_coupon_code(code));
        let coupon = self.resolve(user_id, &coupon_ref).await?;
        let expires_at = self
            .db
            .fetch_coupon(coupon.coupon_id)
            .await?
            .map(|c| c.expires_at)
            .ok_or(CouponApiError::CouponNotFound(coupon.coupon_id))?;
        Ok(CouponValidation { coupon, expires_at })
    }

    /// Copies a global coupon into a personal coupon for the user. If the user already holds a usable copy, that copy
    /// is returned instead.
    pub async fn claim(&self, user_id: &str, code: &str) -> Result<Coupon, CouponApiError> {
        let code = normalize_coupon_code(code);
        let now = Utc::now();
        let global = self.db.fetch_global_coupon_by_code(&code).await?.ok_or(CouponRejection::NotFound)?;
        if let Some(copy) = self.db.fetch_claimed_copy(user_id, global.id).await? {
            check_personal(&copy, user_id, now)?;
            debug!("🏷️ {user_id} has already claimed [{code}] as coupon #{}", copy.id);
            return Ok(copy);
        }
        self.check_global(&global, user_id, now, true).await?;
        let scope = CouponScope::User { assigned_to: user_id.to_string(), used: false };
        let copy = NewCoupon::new(&code, scope, global.kind.clone(), global.expires_at)
            .with_source_coupon(global.id)
            .with_note(format!("claimed from global {}", global.id))
            .with_created_by(user_id);
        match self.db.insert_coupon(copy).await {
            Ok(coupon) => {
                info!("🏷️ {user_id} claimed global coupon #{} [{code}] as #{}", global.id, coupon.id);
                Ok(coupon)
            },
            Err(StoreError::Duplicate(_)) => {
                // Either a concurrent claim won, or the user already holds a personal coupon with this code
                let existing =
                    self.db.fetch_user_coupon_by_code(user_id, &code).await?.ok_or(CouponRejection::NotFound)?;
                check_personal(&existing, user_id, now)?;
                Ok(existing)
            },
            Err(e) => Err(e.into()),
        }
    }
}

fn check_personal(coupon: &Coupon, user_id: &str, now: DateTime<Utc>) -> Result<(), CouponRejection> {
    if coupon.assigned_to() != Some(user_id) {
        return Err(CouponRejection::WrongOwner);
    }
    if coupon.is_used() {
        return Err(CouponRejection::AlreadyUsed);
    }
    if coupon.is_expired(now) {
        return Err(CouponRejection::Expired);
    }
    if !coupon.is_started(now) {
        return Err(CouponRejection::NotStarted);
    }
    Ok(())
}

fn validate_code(code: &str) -> Result<String, CouponApiError> {
    let code = normalize_coupon_code(code);
    if code.is_empty() || code.len() > MAX_CODE_LENGTH {
        return Err(CouponApiError::InvalidCoupon(format!("Codes must be 1 to {MAX_CODE_LENGTH} characters long")));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(CouponApiError::InvalidCoupon("Codes may only contain letters, digits, '-' and '_'".into()));
    }
    Ok(code)
}

fn expiry_from(start: DateTime<Utc>, days_valid: i64) -> Result<DateTime<Utc>, CouponApiError> {
    if !(1..=3650).contains(&days_valid) {
        return Err(CouponApiError::InvalidCoupon(format!("days_valid must be between 1 and 3650, not {days_valid}")));
    }
    Ok(start + Duration::days(days_valid))
}
