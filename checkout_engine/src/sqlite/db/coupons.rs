use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{
        ConversionError,
        Coupon,
        CouponKind,
        CouponRedemption,
        CouponScope,
        CouponScopeType,
        CouponSnapshot,
        Money,
        NewCoupon,
        RedemptionCounts,
    },
    traits::{CouponClaimFailure, CouponFinalization, CouponQueryFilter, Pagination, StoreError},
};

/// The flat table representation of a coupon. The scope and kind columns are folded back into their enums by
/// `TryFrom`, which is where malformed rows are caught.
#[derive(Debug, FromRow)]
struct CouponRow {
    id: i64,
    code: String,
    scope: String,
    assigned_to: Option<String>,
    kind: String,
    percentage: Option<i64>,
    max_deduction: Option<Money>,
    gift_product_id: Option<i64>,
    gift_qty: Option<i64>,
    threshold: Option<Money>,
    start_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    used: bool,
    used_at: Option<DateTime<Utc>>,
    max_redemptions: Option<i64>,
    per_user_limit: i64,
    source_coupon_id: Option<i64>,
    note: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = ConversionError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let missing = |field: &str| ConversionError(format!("Coupon #{} is missing {field}", row.id));
        let kind = match row.kind.as_str() {
            "percentage" => CouponKind::Percentage {
                percentage: row.percentage.ok_or_else(|| missing("percentage"))?,
                max_deduction: row.max_deduction,
            },
            "free_gift" => CouponKind::FreeGift {
                gift_product_id: row.gift_product_id.ok_or_else(|| missing("gift_product_id"))?,
                gift_qty: row.gift_qty.ok_or_else(|| missing("gift_qty"))?,
                threshold: row.threshold.ok_or_else(|| missing("threshold"))?,
            },
            k => return Err(ConversionError(format!("Coupon #{} has an unknown kind: {k}", row.id))),
        };
        let scope = match row.scope.parse::<CouponScopeType>()? {
            CouponScopeType::User => CouponScope::User {
                assigned_to: row.assigned_to.clone().ok_or_else(|| missing("assigned_to"))?,
                used: row.used,
            },
            CouponScopeType::Global => {
                CouponScope::Global { max_redemptions: row.max_redemptions, per_user_limit: row.per_user_limit }
            },
        };
        Ok(Coupon {
            id: row.id,
            code: row.code,
            scope,
            kind,
            start_at: row.start_at,
            expires_at: row.expires_at,
            used_at: row.used_at,
            source_coupon_id: row.source_coupon_id,
            note: row.note,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_coupon(row: CouponRow) -> Result<Coupon, StoreError> {
    Coupon::try_from(row).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn into_coupon_opt(row: Option<CouponRow>) -> Result<Option<Coupon>, StoreError> {
    row.map(into_coupon).transpose()
}

pub async fn insert_coupon(coupon: NewCoupon, conn: &mut SqliteConnection) -> Result<Coupon, StoreError> {
    let (scope, assigned_to, max_redemptions, per_user_limit) = match coupon.scope {
        CouponScope::User { assigned_to, .. } => ("user", Some(assigned_to), None, 1),
        CouponScope::Global { max_redemptions, per_user_limit } => ("global", None, max_redemptions, per_user_limit),
    };
    let (percentage, max_deduction, gift_product_id, gift_qty, threshold) = match coupon.kind {
        CouponKind::Percentage { percentage, max_deduction } => (Some(percentage), max_deduction, None, None, None),
        CouponKind::FreeGift { gift_product_id, gift_qty, threshold } => {
            (None, None, Some(gift_product_id), Some(gift_qty), Some(threshold))
        },
    };
    let kind = if percentage.is_some() { "percentage" } else { "free_gift" };
    let row: CouponRow = sqlx::query_as(
        r#"
            INSERT INTO coupons (
                code,
                scope,
                assigned_to,
                kind,
                percentage,
                max_deduction,
                gift_product_id,
                gift_qty,
                threshold,
                start_at,
                expires_at,
                max_redemptions,
                per_user_limit,
                source_coupon_id,
                note,
                created_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *;
        "#,
    )
    .bind(coupon.code)
    .bind(scope)
    .bind(assigned_to)
    .bind(kind)
    .bind(percentage)
    .bind(max_deduction)
    .bind(gift_product_id)
    .bind(gift_qty)
    .bind(threshold)
    .bind(coupon.start_at)
    .bind(coupon.expires_at)
    .bind(max_redemptions)
    .bind(per_user_limit)
    .bind(coupon.source_coupon_id)
    .bind(coupon.note)
    .bind(coupon.created_by)
    .fetch_one(conn)
    .await?;
    into_coupon(row)
}

pub async fn fetch_coupon(coupon_id: i64, conn: &mut SqliteConnection) -> Result<Option<Coupon>, StoreError> {
    let row = sqlx::query_as("SELECT * FROM coupons WHERE id = $1").bind(coupon_id).fetch_optional(conn).await?;
    into_coupon_opt(row)
}

pub async fn fetch_user_coupon_by_code(
    user_id: &str,
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Coupon>, StoreError> {
    let row = sqlx::query_as("SELECT * FROM coupons WHERE scope = 'user' AND code = $1 AND assigned_to = $2")
        .bind(code)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    into_coupon_opt(row)
}

pub async fn fetch_global_coupon_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, StoreError> {
    let row = sqlx::query_as("SELECT * FROM coupons WHERE scope = 'global' AND code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await?;
    into_coupon_opt(row)
}

pub async fn fetch_claimed_copy(
    user_id: &str,
    global_coupon_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Coupon>, StoreError> {
    let row = sqlx::query_as(
        r#"
            SELECT * FROM coupons
            WHERE scope = 'user' AND assigned_to = $1 AND source_coupon_id = $2
            ORDER BY id DESC LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(global_coupon_id)
    .fetch_optional(conn)
    .await?;
    into_coupon_opt(row)
}

/// Counts redemptions of a coupon in total, and by the given user.
pub async fn redemption_counts(
    coupon_id: i64,
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<RedemptionCounts, sqlx::Error> {
    let (total, for_user): (i64, i64) = sqlx::query_as(
        r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN user_id = $2 THEN 1 ELSE 0 END), 0)
            FROM coupon_redemptions WHERE coupon_id = $1
        "#,
    )
    .bind(coupon_id)
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(RedemptionCounts { total, for_user })
}

pub async fn fetch_redemption(
    coupon_id: i64,
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<CouponRedemption>, sqlx::Error> {
    let redemption = sqlx::query_as("SELECT * FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2")
        .bind(coupon_id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(redemption)
}

/// Appends a redemption to the ledger. Returns `None` if the user has already redeemed this coupon, in which case the
/// ledger is unchanged.
pub async fn insert_redemption(
    coupon_id: i64,
    user_id: &str,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CouponRedemption>, sqlx::Error> {
    let redemption = sqlx::query_as(
        r#"
            INSERT INTO coupon_redemptions (coupon_id, user_id, order_id) VALUES ($1, $2, $3)
            ON CONFLICT (coupon_id, user_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(coupon_id)
    .bind(user_id)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(redemption)
}

/// Flips a personal coupon to used. Returns false if it was already used, belongs to someone else, or is gone.
pub async fn mark_user_coupon_used(
    coupon_id: i64,
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE coupons SET used = 1, used_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND scope = 'user' AND assigned_to = $2 AND used = 0
        "#,
    )
    .bind(coupon_id)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Claims the coupon on a freshly inserted order. Must run in the transaction that inserted the order, after the
/// insert, so that SQLite's write lock is already held and the cap checks cannot race another claim.
///
/// Returns [`CouponFinalization::Withdrawn`] if the coupon can no longer be claimed. The caller must then roll back.
pub async fn claim_for_order(
    snapshot: &CouponSnapshot,
    user_id: &str,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<CouponFinalization, StoreError> {
    let coupon_id = snapshot.coupon_id;
    let result = match snapshot.scope {
        CouponScopeType::User => {
            if mark_user_coupon_used(coupon_id, user_id, &mut *conn).await? {
                CouponFinalization::MarkedUsed
            } else if fetch_coupon(coupon_id, &mut *conn).await?.is_none() {
                CouponFinalization::Withdrawn(CouponClaimFailure::Gone)
            } else {
                CouponFinalization::Withdrawn(CouponClaimFailure::AlreadyUsed)
            }
        },
        CouponScopeType::Global => claim_global(coupon_id, user_id, order_id, conn).await?,
    };
    debug!("🗃️ Coupon #{coupon_id} claim for order #{order_id}: {result:?}");
    Ok(result)
}

async fn claim_global(
    coupon_id: i64,
    user_id: &str,
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<CouponFinalization, StoreError> {
    let Some(coupon) = fetch_coupon(coupon_id, &mut *conn).await? else {
        return Ok(CouponFinalization::Withdrawn(CouponClaimFailure::Gone));
    };
    let CouponScope::Global { max_redemptions, .. } = coupon.scope else {
        return Ok(CouponFinalization::Withdrawn(CouponClaimFailure::Gone));
    };
    if let Some(copy) = fetch_claimed_copy(user_id, coupon_id, &mut *conn).await? {
        if copy.is_used() {
            return Ok(CouponFinalization::Withdrawn(CouponClaimFailure::PerUserLimitReached));
        }
    }
    let counts = redemption_counts(coupon_id, user_id, &mut *conn).await?;
    if counts.for_user > 0 {
        return Ok(CouponFinalization::Withdrawn(CouponClaimFailure::PerUserLimitReached));
    }
    if max_redemptions.map(|max| counts.total >= max).unwrap_or(false) {
        return Ok(CouponFinalization::Withdrawn(CouponClaimFailure::RedemptionCapReached));
    }
    match insert_redemption(coupon_id, user_id, order_id, conn).await? {
        Some(_) => Ok(CouponFinalization::Redeemed),
        None => Ok(CouponFinalization::Withdrawn(CouponClaimFailure::PerUserLimitReached)),
    }
}

/// Fetches coupons according to the filter, newest first.
///
/// Timestamps are compared through `julianday` since rows written by SQLite defaults and rows bound from chrono use
/// different text formats.
pub async fn search_coupons(
    filter: CouponQueryFilter,
    pagination: Pagination,
    conn: &mut SqliteConnection,
) -> Result<Vec<Coupon>, StoreError> {
    let mut builder = QueryBuilder::new("SELECT * FROM coupons ");
    if !filter.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(scope) = filter.scope {
        where_clause.push("scope = ");
        where_clause.push_bind_unseparated(scope.to_string());
    }
    if let Some(user_id) = filter.assigned_to {
        where_clause.push("assigned_to = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(code) = filter.code {
        where_clause.push("code LIKE ");
        where_clause.push_bind_unseparated(format!("%{}%", code.trim().to_uppercase()));
    }
    if let Some(now) = filter.valid_at {
        where_clause.push("used = 0");
        where_clause.push("julianday(expires_at) > julianday(");
        where_clause.push_bind_unseparated(now);
        where_clause.push_unseparated(")");
        where_clause.push("(start_at IS NULL OR julianday(start_at) <= julianday(");
        where_clause.push_bind_unseparated(now);
        where_clause.push_unseparated("))");
    }
    builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    builder.push_bind(i64::from(pagination.limit));
    builder.push(" OFFSET ");
    builder.push_bind(pagination.offset());
    trace!("🗃️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<CouponRow>().fetch_all(conn).await?;
    rows.into_iter().map(into_coupon).collect()
}

pub async fn delete_coupon(coupon_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(coupon_id).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
