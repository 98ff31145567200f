//! `SqliteDatabase` is the SQLite implementation of every storage trait in [`crate::traits`].
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::db::{carts, coupons, db_url, new_pool, orders, orders::SettlementFlag, products};
use crate::{
    db_types::{
        CartLine,
        Coupon,
        CouponRedemption,
        NewCoupon,
        NewOrder,
        NewProduct,
        Order,
        Product,
        RedemptionCounts,
    },
    traits::{
        CartManagement,
        CouponFinalization,
        CouponManagement,
        CouponQueryFilter,
        InsertOrderResult,
        OrderManagement,
        Pagination,
        ProductCatalog,
        StepResult,
        StockLineResult,
        StockUpdate,
        StoreError,
        StorefrontDatabase,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `SFS_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Runs any outstanding migrations against the database.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_order_or_not_found(&self, order_id: i64) -> Result<Order, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(order_id, &mut conn).await?.ok_or(StoreError::NotFound(format!("Order #{order_id}")))
    }
}

impl StorefrontDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl ProductCatalog for SqliteDatabase {
    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_product(product_id, &mut conn).await?)
    }

    async fn fetch_products(&self, product_ids: &[i64]) -> Result<Vec<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_products(product_ids, &mut conn).await?)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::insert_product(product, &mut conn).await?;
        debug!("🗃️ Product #{} ({}) added to the catalog", product.id, product.name);
        Ok(product)
    }

    async fn decrement_stock(&self, product_id: i64, quantity: i64) -> Result<StockUpdate, StoreError> {
        let mut conn = self.pool.acquire().await?;
        products::decrement_stock(product_id, quantity, &mut conn).await
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carts::fetch_cart(user_id, &mut conn).await?)
    }

    async fn upsert_cart_line(&self, user_id: &str, line: CartLine) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        carts::upsert_line(user_id, line, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_cart_line(
        &self,
        user_id: &str,
        product_id: i64,
        variant: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carts::remove_line(user_id, product_id, variant, &mut conn).await?)
    }

    async fn clear_cart(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carts::clear_cart(user_id, &mut conn).await?)
    }
}

impl CouponManagement for SqliteDatabase {
    async fn insert_coupon(&self, coupon: NewCoupon) -> Result<Coupon, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let coupon = coupons::insert_coupon(coupon, &mut conn).await?;
        debug!("🗃️ Coupon #{} [{}] saved", coupon.id, coupon.code);
        Ok(coupon)
    }

    async fn fetch_coupon(&self, coupon_id: i64) -> Result<Option<Coupon>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_coupon(coupon_id, &mut conn).await
    }

    async fn fetch_user_coupon_by_code(&self, user_id: &str, code: &str) -> Result<Option<Coupon>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_user_coupon_by_code(user_id, code, &mut conn).await
    }

    async fn fetch_global_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_global_coupon_by_code(code, &mut conn).await
    }

    async fn fetch_claimed_copy(&self, user_id: &str, global_coupon_id: i64) -> Result<Option<Coupon>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_claimed_copy(user_id, global_coupon_id, &mut conn).await
    }

    async fn redemption_counts(&self, coupon_id: i64, user_id: &str) -> Result<RedemptionCounts, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(coupons::redemption_counts(coupon_id, user_id, &mut conn).await?)
    }

    async fn fetch_redemption(&self, coupon_id: i64, user_id: &str) -> Result<Option<CouponRedemption>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(coupons::fetch_redemption(coupon_id, user_id, &mut conn).await?)
    }

    async fn search_coupons(
        &self,
        filter: CouponQueryFilter,
        pagination: Pagination,
    ) -> Result<Vec<Coupon>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        coupons::search_coupons(filter, pagination, &mut conn).await
    }

    async fn delete_coupon(&self, coupon_id: i64) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(coupons::delete_coupon(coupon_id, &mut conn).await?)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(order_id, &mut conn).await
    }

    async fn fetch_order_by_payment_id(&self, external_payment_id: &str) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_payment_id(external_payment_id, &mut conn).await
    }

    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_user(user_id, &mut conn).await
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, StoreError> {
        let payment_id = order.payment_info.external_payment_id.clone();
        let coupon = order.coupon.clone();
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::insert_order(order, &mut tx).await? else {
            let existing = orders::fetch_order_by_payment_id(&payment_id, &mut tx)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("Order for payment {payment_id}")))?;
            tx.rollback().await?;
            return Ok(InsertOrderResult::AlreadyExists(existing));
        };
        let claim = match &coupon {
            Some(snapshot) => coupons::claim_for_order(snapshot, &order.user_id, order.id, &mut tx).await?,
            None => CouponFinalization::NoCoupon,
        };
        if let CouponFinalization::Withdrawn(reason) = claim {
            tx.rollback().await?;
            info!("🗃️ Order for payment {payment_id} was not saved. Its coupon could not be claimed: {reason}");
            return Ok(InsertOrderResult::CouponUnavailable(reason));
        }
        tx.commit().await?;
        debug!("🗃️ Order #{} for payment {payment_id} has been saved. Coupon: {claim:?}", order.id);
        Ok(InsertOrderResult::Inserted { order, coupon: claim })
    }

    async fn apply_stock_for_order(&self, order_id: i64) -> Result<StepResult<Vec<StockLineResult>>, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !orders::claim_settlement_step(order_id, SettlementFlag::StockApplied, &mut tx).await? {
            tx.rollback().await?;
            // Distinguish a missing order from one that has already been processed
            self.fetch_order_or_not_found(order_id).await?;
            return Ok(StepResult::AlreadyApplied);
        }
        let order = orders::fetch_order_by_id(order_id, &mut tx)
            .await?
            .ok_or(StoreError::NotFound(format!("Order #{order_id}")))?;
        let mut results = Vec::with_capacity(order.items.len());
        for item in order.items.iter().filter(|i| !i.is_gift) {
            let Some(product_id) = item.product_id else {
                warn!("🗃️ Order #{order_id} has a line ({}) with no product id. Stock is not tracked for it.", item.name);
                continue;
            };
            // A failed statement leaves the transaction open, so the other lines still commit
            let (applied, error) = match products::decrement_stock(product_id, item.quantity, &mut tx).await {
                Ok(update) => (matches!(update, StockUpdate::Decremented { .. }), None),
                Err(e) => {
                    warn!("🗃️ Stock for product #{product_id} on order #{order_id} could not be decremented. {e}");
                    (false, Some(e.to_string()))
                },
            };
            results.push(StockLineResult { product_id, quantity: item.quantity, applied, error });
        }
        tx.commit().await?;
        Ok(StepResult::Applied(results))
    }

    async fn clear_cart_for_order(&self, order_id: i64) -> Result<StepResult<u64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        if !orders::claim_settlement_step(order_id, SettlementFlag::CartCleared, &mut tx).await? {
            tx.rollback().await?;
            self.fetch_order_or_not_found(order_id).await?;
            return Ok(StepResult::AlreadyApplied);
        }
        let user_id: String = sqlx::query_scalar("SELECT user_id FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;
        let removed = carts::clear_cart(&user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(StepResult::Applied(removed))
    }
}
