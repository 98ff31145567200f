use crate::{
    db_types::{NewOrder, Order},
    traits::{InsertOrderResult, StepResult, StockLineResult, StoreError},
};

/// Order persistence and the individually idempotent settlement steps.
///
/// Each `*_for_order` method flips the corresponding progress flag on the order in the same transaction as the side
/// effect it guards. If the flag is already set, the step is skipped and [`StepResult::AlreadyApplied`] is returned,
/// so any step can be re-run safely after a partial failure.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, StoreError>;

    async fn fetch_order_by_payment_id(&self, external_payment_id: &str) -> Result<Option<Order>, StoreError>;

    /// All orders for the user, newest first.
    async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError>;

    /// Inserts the order unless an order for the same external payment id exists already. This is the idempotency
    /// boundary for payment settlement.
    ///
    /// The order's coupon is claimed in the same transaction: a personal coupon is marked used, and a global coupon
    /// gets a redemption record after its caps are checked. If the claim fails, nothing is saved and
    /// [`InsertOrderResult::CouponUnavailable`] is returned, so the caller can price the order without the coupon.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, StoreError>;

    /// Decrements stock for every non-gift line. Lines with insufficient stock, or whose decrement fails, are
    /// reported as not applied. They do not undo the other lines.
    async fn apply_stock_for_order(&self, order_id: i64) -> Result<StepResult<Vec<StockLineResult>>, StoreError>;

    /// Clears the cart of the order's owner. Returns the number of cart lines removed.
    async fn clear_cart_for_order(&self, order_id: i64) -> Result<StepResult<u64>, StoreError>;
}
