use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{NewOrder, Order},
    traits::{
        CouponClaimFailure,
        CouponFinalization,
        InsertOrderResult,
        OrderManagement,
        StepResult,
        StockLineResult,
        StoreError,
    },
};

/// What happened to each settlement step in one run of the coordinator.
///
/// A `None` step was either applied by an earlier run or failed in this one; failures are listed in `errors`. The
/// coupon is claimed when the order is inserted, so `coupon` is only set by the run that created the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub order_id: i64,
    pub stock: Option<Vec<StockLineResult>>,
    pub cart_lines_cleared: Option<u64>,
    pub coupon: Option<CouponFinalization>,
    pub errors: Vec<String>,
}

impl SettlementReport {
    fn new(order_id: i64) -> Self {
        Self { order_id, stock: None, cart_lines_cleared: None, coupon: None, errors: Vec::new() }
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed_stock_lines(&self) -> Vec<&StockLineResult> {
        self.stock.iter().flatten().filter(|l| !l.applied).collect()
    }
}

#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// The order was created by this run, and the report covers the remaining steps
    Settled { order: Order, report: SettlementReport },
    /// Another delivery inserted the order first. Nothing was done.
    AlreadyExists(Order),
    /// The order's coupon could not be claimed, so the order was not saved. It must be re-priced without the coupon.
    CouponUnavailable(CouponClaimFailure),
}

/// Persists a paid order and applies its side effects: coupon, stock and cart.
///
/// Inserting the order is the idempotency boundary, and the coupon is claimed atomically with it. The remaining steps
/// are each guarded by a progress flag on the order, so [`SettlementCoordinator::resume`] can finish a settlement that was interrupted part-way through. Steps
/// are never rolled back.
pub struct SettlementCoordinator<B> {
    db: B,
}

impl<B> Debug for SettlementCoordinator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementCoordinator")
    }
}

impl<B> SettlementCoordinator<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> SettlementCoordinator<B>
where B: OrderManagement
{
    /// Inserts the order and runs every settlement step. An error means the order was not inserted and the whole
    /// settlement can be retried.
    pub async fn settle(&self, order: NewOrder) -> Result<SettlementOutcome, StoreError> {
        let payment_id = order.payment_info.external_payment_id.clone();
        match self.db.insert_order(order).await? {
            InsertOrderResult::AlreadyExists(existing) => {
                info!("📦️ Payment {payment_id} is already recorded as order #{}. Nothing to do.", existing.id);
                Ok(SettlementOutcome::AlreadyExists(existing))
            },
            InsertOrderResult::CouponUnavailable(reason) => {
                warn!("📦️ The coupon for payment {payment_id} could not be claimed ({reason}). No order was saved.");
                Ok(SettlementOutcome::CouponUnavailable(reason))
            },
            InsertOrderResult::Inserted { order, coupon } => {
                info!("📦️ Order #{} created for payment {payment_id}. Total {}", order.id, order.total_amount);
                match &coupon {
                    CouponFinalization::NoCoupon => trace!("📦️ Order #{} has no coupon", order.id),
                    CouponFinalization::MarkedUsed => debug!("📦️ Personal coupon for order #{} marked used", order.id),
                    CouponFinalization::Redeemed => {
                        debug!("📦️ Global coupon redemption recorded for order #{}", order.id)
                    },
                    CouponFinalization::Withdrawn(reason) => {
                        warn!("📦️ Order #{} was saved without its coupon ({reason})", order.id)
                    },
                }
                let mut report = self.run_steps(order.id).await;
                report.coupon = Some(coupon);
                Ok(SettlementOutcome::Settled { order, report })
            },
        }
    }

    /// Runs whichever settlement steps have not been applied to an existing order yet.
    pub async fn resume(&self, order: &Order) -> SettlementReport {
        info!("📦️ Resuming settlement of order #{}. Progress so far: {:?}", order.id, order.settlement);
        self.run_steps(order.id).await
    }

    async fn run_steps(&self, order_id: i64) -> SettlementReport {
        let mut report = SettlementReport::new(order_id);
        match self.db.apply_stock_for_order(order_id).await {
            Ok(StepResult::Applied(lines)) => {
                for line in lines.iter().filter(|l| !l.applied) {
                    match &line.error {
                        Some(e) => error!(
                            "📦️ Stock for {} × product #{} on order #{order_id} could not be decremented ({e}). The \
                             other lines were applied; this one needs manual attention.",
                            line.quantity, line.product_id
                        ),
                        None => error!(
                            "📦️ Insufficient stock to fulfil {} × product #{} for order #{order_id}. The order \
                             stands; this line needs manual attention.",
                            line.quantity, line.product_id
                        ),
                    }
                }
                debug!("📦️ Stock applied for order #{order_id}");
                report.stock = Some(lines);
            },
            Ok(StepResult::AlreadyApplied) => trace!("📦️ Stock was already applied for order #{order_id}"),
            Err(e) => {
                error!("📦️ Could not apply stock for order #{order_id}. {e}");
                report.errors.push(format!("stock: {e}"));
            },
        }
        match self.db.clear_cart_for_order(order_id).await {
            Ok(StepResult::Applied(n)) => {
                debug!("📦️ Cleared {n} cart lines for order #{order_id}");
                report.cart_lines_cleared = Some(n);
            },
            Ok(StepResult::AlreadyApplied) => trace!("📦️ Cart was already cleared for order #{order_id}"),
            Err(e) => {
                error!("📦️ Could not clear the cart for order #{order_id}. {e}");
                report.errors.push(format!("cart: {e}"));
            },
        }
        report
    }
}
