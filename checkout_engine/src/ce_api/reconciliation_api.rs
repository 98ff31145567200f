//! # Payment event reconciliation
//!
//! [`PaymentReconciler`] drives each payment notification through a small state machine:
//!
//! ```text
//! Received -> Verified -> Deduplicated -> OrderRetrieved -> Priced -> Settled
//!     \           \             \               \              \
//!      +-----------+-------------+---------------+--------------+--> Rejected / Ignored / Retryable
//! ```
//!
//! Notifications arrive at least once, possibly out of order and possibly concurrently. The reconciler guarantees that
//! each payment produces at most one order, and that every settlement side effect is applied at most once.
use std::{fmt::Debug, time::Duration};

use log::*;
use serde::Serialize;
use storefront_common::Secret;

use crate::{
    ce_api::{
        coupon_api::CouponApi,
        coupon_objects::ResolvedCoupon,
        errors::{CouponApiError, ReconcileError},
        order_objects::SessionMetadata,
        payment_objects::{PaymentEvent, PaymentObject},
        settlement::{SettlementCoordinator, SettlementOutcome, SettlementReport},
    },
    db_types::{Money, NewOrder, OrderItem, PaymentInfo, ShippingInfo},
    helpers::verify_webhook_signature,
    pricing::{price, PriceLine},
    traits::{CouponFinalization, ExternalOrder, LineKind, PaymentProcessor, StorefrontDatabase},
};

pub const DEFAULT_RETRIEVE_ATTEMPTS: u32 = 3;
pub const DEFAULT_TOTAL_TOLERANCE: Money = Money::from_cents(5);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// The key the processor signs notifications with
    pub signature_key: Secret<String>,
    /// The URL the processor posts notifications to. It is part of the signed payload.
    pub notification_url: String,
    pub retrieve_attempts: u32,
    pub retry_backoff: Duration,
    /// Differences between the processor's total and the re-priced total beyond this are logged
    pub total_tolerance: Money,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            signature_key: Secret::default(),
            notification_url: String::default(),
            retrieve_attempts: DEFAULT_RETRIEVE_ATTEMPTS,
            retry_backoff: Duration::from_millis(250),
            total_tolerance: DEFAULT_TOTAL_TOLERANCE,
        }
    }
}

/// The stages of the reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Received,
    Verified,
    Deduplicated,
    OrderRetrieved,
    Priced,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail")]
pub enum RejectReason {
    BadSignature,
    Malformed(String),
    ExternalOrderUnavailable(String),
}

/// The terminal state of one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// A new order was created and settled
    Settled { order_id: i64, report: SettlementReport },
    /// Not an event that needs processing
    Ignored { reason: String },
    /// The payment has already been fully settled
    Duplicate { order_id: i64 },
    /// The order existed with outstanding settlement steps, which were run now
    Resumed { order_id: i64, report: SettlementReport },
    Rejected { reason: RejectReason },
    /// A transient failure before anything was written. Redelivery will retry the event.
    RetryableFailure { error: String },
    /// The order exists but at least one settlement step failed. Not retried automatically.
    PartialSettlement { order_id: i64, report: SettlementReport },
}

impl ReconcileOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileOutcome::RetryableFailure { .. })
    }

    pub fn is_bad_signature(&self) -> bool {
        matches!(self, ReconcileOutcome::Rejected { reason: RejectReason::BadSignature })
    }
}

impl From<ReconcileError> for ReconcileOutcome {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::BadSignature => ReconcileOutcome::Rejected { reason: RejectReason::BadSignature },
            ReconcileError::Malformed(s) => ReconcileOutcome::Rejected { reason: RejectReason::Malformed(s) },
            ReconcileError::ExternalOrderUnavailable(s) => {
                ReconcileOutcome::Rejected { reason: RejectReason::ExternalOrderUnavailable(s) }
            },
            ReconcileError::Retryable(error) => ReconcileOutcome::RetryableFailure { error },
        }
    }
}

pub struct PaymentReconciler<B, P> {
    db: B,
    processor: P,
    coupons: CouponApi<B>,
    settlement: SettlementCoordinator<B>,
    config: ReconcilerConfig,
}

impl<B, P> Debug for PaymentReconciler<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentReconciler")
    }
}

impl<B, P> PaymentReconciler<B, P>
where B: Clone
{
    pub fn new(db: B, processor: P, config: ReconcilerConfig) -> Self {
        let coupons = CouponApi::new(db.clone());
        let settlement = SettlementCoordinator::new(db.clone());
        Self { db, processor, coupons, settlement, config }
    }
}

impl<B, P> PaymentReconciler<B, P>
where
    B: StorefrontDatabase,
    P: PaymentProcessor,
{
    /// Handles a raw webhook delivery. `body` must be the exact bytes received.
    pub async fn handle_webhook(&self, signature: Option<&str>, body: &[u8]) -> ReconcileOutcome {
        let outcome = match self.process(signature, body).await {
            Ok(outcome) => outcome,
            Err(e) => ReconcileOutcome::from(e),
        };
        match &outcome {
            ReconcileOutcome::Settled { order_id, .. } => info!("🧾️ Payment settled as order #{order_id}"),
            ReconcileOutcome::Ignored { reason } => debug!("🧾️ Event ignored. {reason}"),
            ReconcileOutcome::Duplicate { order_id } => info!("🧾️ Duplicate delivery for order #{order_id}"),
            ReconcileOutcome::Resumed { order_id, .. } => info!("🧾️ Settlement of order #{order_id} completed"),
            ReconcileOutcome::Rejected { reason } => warn!("🧾️ Event rejected. {reason:?}"),
            ReconcileOutcome::RetryableFailure { error } => error!("🧾️ Event could not be processed. {error}"),
            ReconcileOutcome::PartialSettlement { order_id, report } => error!(
                "🧾️ PARTIAL SETTLEMENT of order #{order_id}. Failed steps: {}. Operator attention is required.",
                report.errors.join("; ")
            ),
        }
        outcome
    }

    async fn process(&self, signature: Option<&str>, body: &[u8]) -> Result<ReconcileOutcome, ReconcileError> {
        self.transition(ReconcileState::Received);
        self.verify(signature, body)?;
        self.transition(ReconcileState::Verified);

        let event = PaymentEvent::from_slice(body).map_err(|e| ReconcileError::Malformed(e.to_string()))?;
        let payment = match event.payment() {
            Some(p) if event.is_completed_payment() => p,
            _ => {
                let status = event.payment().map(|p| p.status.as_str()).unwrap_or("n/a");
                let reason = format!("{} event with payment status {status}", event.event_type);
                return Ok(ReconcileOutcome::Ignored { reason });
            },
        };
        let external_order_id =
            payment.order_id.as_deref().ok_or_else(|| ReconcileError::Malformed("Payment has no order id".into()))?;

        if let Some(order) = self.db.fetch_order_by_payment_id(&payment.id).await? {
            if order.is_fully_settled() {
                return Ok(ReconcileOutcome::Duplicate { order_id: order.id });
            }
            let report = self.settlement.resume(&order).await;
            return Ok(if report.is_complete() {
                ReconcileOutcome::Resumed { order_id: order.id, report }
            } else {
                ReconcileOutcome::PartialSettlement { order_id: order.id, report }
            });
        }
        self.transition(ReconcileState::Deduplicated);

        let external = self.retrieve_order(external_order_id).await?;
        self.transition(ReconcileState::OrderRetrieved);

        let new_order = self.reprice(payment, &external, true).await?;
        self.transition(ReconcileState::Priced);

        let mut withdrawn = None;
        let mut settled = self.settlement.settle(new_order).await?;
        if let SettlementOutcome::CouponUnavailable(reason) = settled {
            warn!("🧾️ The coupon for payment {} can no longer be claimed ({reason}). Pricing without it.", payment.id);
            let new_order = self.reprice(payment, &external, false).await?;
            settled = self.settlement.settle(new_order).await?;
            withdrawn = Some(reason);
        }
        let outcome = match settled {
            SettlementOutcome::AlreadyExists(order) => ReconcileOutcome::Duplicate { order_id: order.id },
            SettlementOutcome::CouponUnavailable(reason) => {
                return Err(ReconcileError::Retryable(format!(
                    "Payment {} could not be saved without its coupon ({reason})",
                    payment.id
                )))
            },
            SettlementOutcome::Settled { order, mut report } => {
                if let Some(reason) = withdrawn {
                    report.coupon = Some(CouponFinalization::Withdrawn(reason));
                }
                if report.is_complete() {
                    self.transition(ReconcileState::Settled);
                    ReconcileOutcome::Settled { order_id: order.id, report }
                } else {
                    ReconcileOutcome::PartialSettlement { order_id: order.id, report }
                }
            },
        };
        Ok(outcome)
    }

    fn transition(&self, state: ReconcileState) {
        trace!("🧾️ -> {state:?}");
    }

    fn verify(&self, signature: Option<&str>, body: &[u8]) -> Result<(), ReconcileError> {
        let key = self.config.signature_key.reveal();
        if key.is_empty() {
            error!("🧾️ No webhook signature key has been configured. All notifications will be rejected.");
            return Err(ReconcileError::BadSignature);
        }
        let signature = signature.ok_or(ReconcileError::BadSignature)?;
        if verify_webhook_signature(key, &self.config.notification_url, body, signature) {
            Ok(())
        } else {
            Err(ReconcileError::BadSignature)
        }
    }

    /// Fetches the processor's record of the order. Timeouts and server errors are retried with a linear back-off.
    async fn retrieve_order(&self, external_order_id: &str) -> Result<ExternalOrder, ReconcileError> {
        let attempts = self.config.retrieve_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.processor.retrieve_order(external_order_id).await {
                Ok(order) => return Ok(order),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("🧾️ Attempt {attempt}/{attempts} to retrieve order {external_order_id} failed. {e}");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                },
                Err(e) if e.is_retryable() => {
                    return Err(ReconcileError::Retryable(format!(
                        "Order {external_order_id} could not be retrieved after {attempts} attempts. {e}"
                    )))
                },
                Err(e) => return Err(ReconcileError::ExternalOrderUnavailable(e.to_string())),
            }
        }
    }

    /// Builds the order to persist from trusted state: current catalog prices, quantities from the processor's
    /// record, and the coupon from the session metadata only if it still validates. With `with_coupon` unset the
    /// session's coupon is ignored.
    async fn reprice(
        &self,
        payment: &PaymentObject,
        external: &ExternalOrder,
        with_coupon: bool,
    ) -> Result<NewOrder, ReconcileError> {
        let metadata = self.session_metadata(external)?;
        let user_id = metadata.user_id.clone();

        let mut lines = Vec::with_capacity(external.lines.len());
        for line in external.lines.iter().filter(|l| l.kind == LineKind::Product) {
            if line.quantity < 1 {
                warn!("🧾️ Skipping line '{}' with quantity {} in order {}", line.name, line.quantity, external.id);
                continue;
            }
            let product = match line.product_id {
                Some(id) => self.db.fetch_product(id).await?,
                None => None,
            };
            let price_line = match product {
                Some(p) => PriceLine::new(p.id, p.name, p.price, line.quantity),
                None => {
                    warn!(
                        "🧾️ Line '{}' (product {:?}) of order {} is not in the catalog. Using the processor's price of {}.",
                        line.name, line.product_id, external.id, line.unit_price
                    );
                    PriceLine {
                        product_id: line.product_id,
                        name: line.name.clone(),
                        unit_price: line.unit_price,
                        quantity: line.quantity,
                    }
                },
            };
            lines.push(price_line);
        }
        if lines.is_empty() {
            return Err(ReconcileError::Malformed(format!("Order {} has no product lines", external.id)));
        }

        let coupon = match &metadata.coupon {
            Some(claimed) if with_coupon => self.revalidate_coupon(&user_id, claimed).await?,
            _ => None,
        };
        let breakdown = price(&lines, coupon.as_ref().map(|c| &c.kind));
        if let Some(total) = external.total {
            let diff = total.abs_diff(breakdown.total_amount);
            if diff > self.config.total_tolerance {
                warn!(
                    "🧾️ The processor charged {total} for order {} but current prices give {}. Recording {}.",
                    external.id, breakdown.total_amount, breakdown.total_amount
                );
            }
        }
        let snapshot = coupon.as_ref().and_then(|c| c.snapshot(&breakdown));
        let mut items = breakdown.items.clone();
        if let Some(gift) = breakdown.gift {
            let name = match self.db.fetch_product(gift.product_id).await? {
                Some(p) => p.name,
                None => {
                    warn!("🧾️ Gift product #{} is not in the catalog", gift.product_id);
                    format!("Gift #{}", gift.product_id)
                },
            };
            items.push(OrderItem {
                product_id: Some(gift.product_id),
                name,
                unit_price: Money::default(),
                quantity: gift.quantity,
                line_total: Money::default(),
                is_gift: true,
            });
        }
        Ok(NewOrder {
            user_id,
            shipping_info: metadata.shipping_info,
            items,
            items_price: breakdown.items_price,
            discount_amount: breakdown.discount_amount,
            shipping_amount: breakdown.shipping_amount,
            tax_amount: breakdown.tax_amount,
            total_amount: breakdown.total_amount,
            processor_total: external.total,
            payment_info: PaymentInfo { external_payment_id: payment.id.clone(), status: payment.status.clone() },
            external_order_id: external.id.clone(),
            coupon: snapshot,
        })
    }

    /// Reads the session metadata. If it is unusable, the user is taken from the processor's reference id and the
    /// order is recorded without shipping details or coupon.
    fn session_metadata(&self, external: &ExternalOrder) -> Result<SessionMetadata, ReconcileError> {
        match SessionMetadata::from_metadata(&external.metadata) {
            Ok(m) => Ok(m),
            Err(e) => {
                let user_id = external.reference_id.clone().filter(|s| !s.is_empty()).ok_or_else(|| {
                    ReconcileError::Malformed(format!("Order {} cannot be attributed to a user. {e}", external.id))
                })?;
                warn!("🧾️ Session metadata for order {} is unusable ({e}). Using reference id {user_id}.", external.id);
                Ok(SessionMetadata {
                    user_id,
                    shipping_info: ShippingInfo::default(),
                    coupon: None,
                    pre_subtotal: Money::default(),
                })
            },
        }
    }

    async fn revalidate_coupon(
        &self,
        user_id: &str,
        claimed: &ResolvedCoupon,
    ) -> Result<Option<ResolvedCoupon>, ReconcileError> {
        match self.coupons.revalidate(user_id, claimed).await {
            Ok(c) => Ok(Some(c)),
            Err(CouponApiError::Rejected(reason)) => {
                warn!("🧾️ Coupon [{}] no longer applies for {user_id} ({reason}). Pricing without it.", claimed.code);
                Ok(None)
            },
            Err(e) => Err(ReconcileError::Retryable(e.to_string())),
        }
    }
}
