use std::{collections::HashMap, fmt::Debug};

use log::*;

use crate::{
    ce_api::{
        coupon_api::CouponApi,
        coupon_objects::CouponRef,
        errors::CheckoutError,
        order_objects::{CheckoutRequest, CheckoutSession, SessionMetadata},
    },
    db_types::Product,
    helpers::new_idempotency_key,
    pricing::{price, PriceLine},
    traits::{
        LineKind,
        PaymentProcessor,
        ProcessorCheckout,
        ProcessorDiscount,
        ProcessorLine,
        StorefrontDatabase,
    },
};

/// Settings for the hosted payment page.
#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    /// Where the shopper is sent after paying
    pub redirect_url: Option<String>,
    pub support_email: Option<String>,
}

/// `CheckoutApi` turns a user's cart into a hosted payment session.
///
/// The session carries prices computed from the catalog and a description of the coupon, but nothing in it is trusted
/// later: the payment reconciler re-prices the order from the database when the payment is confirmed.
pub struct CheckoutApi<B, P> {
    db: B,
    processor: P,
    coupons: CouponApi<B>,
    config: CheckoutConfig,
}

impl<B, P> Debug for CheckoutApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, P> CheckoutApi<B, P>
where B: Clone
{
    pub fn new(db: B, processor: P, config: CheckoutConfig) -> Self {
        let coupons = CouponApi::new(db.clone());
        Self { db, processor, coupons, config }
    }
}

impl<B, P> CheckoutApi<B, P>
where
    B: StorefrontDatabase,
    P: PaymentProcessor,
{
    pub async fn create_session(
        &self,
        user_id: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let coupon_ref =
            CouponRef::from_parts(request.coupon_id, request.coupon_code.as_deref()).map_err(CheckoutError::Coupon)?;
        if let Some(field) = request.shipping_info.missing_field() {
            return Err(CheckoutError::InvalidShippingInfo(field.to_string()));
        }
        let lines = self.clamped_cart(user_id).await?;
        if lines.is_empty() {
            debug!("🛒️ {user_id} tried to check out with nothing purchasable in their cart");
            return Err(CheckoutError::EmptyCart);
        }
        let coupon = match &coupon_ref {
            Some(r) => Some(self.coupons.resolve(user_id, r).await?),
            None => None,
        };
        let breakdown = price(&lines, coupon.as_ref().map(|c| &c.kind));
        let metadata = SessionMetadata::new(user_id, request.shipping_info, coupon.clone(), &breakdown)
            .to_metadata()
            .map_err(|e| CheckoutError::DatabaseError(format!("Could not encode session metadata. {e}")))?;
        let mut processor_lines = lines
            .iter()
            .filter_map(|l| l.product_id.map(|id| ProcessorLine::product(id, l.name.clone(), l.unit_price, l.quantity)))
            .collect::<Vec<_>>();
        if !breakdown.shipping_amount.is_zero() {
            processor_lines.push(ProcessorLine::fee(LineKind::Shipping, breakdown.shipping_amount));
        }
        if !breakdown.tax_amount.is_zero() {
            processor_lines.push(ProcessorLine::fee(LineKind::Tax, breakdown.tax_amount));
        }
        let effective_discount = breakdown.effective_discount();
        let discount = match (&coupon, effective_discount.is_zero()) {
            (Some(c), false) => Some(ProcessorDiscount { name: format!("Coupon {}", c.code), amount: effective_discount }),
            _ => None,
        };
        let checkout = ProcessorCheckout {
            idempotency_key: new_idempotency_key(),
            reference_id: user_id.to_string(),
            lines: processor_lines,
            discount,
            metadata,
            redirect_url: self.config.redirect_url.clone(),
            support_email: self.config.support_email.clone(),
        };
        if checkout.expected_total() != breakdown.total_amount {
            error!(
                "🛒️ Processor total {} does not match the computed total {}. This is a bug.",
                checkout.expected_total(),
                breakdown.total_amount
            );
        }
        let link = self.processor.create_payment_link(checkout).await?;
        info!(
            "🛒️ Checkout session {} created for {user_id}. Total {} ({} items, coupon {:?})",
            link.external_order_id,
            breakdown.total_amount,
            breakdown.items.len(),
            coupon.as_ref().map(|c| c.code.as_str())
        );
        Ok(CheckoutSession { url: link.url, external_order_id: link.external_order_id, breakdown })
    }

    /// The cart's lines at catalog prices, with quantities clamped to current stock. Lines for unknown or sold-out
    /// products are dropped.
    async fn clamped_cart(&self, user_id: &str) -> Result<Vec<PriceLine>, CheckoutError> {
        let cart = self.db.fetch_cart(user_id).await?;
        let ids = cart.iter().map(|l| l.product_id).collect::<Vec<_>>();
        let products: HashMap<i64, Product> =
            self.db.fetch_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
        let lines = cart
            .into_iter()
            .filter_map(|line| {
                let Some(product) = products.get(&line.product_id) else {
                    warn!("🛒️ Product #{} in {user_id}'s cart no longer exists. Skipping it.", line.product_id);
                    return None;
                };
                let quantity = line.quantity.min(product.stock);
                if quantity < line.quantity {
                    debug!("🛒️ Clamped product #{} from {} to {quantity} for {user_id}", product.id, line.quantity);
                }
                (quantity > 0).then(|| PriceLine::new(product.id, product.name.clone(), product.price, quantity))
            })
            .collect();
        Ok(lines)
    }
}
