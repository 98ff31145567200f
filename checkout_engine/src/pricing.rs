//! # Pricing
//!
//! Pure price computation for a basket of lines and an optional coupon. Nothing in here touches the database or the
//! network, so the same function is used to quote a checkout session and to re-price an order at settlement time.
//!
//! The rules:
//! * `pre_subtotal` is the sum of `unit_price × quantity` over all lines.
//! * A percentage coupon takes `pre_subtotal × pct / 100` (half-up), capped at `max_deduction`. Each line total is then
//!   scaled by `(pre_subtotal - discount) / pre_subtotal` and rounded to the cent *per line*. The sum of the rounded
//!   lines is `items_price`, which can drift from `pre_subtotal - discount` by a few cents.
//! * A free-gift coupon leaves prices alone and adds a zero-price gift line if `pre_subtotal` reaches the threshold.
//! * Shipping is free when `items_price` exceeds [`FREE_SHIPPING_THRESHOLD`], otherwise it is [`FLAT_SHIPPING_FEE`].
//! * Tax is [`TAX_PERCENT`] of `items_price`, i.e. always charged after the discount.
use serde::{Deserialize, Serialize};

use crate::db_types::{CouponKind, Money, OrderItem};

pub const FREE_SHIPPING_THRESHOLD: Money = Money::from_units(200);
pub const FLAT_SHIPPING_FEE: Money = Money::from_units(5);
pub const TAX_PERCENT: i64 = 15;

/// A line to be priced. Quantities are expected to have been clamped to available stock already.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub product_id: Option<i64>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl PriceLine {
    pub fn new<S: Into<String>>(product_id: i64, name: S, unit_price: Money, quantity: i64) -> Self {
        Self { product_id: Some(product_id), name: name.into(), unit_price, quantity }
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftLine {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// The priced, non-gift lines. `line_total` carries the discounted, rounded amount.
    pub items: Vec<OrderItem>,
    pub gift: Option<GiftLine>,
    pub pre_subtotal: Money,
    /// The nominal discount granted by the coupon, after the cap.
    pub discount_amount: Money,
    pub items_price: Money,
    pub shipping_amount: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
}

impl PriceBreakdown {
    /// The difference between the undiscounted and discounted item totals. This is what the payment processor is
    /// told to take off, so that its total agrees with `total_amount` to the cent.
    pub fn effective_discount(&self) -> Money {
        self.pre_subtotal - self.items_price
    }

    /// Line-level rounding drift: `items_price - (pre_subtotal - discount_amount)`.
    pub fn rounding_drift(&self) -> Money {
        self.items_price - (self.pre_subtotal - self.discount_amount)
    }
}

pub fn price(lines: &[PriceLine], coupon: Option<&CouponKind>) -> PriceBreakdown {
    let pre_subtotal: Money = lines.iter().map(PriceLine::subtotal).sum();
    let discount_amount = match coupon {
        Some(CouponKind::Percentage { percentage, max_deduction }) => {
            let nominal = pre_subtotal.percent_half_up(*percentage);
            match max_deduction {
                Some(cap) => nominal.min(*cap),
                None => nominal,
            }
        },
        _ => Money::default(),
    };
    let discounted = pre_subtotal - discount_amount;
    let items = lines
        .iter()
        .map(|line| {
            let subtotal = line.subtotal();
            let line_total = if pre_subtotal.is_zero() || discount_amount.is_zero() {
                subtotal
            } else {
                subtotal.scale_half_up(discounted.cents(), pre_subtotal.cents())
            };
            OrderItem {
                product_id: line.product_id,
                name: line.name.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                line_total,
                is_gift: false,
            }
        })
        .collect::<Vec<_>>();
    let items_price: Money = items.iter().map(|i| i.line_total).sum();
    let gift = match coupon {
        Some(CouponKind::FreeGift { gift_product_id, gift_qty, threshold }) if pre_subtotal >= *threshold => {
            Some(GiftLine { product_id: *gift_product_id, quantity: *gift_qty })
        },
        _ => None,
    };
    let shipping_amount = shipping_for(items_price);
    let tax_amount = items_price.percent_half_up(TAX_PERCENT);
    let total_amount = items_price + shipping_amount + tax_amount;
    PriceBreakdown {
        items,
        gift,
        pre_subtotal,
        discount_amount,
        items_price,
        shipping_amount,
        tax_amount,
        total_amount,
    }
}

pub fn shipping_for(items_price: Money) -> Money {
    if items_price > FREE_SHIPPING_THRESHOLD {
        Money::default()
    } else {
        FLAT_SHIPPING_FEE
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    fn line(id: i64, price: i64, qty: i64) -> PriceLine {
        PriceLine::new(id, format!("Product {id}"), cents(price), qty)
    }

    fn pct(percentage: i64, cap: Option<i64>) -> CouponKind {
        CouponKind::Percentage { percentage, max_deduction: cap.map(Money::from_cents) }
    }

    #[test]
    fn no_coupon() {
        let p = price(&[line(1, 1599, 2), line(2, 500, 1)], None);
        assert_eq!(p.pre_subtotal, cents(3698));
        assert_eq!(p.items_price, cents(3698));
        assert_eq!(p.discount_amount, cents(0));
        assert_eq!(p.shipping_amount, FLAT_SHIPPING_FEE);
        // 15% of 36.98 = 5.547
        assert_eq!(p.tax_amount, cents(555));
        assert_eq!(p.total_amount, cents(3698 + 500 + 555));
        assert!(p.gift.is_none());
    }

    #[test]
    fn discount_is_capped() {
        let p = price(&[line(1, 10_000, 1)], Some(&pct(20, Some(1000))));
        assert_eq!(p.discount_amount, cents(1000));
        assert_eq!(p.items_price, cents(9000));
        assert_eq!(p.effective_discount(), cents(1000));
    }

    #[test]
    fn tax_is_charged_after_discount() {
        let p = price(&[line(1, 10_000, 1)], Some(&pct(50, None)));
        assert_eq!(p.items_price, cents(5000));
        assert_eq!(p.tax_amount, cents(750));
        assert_eq!(p.shipping_amount, cents(500));
        assert_eq!(p.total_amount, cents(6250));
    }

    #[test]
    fn free_shipping_threshold() {
        let p = price(&[line(1, 20_000, 1)], None);
        assert_eq!(p.shipping_amount, cents(500));
        let p = price(&[line(1, 20_001, 1)], None);
        assert_eq!(p.shipping_amount, cents(0));
        // The threshold applies to the discounted amount
        let p = price(&[line(1, 22_000, 1)], Some(&pct(10, None)));
        assert_eq!(p.items_price, cents(19_800));
        assert_eq!(p.shipping_amount, cents(500));
    }

    #[test]
    fn free_gift_gate_uses_pre_discount_subtotal() {
        let gift = CouponKind::FreeGift { gift_product_id: 9, gift_qty: 2, threshold: cents(5000) };
        let p = price(&[line(1, 4999, 1)], Some(&gift));
        assert!(p.gift.is_none());
        let p = price(&[line(1, 5000, 1)], Some(&gift));
        assert_eq!(p.gift, Some(GiftLine { product_id: 9, quantity: 2 }));
        // Gift coupons never change line prices
        assert_eq!(p.items_price, cents(5000));
        assert_eq!(p.discount_amount, cents(0));
    }

    #[test]
    fn line_level_rounding_drift() {
        // 10% of 0.15 is 0.015, which rounds to 0.02. Each 0.05 line scales to 0.0433.. and rounds to 0.04.
        let lines = [line(1, 5, 1), line(2, 5, 1), line(3, 5, 1)];
        let p = price(&lines, Some(&pct(10, None)));
        assert_eq!(p.discount_amount, cents(2));
        assert_eq!(p.items_price, cents(12));
        assert_eq!(p.pre_subtotal - p.discount_amount, cents(13));
        assert_eq!(p.rounding_drift(), cents(-1));
        assert!(p.items.iter().all(|i| i.line_total == cents(4)));
    }

    #[test]
    fn empty_basket() {
        let p = price(&[], Some(&pct(25, None)));
        assert_eq!(p.pre_subtotal, cents(0));
        assert_eq!(p.items_price, cents(0));
        assert_eq!(p.tax_amount, cents(0));
        assert_eq!(p.total_amount, FLAT_SHIPPING_FEE);
    }

    #[test]
    fn full_discount() {
        let p = price(&[line(1, 1234, 3)], Some(&pct(100, None)));
        assert_eq!(p.items_price, cents(0));
        assert_eq!(p.tax_amount, cents(0));
        assert_eq!(p.total_amount, cents(500));
    }
}
