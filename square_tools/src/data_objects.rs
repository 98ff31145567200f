use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use storefront_common::{Money, CURRENCY_CODE};

use crate::SquareApiError;

/// Square represents money as an integer amount in the smallest denomination of the currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareMoney {
    pub amount: i64,
    pub currency: String,
}

impl SquareMoney {
    pub fn usd(amount: Money) -> Self {
        Self { amount: amount.cents(), currency: CURRENCY_CODE.to_string() }
    }

    pub fn to_money(&self) -> Result<Money, SquareApiError> {
        if self.currency != CURRENCY_CODE {
            return Err(SquareApiError::InvalidCurrencyAmount(format!("{} {}", self.amount, self.currency)));
        }
        Ok(Money::from_cents(self.amount))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareLineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Square sends quantities as decimal strings
    pub quantity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_price_money: Option<SquareMoney>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareDiscount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub discount_type: String,
    pub amount_money: SquareMoney,
    pub scope: String,
}

impl SquareDiscount {
    /// An order-level discount of a fixed amount.
    pub fn fixed_order_discount<S: Into<String>>(name: S, amount: Money) -> Self {
        Self {
            uid: None,
            name: name.into(),
            discount_type: "FIXED_AMOUNT".to_string(),
            amount_money: SquareMoney::usd(amount),
            scope: "ORDER".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub line_items: Vec<SquareLineItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discounts: Vec<SquareDiscount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_money: Option<SquareMoney>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_support_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentLinkRequest {
    pub idempotency_key: String,
    pub order: SquareOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_options: Option<CheckoutOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
}
