//! [`PaymentProcessor`] implementation backed by Square's hosted checkout.
//!
//! Each checkout line becomes a Square line item. The line kind and product id travel in the line item's metadata, so
//! that they survive the round trip and can be read back when the paid order is retrieved. Line items created outside
//! this server (e.g. edited in the Square dashboard) carry no metadata; their kind is then inferred from the name.
use std::collections::HashMap;

use checkout_engine::{
    traits::{ExternalOrder, LineKind, PaymentLinkResult, ProcessorCheckout, ProcessorLine},
    PaymentProcessor,
    ProcessorError,
};
use log::*;
use square_tools::{
    CheckoutOptions,
    CreatePaymentLinkRequest,
    SquareApi,
    SquareApiError,
    SquareDiscount,
    SquareLineItem,
    SquareMoney,
    SquareOrder,
};

const META_KIND: &str = "kind";
const META_PRODUCT_ID: &str = "product_id";

#[derive(Clone)]
pub struct SquarePaymentProcessor {
    api: SquareApi,
}

impl SquarePaymentProcessor {
    pub fn new(api: SquareApi) -> Self {
        Self { api }
    }
}

impl PaymentProcessor for SquarePaymentProcessor {
    async fn create_payment_link(&self, checkout: ProcessorCheckout) -> Result<PaymentLinkResult, ProcessorError> {
        let request = payment_link_request(checkout);
        let link = self.api.create_payment_link(request).await.map_err(to_processor_error)?;
        let external_order_id = link
            .order_id
            .ok_or_else(|| ProcessorError::InvalidResponse(format!("Payment link {} has no order id", link.id)))?;
        Ok(PaymentLinkResult { url: link.url, external_order_id })
    }

    async fn retrieve_order(&self, external_order_id: &str) -> Result<ExternalOrder, ProcessorError> {
        let order = self.api.retrieve_order(external_order_id).await.map_err(to_processor_error)?;
        to_external_order(order)
    }
}

pub fn to_processor_error(e: SquareApiError) -> ProcessorError {
    match e {
        SquareApiError::Timeout(s) => ProcessorError::Timeout(s),
        e if e.is_transient() => ProcessorError::Transient(e.to_string()),
        SquareApiError::QueryError { status, message } => ProcessorError::Rejected { status, message },
        SquareApiError::RestRequestError(message) => ProcessorError::Rejected { status: 400, message },
        SquareApiError::Initialization(s) => ProcessorError::Rejected { status: 0, message: s },
        e => ProcessorError::InvalidResponse(e.to_string()),
    }
}

fn payment_link_request(checkout: ProcessorCheckout) -> CreatePaymentLinkRequest {
    let line_items = checkout.lines.iter().map(to_line_item).collect();
    let discounts = checkout
        .discount
        .iter()
        .filter(|d| !d.amount.is_zero())
        .map(|d| SquareDiscount::fixed_order_discount(d.name.clone(), d.amount))
        .collect();
    let order = SquareOrder {
        reference_id: Some(checkout.reference_id),
        line_items,
        discounts,
        metadata: Some(checkout.metadata),
        ..Default::default()
    };
    let checkout_options = (checkout.redirect_url.is_some() || checkout.support_email.is_some()).then(|| {
        CheckoutOptions { redirect_url: checkout.redirect_url, merchant_support_email: checkout.support_email }
    });
    CreatePaymentLinkRequest { idempotency_key: checkout.idempotency_key, order, checkout_options }
}

fn to_line_item(line: &ProcessorLine) -> SquareLineItem {
    let mut metadata = HashMap::with_capacity(2);
    metadata.insert(META_KIND.to_string(), line.kind.to_string());
    if let Some(id) = line.product_id {
        metadata.insert(META_PRODUCT_ID.to_string(), id.to_string());
    }
    SquareLineItem {
        name: Some(line.name.clone()),
        quantity: line.quantity.to_string(),
        base_price_money: Some(SquareMoney::usd(line.unit_price)),
        metadata: Some(metadata),
        ..Default::default()
    }
}

fn to_external_order(order: SquareOrder) -> Result<ExternalOrder, ProcessorError> {
    let id = order.id.ok_or_else(|| ProcessorError::InvalidResponse("Order has no id".into()))?;
    let lines = order.line_items.into_iter().map(to_processor_line).collect::<Result<Vec<_>, _>>()?;
    let total = match order.total_money {
        Some(m) => Some(m.to_money().map_err(to_processor_error)?),
        None => None,
    };
    Ok(ExternalOrder {
        id,
        reference_id: order.reference_id,
        lines,
        metadata: order.metadata.unwrap_or_default(),
        total,
    })
}

fn to_processor_line(item: SquareLineItem) -> Result<ProcessorLine, ProcessorError> {
    let name = item.name.clone().unwrap_or_default();
    let metadata = item.metadata.unwrap_or_default();
    let kind = metadata
        .get(META_KIND)
        .and_then(|k| k.parse::<LineKind>().ok())
        .unwrap_or_else(|| infer_kind(&name));
    let product_id = metadata
        .get(META_PRODUCT_ID)
        .or(item.note.as_ref())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|_| kind == LineKind::Product);
    if kind == LineKind::Product && product_id.is_none() {
        warn!("💳️ Line item '{name}' does not identify a product. The payment processor's price will be used.");
    }
    let quantity = parse_quantity(&item.quantity)?;
    let unit_price = match item.base_price_money {
        Some(m) => m.to_money().map_err(to_processor_error)?,
        None => Default::default(),
    };
    Ok(ProcessorLine { kind, product_id, name, unit_price, quantity })
}

fn infer_kind(name: &str) -> LineKind {
    match name.trim().to_ascii_lowercase().as_str() {
        "shipping" | "shipping fee" => LineKind::Shipping,
        "tax" | "taxes" => LineKind::Tax,
        _ => LineKind::Product,
    }
}

/// Square sends quantities as decimal strings, e.g. "2" or "2.0". Fractional quantities are not sold here.
fn parse_quantity(s: &str) -> Result<i64, ProcessorError> {
    let s = s.trim();
    let whole = match s.split_once('.') {
        Some((w, frac)) if frac.chars().all(|c| c == '0') => w,
        Some(_) => return Err(ProcessorError::InvalidResponse(format!("Fractional quantity {s}"))),
        None => s,
    };
    whole.parse::<i64>().map_err(|e| ProcessorError::InvalidResponse(format!("Invalid quantity {s}. {e}")))
}
