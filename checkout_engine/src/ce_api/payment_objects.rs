use serde::{Deserialize, Serialize};

use crate::db_types::Money;

pub const PAYMENT_UPDATED: &str = "payment.updated";
pub const PAYMENT_COMPLETED: &str = "COMPLETED";

/// A payment notification, as sent to the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub object: Option<EventObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventObject {
    #[serde(default)]
    pub payment: Option<PaymentObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentObject {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub total_money: Option<EventMoney>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMoney {
    pub amount: i64,
    pub currency: String,
}

impl EventMoney {
    pub fn to_money(&self) -> Money {
        Money::from_cents(self.amount)
    }
}

impl PaymentEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn payment(&self) -> Option<&PaymentObject> {
        self.data.as_ref()?.object.as_ref()?.payment.as_ref()
    }

    /// True for the single kind of event that triggers settlement: a payment update reporting a completed payment.
    pub fn is_completed_payment(&self) -> bool {
        self.event_type == PAYMENT_UPDATED && self.payment().map(|p| p.status == PAYMENT_COMPLETED).unwrap_or(false)
    }
}
