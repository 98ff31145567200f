use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    ce_api::coupon_objects::ResolvedCoupon,
    db_types::{Money, ShippingInfo},
    pricing::PriceBreakdown,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(alias = "shippingInfo")]
    pub shipping_info: ShippingInfo,
    #[serde(default, alias = "couponId")]
    pub coupon_id: Option<i64>,
    #[serde(default, alias = "couponCode")]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
    pub external_order_id: String,
    pub breakdown: PriceBreakdown,
}

const KEY_USER_ID: &str = "user_id";
const KEY_ADDRESS: &str = "ship_address";
const KEY_CITY: &str = "ship_city";
const KEY_PHONE: &str = "ship_phone";
const KEY_ZIP: &str = "ship_zip";
const KEY_COUNTRY: &str = "ship_country";
const KEY_COUPON: &str = "coupon";
const KEY_PRE_SUBTOTAL: &str = "pre_subtotal";

/// The context a checkout session leaves with the payment processor, and which comes back with the paid order.
///
/// Processors limit metadata to a handful of short string values, so each field gets its own key. Nothing in here is
/// trusted at settlement: prices come from the catalog and the coupon is re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub user_id: String,
    pub shipping_info: ShippingInfo,
    pub coupon: Option<ResolvedCoupon>,
    pub pre_subtotal: Money,
}

impl SessionMetadata {
    pub fn new(
        user_id: &str,
        shipping_info: ShippingInfo,
        coupon: Option<ResolvedCoupon>,
        breakdown: &PriceBreakdown,
    ) -> Self {
        Self { user_id: user_id.to_string(), shipping_info, coupon, pre_subtotal: breakdown.pre_subtotal }
    }

    pub fn to_metadata(&self) -> Result<HashMap<String, String>, serde_json::Error> {
        let mut map = HashMap::with_capacity(8);
        map.insert(KEY_USER_ID.to_string(), self.user_id.clone());
        map.insert(KEY_ADDRESS.to_string(), self.shipping_info.address.clone());
        map.insert(KEY_CITY.to_string(), self.shipping_info.city.clone());
        map.insert(KEY_PHONE.to_string(), self.shipping_info.phone_no.clone());
        map.insert(KEY_ZIP.to_string(), self.shipping_info.zip_code.clone());
        map.insert(KEY_COUNTRY.to_string(), self.shipping_info.country.clone());
        if let Some(coupon) = &self.coupon {
            map.insert(KEY_COUPON.to_string(), serde_json::to_string(coupon)?);
        }
        map.insert(KEY_PRE_SUBTOTAL.to_string(), self.pre_subtotal.to_string());
        Ok(map)
    }

    pub fn from_metadata(map: &HashMap<String, String>) -> Result<Self, String> {
        let get = |key: &str| map.get(key).cloned().ok_or_else(|| format!("Missing metadata key {key}"));
        let shipping_info = ShippingInfo {
            address: get(KEY_ADDRESS)?,
            city: get(KEY_CITY)?,
            phone_no: get(KEY_PHONE)?,
            zip_code: get(KEY_ZIP)?,
            country: get(KEY_COUNTRY)?,
        };
        let coupon = map
            .get(KEY_COUPON)
            .map(|s| serde_json::from_str::<ResolvedCoupon>(s))
            .transpose()
            .map_err(|e| format!("Invalid coupon metadata: {e}"))?;
        let pre_subtotal = get(KEY_PRE_SUBTOTAL)?.parse::<Money>().map_err(|e| e.to_string())?;
        Ok(Self { user_id: get(KEY_USER_ID)?, shipping_info, coupon, pre_subtotal })
    }
}
