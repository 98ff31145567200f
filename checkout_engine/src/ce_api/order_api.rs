use std::fmt::Debug;

use crate::{ce_api::errors::OrderApiError, db_types::Order, traits::OrderManagement};

/// Read access to orders. Orders are created only by payment settlement.
pub struct OrderApi<B> {
    db: B,
}

impl<B> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi")
    }
}

impl<B> OrderApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderApi<B>
where B: OrderManagement
{
    pub async fn orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderApiError> {
        Ok(self.db.fetch_orders_for_user(user_id).await?)
    }

    /// Fetches an order belonging to `user_id`. Other users' orders are reported as not found.
    pub async fn order_for_user(&self, user_id: &str, order_id: i64) -> Result<Order, OrderApiError> {
        match self.db.fetch_order(order_id).await? {
            Some(order) if order.user_id == user_id => Ok(order),
            _ => Err(OrderApiError::OrderNotFound(order_id)),
        }
    }

    pub async fn order_by_id(&self, order_id: i64) -> Result<Order, OrderApiError> {
        self.db.fetch_order(order_id).await?.ok_or(OrderApiError::OrderNotFound(order_id))
    }
}
