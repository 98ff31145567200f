use std::{collections::HashMap, fmt::Debug};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    ce_api::errors::CartApiError,
    db_types::{CartLine, Money, Product},
    traits::{CartManagement, ProductCatalog},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartViewLine {
    pub product_id: i64,
    pub variant: Option<String>,
    pub name: String,
    pub image_url: Option<String>,
    pub unit_price: Money,
    pub stock: i64,
    pub quantity: i64,
    pub line_total: Money,
}

/// A cart joined with the current catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub lines: Vec<CartViewLine>,
    pub subtotal: Money,
}

pub struct CartApi<B> {
    db: B,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<B> CartApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CartApi<B>
where B: CartManagement + ProductCatalog
{
    pub async fn fetch_cart(&self, user_id: &str) -> Result<CartView, CartApiError> {
        let lines = self.db.fetch_cart(user_id).await?;
        let ids = lines.iter().map(|l| l.product_id).collect::<Vec<_>>();
        let products: HashMap<i64, Product> =
            self.db.fetch_products(&ids).await?.into_iter().map(|p| (p.id, p)).collect();
        let lines = lines
            .into_iter()
            .filter_map(|line| {
                let product = products.get(&line.product_id)?;
                Some(CartViewLine {
                    product_id: line.product_id,
                    variant: line.variant,
                    name: product.name.clone(),
                    image_url: product.image_url.clone(),
                    unit_price: product.price,
                    stock: product.stock,
                    quantity: line.quantity,
                    line_total: product.price * line.quantity,
                })
            })
            .collect::<Vec<_>>();
        let subtotal = lines.iter().map(|l| l.line_total).sum();
        Ok(CartView { lines, subtotal })
    }

    /// Sets the quantity of a cart line. The quantity is clamped to the product's stock, and the line is removed if
    /// the product is sold out.
    pub async fn upsert_line(&self, user_id: &str, mut line: CartLine) -> Result<CartView, CartApiError> {
        if line.quantity < 1 {
            return Err(CartApiError::InvalidQuantity(line.quantity));
        }
        let product =
            self.db.fetch_product(line.product_id).await?.ok_or(CartApiError::ProductNotFound(line.product_id))?;
        line.variant = line.variant.filter(|v| !v.trim().is_empty());
        if product.stock < 1 {
            debug!("🛒️ Product #{} is sold out. Removing it from {user_id}'s cart.", product.id);
            self.db.remove_cart_line(user_id, product.id, line.variant.as_deref()).await?;
        } else {
            line.quantity = line.quantity.min(product.stock);
            trace!("🛒️ Setting {user_id}'s cart line for product #{} to {}", product.id, line.quantity);
            self.db.upsert_cart_line(user_id, line).await?;
        }
        self.fetch_cart(user_id).await
    }

    pub async fn remove_line(
        &self,
        user_id: &str,
        product_id: i64,
        variant: Option<&str>,
    ) -> Result<CartView, CartApiError> {
        let variant = variant.filter(|v| !v.trim().is_empty());
        if !self.db.remove_cart_line(user_id, product_id, variant).await? {
            debug!("🛒️ Product #{product_id} was not in {user_id}'s cart");
        }
        self.fetch_cart(user_id).await
    }

    pub async fn clear(&self, user_id: &str) -> Result<u64, CartApiError> {
        let removed = self.db.clear_cart(user_id).await?;
        debug!("🛒️ Cleared {removed} lines from {user_id}'s cart");
        Ok(removed)
    }
}
