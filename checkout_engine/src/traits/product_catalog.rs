use crate::{
    db_types::{NewProduct, Product},
    traits::{StoreError, StockUpdate},
};

/// Read access to the catalog, plus the one mutation the engine performs on it: decrementing stock.
///
/// Catalog management itself is owned elsewhere. `insert_product` exists so that fixtures and seed scripts can
/// populate a store.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog {
    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, StoreError>;

    async fn fetch_products(&self, product_ids: &[i64]) -> Result<Vec<Product>, StoreError>;

    async fn insert_product(&self, product: NewProduct) -> Result<Product, StoreError>;

    /// Atomically removes `quantity` units from stock. If fewer than `quantity` units are available, nothing is
    /// changed and [`StockUpdate::Insufficient`] is returned.
    async fn decrement_stock(&self, product_id: i64, quantity: i64) -> Result<StockUpdate, StoreError>;
}
