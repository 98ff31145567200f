use crate::{db_types::CartLine, traits::StoreError};

/// Each user has at most one cart, created implicitly on the first upsert.
#[allow(async_fn_in_trait)]
pub trait CartManagement {
    /// Returns the lines in the user's cart, in the order they were added. A user without a cart has an empty one.
    async fn fetch_cart(&self, user_id: &str) -> Result<Vec<CartLine>, StoreError>;

    /// Sets the quantity for the `(product_id, variant)` line, creating the cart and the line if needed.
    async fn upsert_cart_line(&self, user_id: &str, line: CartLine) -> Result<(), StoreError>;

    /// Returns true if a line was removed.
    async fn remove_cart_line(&self, user_id: &str, product_id: i64, variant: Option<&str>)
        -> Result<bool, StoreError>;

    /// Removes every line from the cart and returns the number of lines removed.
    async fn clear_cart(&self, user_id: &str) -> Result<u64, StoreError>;
}
