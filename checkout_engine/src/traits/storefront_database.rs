use thiserror::Error;

use crate::traits::{CartManagement, CouponManagement, OrderManagement, ProductCatalog};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("A record with the same unique key already exists: {0}")]
    Duplicate(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Stored data could not be converted: {0}")]
    InvalidData(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl StoreError {
    /// Errors that may go away if the operation is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::DatabaseError(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate(db.message().to_string()),
            sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::InvalidData(e.to_string()),
            _ => StoreError::DatabaseError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// The highest-level storage contract. A backend implementing this trait can drive every engine API.
pub trait StorefrontDatabase: Clone + ProductCatalog + CartManagement + CouponManagement + OrderManagement {
    /// The URL of the database
    fn url(&self) -> &str;
}
