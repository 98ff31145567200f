//! A thin REST client for the parts of the Square API the storefront uses: hosted checkout links and order
//! retrieval.
mod api;
mod config;
mod error;

pub mod data_objects;

pub use api::SquareApi;
pub use config::{SquareConfig, SquareEnvironment};
pub use data_objects::{
    CheckoutOptions,
    CreatePaymentLinkRequest,
    PaymentLink,
    SquareDiscount,
    SquareLineItem,
    SquareMoney,
    SquareOrder,
};
pub use error::SquareApiError;
