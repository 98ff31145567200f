use thiserror::Error;

use crate::traits::{ExternalOrder, PaymentLinkResult, ProcessorCheckout};

#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("The payment processor did not respond in time: {0}")]
    Timeout(String),
    #[error("The payment processor is temporarily unavailable: {0}")]
    Transient(String),
    #[error("The payment processor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("The payment processor returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl ProcessorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessorError::Timeout(_) | ProcessorError::Transient(_))
    }
}

/// The boundary to the hosted checkout provider.
#[allow(async_fn_in_trait)]
pub trait PaymentProcessor {
    /// Creates a hosted payment page for the checkout and returns its URL and the processor's order id.
    async fn create_payment_link(&self, checkout: ProcessorCheckout) -> Result<PaymentLinkResult, ProcessorError>;

    /// Retrieves the processor's canonical record for the order. Implementations must bound the call with a timeout.
    async fn retrieve_order(&self, external_order_id: &str) -> Result<ExternalOrder, ProcessorError>;
}
