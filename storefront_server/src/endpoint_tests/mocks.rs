use checkout_engine::{
    traits::{ExternalOrder, PaymentLinkResult, ProcessorCheckout},
    PaymentProcessor,
    ProcessorError,
};
use mockall::mock;

mock! {
    pub Processor {}
    impl PaymentProcessor for Processor {
        async fn create_payment_link(&self, checkout: ProcessorCheckout) -> Result<PaymentLinkResult, ProcessorError>;
        async fn retrieve_order(&self, external_order_id: &str) -> Result<ExternalOrder, ProcessorError>;
    }
}
