use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use crate::traits::{ExternalOrder, PaymentLinkResult, PaymentProcessor, ProcessorCheckout, ProcessorError};

#[derive(Default)]
struct FakeState {
    orders: HashMap<String, ExternalOrder>,
    checkouts: Vec<ProcessorCheckout>,
    link_failures: VecDeque<ProcessorError>,
    retrieve_failures: VecDeque<ProcessorError>,
    retrieve_calls: usize,
    counter: u64,
}

/// An in-memory payment processor. Checkouts become external orders that can later be retrieved, exactly as the
/// processor would report them.
#[derive(Clone, Default)]
pub struct FakeProcessor {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkouts(&self) -> Vec<ProcessorCheckout> {
        self.state.lock().unwrap().checkouts.clone()
    }

    pub fn order(&self, id: &str) -> Option<ExternalOrder> {
        self.state.lock().unwrap().orders.get(id).cloned()
    }

    /// Adds or replaces an external order, e.g. to simulate tampered metadata.
    pub fn insert_order(&self, order: ExternalOrder) {
        self.state.lock().unwrap().orders.insert(order.id.clone(), order);
    }

    /// The next `create_payment_link` calls fail with these errors, in order.
    pub fn fail_next_payment_links(&self, errors: Vec<ProcessorError>) {
        self.state.lock().unwrap().link_failures.extend(errors);
    }

    /// The next `retrieve_order` calls fail with these errors, in order.
    pub fn fail_next_retrievals(&self, errors: Vec<ProcessorError>) {
        self.state.lock().unwrap().retrieve_failures.extend(errors);
    }

    pub fn retrieve_calls(&self) -> usize {
        self.state.lock().unwrap().retrieve_calls
    }
}

impl PaymentProcessor for FakeProcessor {
    async fn create_payment_link(&self, checkout: ProcessorCheckout) -> Result<PaymentLinkResult, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.link_failures.pop_front() {
            return Err(e);
        }
        state.counter += 1;
        let id = format!("ORDER-{:04}", state.counter);
        let order = ExternalOrder {
            id: id.clone(),
            reference_id: Some(checkout.reference_id.clone()),
            lines: checkout.lines.clone(),
            metadata: checkout.metadata.clone(),
            total: Some(checkout.expected_total()),
        };
        state.orders.insert(id.clone(), order);
        state.checkouts.push(checkout);
        Ok(PaymentLinkResult { url: format!("https://checkout.example.com/pay/{id}"), external_order_id: id })
    }

    async fn retrieve_order(&self, external_order_id: &str) -> Result<ExternalOrder, ProcessorError> {
        let mut state = self.state.lock().unwrap();
        state.retrieve_calls += 1;
        if let Some(e) = state.retrieve_failures.pop_front() {
            return Err(e);
        }
        state
            .orders
            .get(external_order_id)
            .cloned()
            .ok_or(ProcessorError::Rejected { status: 404, message: format!("Order {external_order_id} not found") })
    }
}
