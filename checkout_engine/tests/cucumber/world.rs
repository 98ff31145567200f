use std::collections::HashMap;

use checkout_engine::{
    db_types::{Order, Product},
    order_objects::CheckoutSession,
    test_utils::system::TestSystem,
    traits::OrderManagement,
    ReconcileOutcome,
};
use cucumber::World;

#[derive(Debug, Default, World)]
pub struct StorefrontWorld {
    pub system: Option<TestSystem>,
    pub products: HashMap<String, Product>,
    pub sessions: HashMap<String, CheckoutSession>,
    pub outcomes: Vec<ReconcileOutcome>,
}

impl StorefrontWorld {
    pub fn sys(&self) -> &TestSystem {
        self.system.as_ref().expect("System not initialised. Start the scenario with 'Given a fresh install'")
    }

    pub fn product(&self, name: &str) -> &Product {
        self.products.get(name).unwrap_or_else(|| panic!("No product called {name}"))
    }

    pub fn session(&self, name: &str) -> &CheckoutSession {
        self.sessions.get(name).unwrap_or_else(|| panic!("No checkout session called {name}"))
    }

    pub fn last_outcome(&self) -> &ReconcileOutcome {
        self.outcomes.last().expect("No webhook has been delivered yet")
    }

    pub async fn latest_order(&self, user: &str) -> Order {
        let orders = self.sys().db.fetch_orders_for_user(user).await.expect("Error fetching orders");
        orders.into_iter().max_by_key(|o| o.id).unwrap_or_else(|| panic!("{user} has no orders"))
    }
}
