use rand::{distributions::Alphanumeric, Rng};

pub const IDEMPOTENCY_KEY_LENGTH: usize = 32;

/// A random key the payment processor uses to de-duplicate retried requests.
pub fn new_idempotency_key() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(IDEMPOTENCY_KEY_LENGTH).map(char::from).collect()
}
