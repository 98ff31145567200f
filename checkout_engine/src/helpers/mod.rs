mod idempotency;
mod webhook_signature;

pub use idempotency::{new_idempotency_key, IDEMPOTENCY_KEY_LENGTH};
pub use webhook_signature::{sign_webhook, verify_webhook_signature, SIGNATURE_HEADER};
