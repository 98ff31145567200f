//! Webhook signatures.
//!
//! The payment processor signs each notification with HMAC-SHA256, keyed with the webhook's signature key, over the
//! notification URL followed by the raw request body. The digest is sent base64-encoded in [`SIGNATURE_HEADER`].
//!
//! Verification must run against the exact bytes that were received, before any JSON parsing.
use hmac::{digest::InvalidLength, Hmac, Mac};
use log::{debug, error, trace};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-square-hmacsha256-signature";

type HmacSha256 = Hmac<Sha256>;

fn mac_for(key: &str, notification_url: &str, body: &[u8]) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())?;
    mac.update(notification_url.as_bytes());
    mac.update(body);
    Ok(mac)
}

/// Calculates the base64-encoded signature for a notification.
pub fn sign_webhook(key: &str, notification_url: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let digest = mac_for(key, notification_url, body)?.finalize().into_bytes();
    Ok(base64::encode(digest))
}

/// Returns true if `signature` is a valid signature for the notification. The digest comparison is constant-time.
pub fn verify_webhook_signature(key: &str, notification_url: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = base64::decode(signature.trim()) else {
        debug!("🧾️ Webhook signature is not valid base64");
        return false;
    };
    let mac = match mac_for(key, notification_url, body) {
        Ok(mac) => mac,
        Err(e) => {
            error!("🧾️ The webhook signature key cannot be used. {e}");
            return false;
        },
    };
    let valid = mac.verify_slice(&expected).is_ok();
    trace!("🧾️ Webhook signature check: {valid}");
    valid
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: &str = "asdf1234";
    const URL: &str = "https://example.com/webhooks/square";
    const BODY: &[u8] = br#"{"type":"payment.updated","data":{"object":{"payment":{"id":"p1","status":"COMPLETED"}}}}"#;

    #[test]
    fn round_trip() {
        let sig = sign_webhook(KEY, URL, BODY).unwrap();
        assert!(verify_webhook_signature(KEY, URL, BODY, &sig));
        assert!(!verify_webhook_signature("other key", URL, BODY, &sig));
        assert!(!verify_webhook_signature(KEY, "https://example.com/elsewhere", BODY, &sig));
    }

    #[test]
    fn one_byte_tamper_is_rejected() {
        let sig = sign_webhook(KEY, URL, BODY).unwrap();
        let mut tampered = BODY.to_vec();
        tampered[10] ^= 0x01;
        assert!(!verify_webhook_signature(KEY, URL, &tampered, &sig));
    }

    #[test]
    fn garbage_signatures() {
        assert!(!verify_webhook_signature(KEY, URL, BODY, ""));
        assert!(!verify_webhook_signature(KEY, URL, BODY, "not base64!!"));
        assert!(!verify_webhook_signature(KEY, URL, BODY, &base64::encode(b"short")));
    }

    #[test]
    fn keys_of_any_length_are_accepted() {
        let long = "long-key".repeat(64);
        for key in ["", "k", long.as_str()] {
            let sig = sign_webhook(key, URL, BODY).expect("HMAC takes keys of any length");
            assert!(verify_webhook_signature(key, URL, BODY, &sig));
        }
    }
}
