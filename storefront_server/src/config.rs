use std::{env, time::Duration};

use checkout_engine::{db_types::Money, CheckoutConfig, ReconcilerConfig};
use log::*;
use square_tools::SquareConfig;
use storefront_common::{
    helpers::{parse_boolean_flag, parse_env_or},
    Secret,
};

const DEFAULT_SFS_HOST: &str = "127.0.0.1";
const DEFAULT_SFS_PORT: u16 = 4000;
const DEFAULT_RETRIEVE_ATTEMPTS: u32 = 3;
const DEFAULT_TOTAL_TOLERANCE_CENTS: i64 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub auth: AuthConfig,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// The storefront's public web address. Shoppers are sent back here after paying.
    pub frontend_url: String,
    pub support_email: Option<String>,
    pub square: SquareConfig,
    pub webhooks: WebhookConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SFS_HOST.to_string(),
            port: DEFAULT_SFS_PORT,
            database_url: String::default(),
            auth: AuthConfig::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            frontend_url: String::default(),
            support_email: None,
            square: SquareConfig::default(),
            webhooks: WebhookConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// The HS256 key access tokens are signed with
    pub jwt_secret: Secret<String>,
}

impl AuthConfig {
    pub fn try_from_env() -> Result<Self, String> {
        let secret = env::var("SFS_JWT_SECRET").map_err(|_| "SFS_JWT_SECRET is not set".to_string())?;
        if secret.len() < 32 {
            return Err("SFS_JWT_SECRET must be at least 32 characters long".into());
        }
        Ok(Self { jwt_secret: Secret::new(secret) })
    }
}

/// Settings for the payment notification endpoint.
#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub signature_key: Secret<String>,
    /// The exact URL Square posts notifications to. It is part of the signed payload, so it must match the
    /// subscription character for character.
    pub notification_url: String,
    pub retrieve_attempts: u32,
    pub total_tolerance: Money,
    /// When true, events that failed for a transient reason are answered with a 503 so that Square redelivers them.
    pub nack_retryable_events: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signature_key: Secret::default(),
            notification_url: String::default(),
            retrieve_attempts: DEFAULT_RETRIEVE_ATTEMPTS,
            total_tolerance: Money::from_cents(DEFAULT_TOTAL_TOLERANCE_CENTS),
            nack_retryable_events: false,
        }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let signature_key = env::var("SFS_SQUARE_SIGNATURE_KEY").ok().unwrap_or_else(|| {
            error!(
                "🪛️ SFS_SQUARE_SIGNATURE_KEY is not set. Every payment notification will be rejected until it is set \
                 to the signature key of your Square webhook subscription."
            );
            String::default()
        });
        let notification_url = env::var("SFS_SQUARE_NOTIFICATION_URL").ok().unwrap_or_else(|| {
            error!(
                "🪛️ SFS_SQUARE_NOTIFICATION_URL is not set. Payment notifications cannot be verified without the URL \
                 they were sent to."
            );
            String::default()
        });
        let retrieve_attempts = parse_env_or("SFS_RETRIEVE_ATTEMPTS", DEFAULT_RETRIEVE_ATTEMPTS, |v, e| {
            warn!("🪛️ {v} is not a valid value for SFS_RETRIEVE_ATTEMPTS. {e} Using {DEFAULT_RETRIEVE_ATTEMPTS}.");
        })
        .max(1);
        let tolerance = parse_env_or("SFS_TOTAL_TOLERANCE_CENTS", DEFAULT_TOTAL_TOLERANCE_CENTS, |v, e| {
            warn!(
                "🪛️ {v} is not a valid value for SFS_TOTAL_TOLERANCE_CENTS. {e} Using \
                 {DEFAULT_TOTAL_TOLERANCE_CENTS}."
            );
        });
        let nack_retryable_events = parse_boolean_flag(env::var("SFS_NACK_RETRYABLE_EVENTS").ok(), false);
        if nack_retryable_events {
            info!("🪛️ Notifications that fail for transient reasons will be answered with 503 Service Unavailable");
        }
        Self {
            signature_key: Secret::new(signature_key),
            notification_url,
            retrieve_attempts,
            total_tolerance: Money::from_cents(tolerance.abs()),
            nack_retryable_events,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SFS_HOST").ok().unwrap_or_else(|| DEFAULT_SFS_HOST.into());
        let port = parse_env_or("SFS_PORT", DEFAULT_SFS_PORT, |s, e| {
            error!("🪛️ {s} is not a valid port for SFS_PORT. {e} Using the default, {DEFAULT_SFS_PORT}, instead.");
        });
        let database_url = env::var("SFS_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFS_DATABASE_URL is not set. Please set it to the URL for the storefront database.");
            String::default()
        });
        let auth = AuthConfig::try_from_env().unwrap_or_else(|e| {
            warn!(
                "🪛️ Could not load the authentication configuration from environment variables. {e}. Reverting to the \
                 default configuration. No access token will validate."
            );
            AuthConfig::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("SFS_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SFS_USE_FORWARDED").ok(), false);
        let frontend_url = env::var("SFS_FRONTEND_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SFS_FRONTEND_URL is not set. Shoppers will not be redirected after paying.");
            String::default()
        });
        let support_email = env::var("SFS_SUPPORT_EMAIL").ok().filter(|s| !s.trim().is_empty());
        let square = SquareConfig::new_from_env_or_default();
        let webhooks = WebhookConfig::from_env_or_default();
        Self {
            host,
            port,
            database_url,
            auth,
            use_x_forwarded_for,
            use_forwarded,
            frontend_url,
            support_email,
            square,
            webhooks,
        }
    }

    pub fn checkout_config(&self) -> CheckoutConfig {
        let frontend = self.frontend_url.trim_end_matches('/');
        let redirect_url = (!frontend.is_empty()).then(|| format!("{frontend}/me/orders?order_success=true"));
        CheckoutConfig { redirect_url, support_email: self.support_email.clone() }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            signature_key: self.webhooks.signature_key.clone(),
            notification_url: self.webhooks.notification_url.clone(),
            retrieve_attempts: self.webhooks.retrieve_attempts,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            total_tolerance: self.webhooks.total_tolerance,
        }
    }
}
