use std::{fmt::Display, str::FromStr, time::Duration};

use log::*;
use storefront_common::{helpers::parse_env_or, Secret};

const DEFAULT_API_VERSION: &str = "2024-07-17";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SquareEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl SquareEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://connect.squareupsandbox.com",
            Self::Production => "https://connect.squareup.com",
        }
    }
}

impl FromStr for SquareEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("'{other}' is not a Square environment. Use 'sandbox' or 'production'")),
        }
    }
}

impl Display for SquareEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sandbox => write!(f, "sandbox"),
            Self::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SquareConfig {
    pub environment: SquareEnvironment,
    pub access_token: Secret<String>,
    pub location_id: String,
    pub api_version: String,
    /// Upper bound on every request made to Square. Timeouts surface as [`crate::SquareApiError::Timeout`].
    pub timeout: Duration,
    /// Overrides the environment's base url. Only useful for tests and local proxies.
    pub base_url_override: Option<String>,
}

impl Default for SquareConfig {
    fn default() -> Self {
        Self {
            environment: SquareEnvironment::Sandbox,
            access_token: Secret::default(),
            location_id: String::default(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
            base_url_override: None,
        }
    }
}

impl SquareConfig {
    pub fn new_from_env_or_default() -> Self {
        let environment = parse_env_or("SFS_SQUARE_ENVIRONMENT", SquareEnvironment::Sandbox, |v, e| {
            warn!("💳️ SFS_SQUARE_ENVIRONMENT={v} is invalid. {e}. Using the sandbox.");
        });
        let access_token = Secret::new(std::env::var("SFS_SQUARE_ACCESS_TOKEN").unwrap_or_else(|_| {
            warn!("💳️ SFS_SQUARE_ACCESS_TOKEN not set, using (probably useless) default");
            String::default()
        }));
        let location_id = std::env::var("SFS_SQUARE_LOCATION_ID").unwrap_or_else(|_| {
            warn!("💳️ SFS_SQUARE_LOCATION_ID not set. Checkout links cannot be created without it.");
            String::default()
        });
        let api_version = std::env::var("SFS_SQUARE_API_VERSION").unwrap_or_else(|_| {
            info!("💳️ SFS_SQUARE_API_VERSION not set, using {DEFAULT_API_VERSION} as default");
            DEFAULT_API_VERSION.to_string()
        });
        let timeout_secs = parse_env_or("SFS_SQUARE_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs(), |v, e| {
            warn!("💳️ SFS_SQUARE_TIMEOUT_SECS={v} is invalid. {e}. Using {}s.", DEFAULT_TIMEOUT.as_secs());
        });
        let base_url_override = std::env::var("SFS_SQUARE_BASE_URL").ok();
        Self {
            environment,
            access_token,
            location_id,
            api_version,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            base_url_override,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url_override.as_deref().unwrap_or_else(|| self.environment.base_url())
    }
}
