//! Bearer token authentication.
//!
//! Access tokens are HS256 JWTs carrying the user id and the user's roles. Tokens are issued by the account service
//! that shares `SFS_JWT_SECRET` with this server; the server only needs to validate them. [`TokenIssuer::issue_token`]
//! exists for tooling and tests.
use std::time::Duration;

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use checkout_engine::db_types::Role;
use chrono::Utc;
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, errors::AuthError};

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id
    pub sub: String,
    pub roles: Vec<Role>,
    /// Expiry, in seconds since the Unix epoch
    pub exp: i64,
}

impl JwtClaims {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Handlers on the `/api` scope take `JwtClaims` as an argument to learn who is calling. The claims are placed in the
/// request extensions by [`crate::middleware::JwtAuthMiddlewareFactory`].
impl FromRequest for JwtClaims {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned().ok_or(AuthError::MissingToken);
        ready(claims)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self { encoding_key: EncodingKey::from_secret(secret), decoding_key: DecodingKey::from_secret(secret) }
    }

    /// Issue a new access token for the given user. Nothing is checked about the user.
    pub fn issue_token(&self, user_id: &str, roles: &[Role], duration: Option<Duration>) -> Result<String, AuthError> {
        let lifetime = duration.unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let lifetime = chrono::Duration::from_std(lifetime).map_err(|e| AuthError::CouldNotIssueToken(e.to_string()))?;
        let exp = (Utc::now() + lifetime).timestamp();
        let claims = JwtClaims { sub: user_id.to_string(), roles: roles.to_vec(), exp };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::CouldNotIssueToken(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let claims = decode::<JwtClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })?
            .claims;
        trace!("🔑️ Access token validated for {}", claims.sub);
        Ok(claims)
    }

    /// Extracts and validates the token from an `Authorization: Bearer <token>` header value.
    pub fn validate_bearer(&self, header: Option<&str>) -> Result<JwtClaims, AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidToken("Expected a Bearer token".into()))?;
        self.validate_token(token)
    }
}
