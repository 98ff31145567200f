use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use checkout_engine::{CartApiError, CheckoutError, CouponApiError, CouponRejection, OrderApiError};
use log::error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    Conflict(String),
    #[error("The payment provider could not be reached. {0}")]
    PaymentProviderError(String),
    #[error("The webhook signature is missing or invalid")]
    InvalidWebhookSignature,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::CouldNotIssueToken(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentProviderError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("💻️ {self}");
        }
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided")]
    MissingToken,
    #[error("The access token is invalid. {0}")]
    InvalidToken(String),
    #[error("The access token has expired")]
    TokenExpired,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Could not issue an access token. {0}")]
    CouldNotIssueToken(String),
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        ServerError::AuthenticationError(self.clone()).status_code()
    }

    fn error_response(&self) -> HttpResponse {
        ServerError::AuthenticationError(self.clone()).error_response()
    }
}

impl From<CouponRejection> for ServerError {
    fn from(r: CouponRejection) -> Self {
        match r {
            CouponRejection::NotFound => Self::NoRecordFound(r.to_string()),
            _ => Self::ValidationError(r.to_string()),
        }
    }
}

impl From<CouponApiError> for ServerError {
    fn from(e: CouponApiError) -> Self {
        match e {
            CouponApiError::Rejected(r) => r.into(),
            CouponApiError::InvalidCoupon(_) => Self::ValidationError(e.to_string()),
            CouponApiError::QueryError(_) => Self::ValidationError(e.to_string()),
            CouponApiError::DuplicateCoupon(_) => Self::Conflict(e.to_string()),
            CouponApiError::CouponNotFound(_) => Self::NoRecordFound(e.to_string()),
            CouponApiError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Coupon(r) => r.into(),
            CheckoutError::EmptyCart => Self::ValidationError(e.to_string()),
            CheckoutError::InvalidShippingInfo(_) => Self::ValidationError(e.to_string()),
            CheckoutError::Processor(_) => Self::PaymentProviderError(e.to_string()),
            CheckoutError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<CartApiError> for ServerError {
    fn from(e: CartApiError) -> Self {
        match e {
            CartApiError::ProductNotFound(_) => Self::NoRecordFound(e.to_string()),
            CartApiError::InvalidQuantity(_) => Self::ValidationError(e.to_string()),
            CartApiError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<OrderApiError> for ServerError {
    fn from(e: OrderApiError) -> Self {
        match e {
            OrderApiError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderApiError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}
