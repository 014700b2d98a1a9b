//! Storefront order desk
//!
//! Order lifecycle and inventory availability for the storefront and admin
//! console.
//!
//! ## Features
//! - Canonical order status table and administrator transition rules
//! - Customer cancel/return requests with admin review
//! - Stock aggregation across warehouses with stale-response protection
//! - Purchase gating per color x size variant
//! - REST client for the storefront backend

use thiserror::Error;

pub mod api;
pub mod client;
pub mod config;
pub mod desk;
pub mod domain;
pub mod publisher;
pub mod stock;
pub mod workflow;

use crate::domain::aggregates::{OrderError, ProductError, RequestError, RequestType};
use crate::domain::value_objects::{OrderId, ReasonError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("authentication expired")]
    AuthExpired,

    #[error("not permitted")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("a {kind} request already exists for order {order_id}")]
    DuplicateRequest { order_id: OrderId, kind: RequestType },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    FetchTimeout,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("transition not allowed: {0}")]
    TransitionNotAllowed(String),

    #[error("payment unsupported: {0}")]
    PaymentUnsupported(String),

    #[error("payment declined")]
    PaymentDeclined,

    #[error("configuration error: {0}")]
    Config(String),
}

impl CoordinatorError {
    /// Stable machine-readable code, used in error bodies on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::DuplicateRequest { .. } => "duplicate_request",
            Self::Network(_) => "network_error",
            Self::FetchTimeout => "fetch_timeout",
            Self::InvalidState(_) => "invalid_state",
            Self::TransitionNotAllowed(_) => "transition_not_allowed",
            Self::PaymentUnsupported(_) => "payment_unsupported",
            Self::PaymentDeclined => "payment_declined",
            Self::Config(_) => "config_error",
        }
    }

    /// Text shown to the end user in a non-blocking notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthExpired => "Your session has expired, please log in again.".into(),
            Self::Forbidden => "You are not permitted to perform this action.".into(),
            Self::NotFound(what) => format!("The requested {what} was not found."),
            Self::Validation(msg) => msg.clone(),
            Self::DuplicateRequest { kind, .. } => {
                format!("A {} request has already been submitted for this order.", kind.to_string().to_lowercase())
            }
            Self::Network(_) | Self::FetchTimeout => "Could not reach the server. Please try again.".into(),
            Self::InvalidState(msg) | Self::TransitionNotAllowed(msg) | Self::PaymentUnsupported(msg) => msg.clone(),
            Self::PaymentDeclined => "The payment could not be completed.".into(),
            Self::Config(_) => "Something went wrong. Please try again later.".into(),
        }
    }

    /// Whether the user should be sent back to the login screen.
    pub fn requires_login(&self) -> bool { matches!(self, Self::AuthExpired) }
}

impl From<OrderError> for CoordinatorError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems
            | OrderError::InvalidQuantity
            | OrderError::NegativeAmount(_)
            | OrderError::CurrencyMismatch
            | OrderError::UnknownStatus(_) => {
                Self::Validation(e.to_string())
            }
            OrderError::NotAssignable(_) | OrderError::TransitionNotAllowed { .. } => Self::TransitionNotAllowed(e.to_string()),
            OrderError::NotCancellable(_) | OrderError::NotAwaitingPayment(_) => Self::InvalidState(e.to_string()),
            OrderError::PaymentUnsupported(_) => Self::PaymentUnsupported(e.to_string()),
        }
    }
}

impl From<RequestError> for CoordinatorError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::AlreadyReviewed(_) => Self::InvalidState(e.to_string()),
            RequestError::NoteRequired | RequestError::UnknownDecision(_) => Self::Validation(e.to_string()),
        }
    }
}

impl From<ProductError> for CoordinatorError {
    fn from(e: ProductError) -> Self { Self::Validation(e.to_string()) }
}

impl From<ReasonError> for CoordinatorError {
    fn from(e: ReasonError) -> Self { Self::Validation(e.to_string()) }
}

impl From<validator::ValidationErrors> for CoordinatorError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
