use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lnurld_shared::lnurl::StatusResponse;
use lnurld_shared::{CryptoError, TicketError, ValidationError, ZapError};
use lnurld_store::StoreError;
use thiserror::Error;

use crate::node::NodeError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// k1 unknown, expired or already bound to an identity.
    #[error("Invalid or expired k1")]
    InvalidChallenge,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Withdrawal already redeemed")]
    AlreadyRedeemed,

    #[error("Raffle already drawn")]
    AlreadyDrawn,

    #[error("Raffle already committed")]
    AlreadyCommitted,

    #[error("Raffle has not been drawn")]
    NotDrawn,

    #[error("Raffle has not been committed")]
    NotCommitted,

    #[error("Raffle is locked")]
    Locked,

    #[error("Not enough tickets: {available} available, {required} required")]
    InsufficientTickets { available: usize, required: usize },

    #[error("Invoice amount {actual} sats does not match {expected} sats")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Payment node unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidKey(key) => ServerError::BadRequest(format!("invalid id: {key}")),
            other => ServerError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<NodeError> for ServerError {
    fn from(e: NodeError) -> Self {
        ServerError::UpstreamUnavailable(e.to_string())
    }
}

impl From<ValidationError> for ServerError {
    fn from(e: ValidationError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<TicketError> for ServerError {
    fn from(e: TicketError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<ZapError> for ServerError {
    fn from(e: ZapError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<CryptoError> for ServerError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidSignature => ServerError::InvalidSignature,
            other => ServerError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    /// Rendered as the LNURL error envelope `{"status":"ERROR","reason":...}`.
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            ServerError::InvalidChallenge
            | ServerError::InvalidSignature
            | ServerError::NotDrawn
            | ServerError::NotCommitted
            | ServerError::InsufficientTickets { .. }
            | ServerError::AmountMismatch { .. }
            | ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::AlreadyRedeemed
            | ServerError::AlreadyDrawn
            | ServerError::AlreadyCommitted
            | ServerError::Locked => (StatusCode::CONFLICT, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::UpstreamUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Payment node unavailable, try again later".to_string(),
            ),
            ServerError::PersistenceFailure(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, axum::Json(StatusResponse::error(reason))).into_response()
    }
}
