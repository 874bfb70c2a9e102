//! Saga error types.

use std::time::Duration;

use domain::Money;
use draft_store::DraftStoreError;
use thiserror::Error;

use crate::state::SessionState;

/// Failures talking to the payment gateway. Always retryable.
///
/// A link that simply has not been paid yet is a normal status response,
/// never one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway answered with a non-success status.
    #[error("Payment gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The gateway answered with something we could not decode.
    #[error("Invalid payment gateway response: {0}")]
    InvalidResponse(String),

    /// The call did not complete within the per-request bound.
    #[error("Payment gateway timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway created a link for a different amount than requested.
    #[error("Payment link amount mismatch: requested {requested}, got {actual}")]
    AmountMismatch { requested: Money, actual: Money },
}

/// Failures creating an order. Retryable only with the same idempotency token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order backend could not be reached.
    #[error("Order backend unavailable: {0}")]
    Unavailable(String),

    /// The order backend answered with a non-success status.
    #[error("Order backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The order backend answered with something we could not decode.
    #[error("Invalid order backend response: {0}")]
    InvalidResponse(String),

    /// The call did not complete within the per-request bound.
    #[error("Order backend timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The caller supplied arguments that can never succeed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Session is in an invalid state for the requested operation.
    #[error("Invalid session state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: String,
        actual: SessionState,
    },

    /// Payment gateway error.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Order backend error.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Draft store error.
    #[error("Draft store error: {0}")]
    DraftStore(#[from] DraftStoreError),

    /// There is no pending draft to pay for or reconcile.
    #[error("No pending order to reconcile")]
    NoPendingOrder,
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
