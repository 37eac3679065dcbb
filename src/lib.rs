//! SnazzPay Secure-COD Core
//!
//! Payment-lifecycle service for cash-on-delivery orders backed by a card
//! authorization hold ("Trust Wallet"): the hold is captured when the order
//! is dispatched and released or partially refunded when it is cancelled.
//!
//! ## Features
//! - Lead intake, intent verification and one-shot conversion into orders
//! - Authorization, capture-on-dispatch, void and fee-based cancellation
//! - Shakti loyalty card issuance keyed by canonical phone number
//! - Commission and order-book reporting over the persisted order book

use rust_decimal::Decimal;
use thiserror::Error;

pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod reporting;
pub mod services;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum SnazzError {
    #[error("payment gateway configuration error: {0}")]
    Configuration(String),

    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("cancellation token does not match")]
    InvalidCancellationToken,

    #[error("fee {fee} must be less than order total {total}")]
    FeeExceedsTotal { fee: Decimal, total: Decimal },

    #[error("order {0} is already captured")]
    AlreadyCaptured(String),

    #[error("lead {0} is already converted")]
    AlreadyConverted(String),

    #[error("fee of {captured} charged on order {order_id} but refund of {refund} failed: {reason}")]
    PartialFailure {
        order_id: String,
        captured: Decimal,
        refund: Decimal,
        reason: String,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("no completed payment is attached to order {0}")]
    PaymentNotFound(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("cannot move {kind} from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("notification error: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, SnazzError>;
