//! Error taxonomy for the booking core (§7, §9).
//!
//! Activities classify failures with a tagged [`ActivityError`] instead of
//! string matching, per the design notes' re-architecture guidance.

use thiserror::Error;

use crate::types::{FlightId, OrderId, SeatCode};

/// Error returned by an activity, tagged by retryability so the workflow
/// loop can decide whether to retry without inspecting message strings.
#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    /// Transient failure; the caller's retry policy should retry.
    #[error("retryable: {0}")]
    Retryable(String),
    /// Terminal failure; retrying would not change the outcome.
    #[error("non-retryable [{kind}]: {message}")]
    NonRetryable {
        /// Machine-readable failure kind, e.g. `SEATS_UNAVAILABLE`.
        kind: String,
        /// Human-readable detail.
        message: String,
    },
}

impl ActivityError {
    /// Builds a non-retryable error with the given kind tag.
    #[must_use]
    pub fn non_retryable(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NonRetryable {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// True if the workflow's retry loop should attempt this activity again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Errors from the advisory lock store (C1).
#[derive(Debug, Clone, Error)]
pub enum LockStoreError {
    /// A seat lock is held by another order.
    #[error("seat {flight_id}/{seat_code} held by another order")]
    Conflict {
        /// Flight the seat belongs to.
        flight_id: FlightId,
        /// Conflicting seat code.
        seat_code: SeatCode,
    },
    /// The backing store (Redis, or in-memory map) returned an error.
    #[error("lock store backend error: {0}")]
    Backend(String),
}

impl From<LockStoreError> for ActivityError {
    fn from(err: LockStoreError) -> Self {
        match err {
            LockStoreError::Conflict { .. } => {
                Self::non_retryable("SEATS_UNAVAILABLE", err.to_string())
            }
            LockStoreError::Backend(message) => Self::Retryable(message),
        }
    }
}

/// Errors from the authoritative order/seat relational store (C2).
#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    /// A requested seat was not `available` when conditionally reserving it.
    #[error("seats unavailable for flight {flight_id}: {seats:?}")]
    SeatsUnavailable {
        /// Flight the seats belong to.
        flight_id: FlightId,
        /// The seats that could not be reserved.
        seats: Vec<SeatCode>,
    },
    /// Order row does not exist.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    /// Flight row does not exist.
    #[error("flight {0} not found")]
    FlightNotFound(FlightId),
    /// An illegal status transition was attempted (should never occur).
    #[error("illegal order transition for {order_id}: {from} -> {to}")]
    IllegalTransition {
        /// Order id.
        order_id: OrderId,
        /// Current status.
        from: String,
        /// Attempted status.
        to: String,
    },
    /// The backing database returned an error.
    #[error("order store backend error: {0}")]
    Backend(String),
}

impl From<OrderStoreError> for ActivityError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::SeatsUnavailable { .. } => {
                Self::non_retryable("SEATS_UNAVAILABLE", err.to_string())
            }
            OrderStoreError::OrderNotFound(_) => {
                Self::non_retryable("ORDER_NOT_FOUND", err.to_string())
            }
            OrderStoreError::FlightNotFound(_) => {
                Self::non_retryable("FLIGHT_NOT_FOUND", err.to_string())
            }
            OrderStoreError::IllegalTransition { .. } => {
                Self::non_retryable("WORKFLOW_ERROR", err.to_string())
            }
            OrderStoreError::Backend(message) => Self::Retryable(message),
        }
    }
}

/// Errors from payment validation (C7, §4.5).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentError {
    /// Payment code was not exactly five decimal digits.
    #[error("invalid payment code")]
    InvalidFormat,
    /// Simulator returned the canonical decline code `00000`.
    #[error("payment declined")]
    Declined,
    /// Simulated transient gateway failure.
    #[error("transient gateway error")]
    GatewayTransient,
}

impl PaymentError {
    /// Only `GatewayTransient` is retryable within the workflow's bounded
    /// payment retry loop (§4.4 step 4).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayTransient)
    }
}

impl From<PaymentError> for ActivityError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::GatewayTransient => Self::Retryable(err.to_string()),
            PaymentError::InvalidFormat => Self::non_retryable("INVALID_PAYMENT_CODE", err.to_string()),
            PaymentError::Declined => Self::non_retryable("PAYMENT_DECLINED", err.to_string()),
        }
    }
}

/// Top-level workflow error returned from a closed workflow run (§4.4).
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// Hold timer fired before payment was submitted.
    #[error("order {0} expired before payment")]
    Expired(OrderId),
    /// User sent `cancel-booking`.
    #[error("order {0} canceled by user")]
    Canceled(OrderId),
    /// Payment validation failed terminally.
    #[error("order {order_id} payment failed: {reason}")]
    PaymentFailed {
        /// Order id.
        order_id: OrderId,
        /// Terminal failure detail.
        reason: String,
    },
    /// A reserve or confirm activity failed.
    #[error("order {order_id} activity failed: {source}")]
    ActivityFailed {
        /// Order id.
        order_id: OrderId,
        /// Underlying activity error.
        #[source]
        source: ActivityError,
    },
}

/// Error from signaling a workflow instance: either the order never
/// existed, or a workflow for it exists (live or persisted) but is no
/// longer accepting signals.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    /// Neither a live instance nor a persisted row exists for this order.
    #[error(transparent)]
    Order(#[from] OrderStoreError),
    /// The workflow has already closed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// HTTP-facing error codes from §6's error body table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// Malformed request body.
    InvalidRequest,
    /// Requested seats are malformed or empty where not permitted.
    InvalidSeats,
    /// No such flight.
    FlightNotFound,
    /// No such order.
    OrderNotFound,
    /// Order's hold/payment window has elapsed.
    OrderExpired,
    /// Seats are held by another order.
    SeatsUnavailable,
    /// Payment validation failed.
    PaymentFailed,
    /// Workflow-level error, not otherwise classified.
    WorkflowError,
    /// Anything else.
    InternalError,
}

impl ApiErrorCode {
    /// Wire string for the `error` field of §6's error body.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidSeats => "INVALID_SEATS",
            Self::FlightNotFound => "FLIGHT_NOT_FOUND",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::OrderExpired => "ORDER_EXPIRED",
            Self::SeatsUnavailable => "SEATS_UNAVAILABLE",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::WorkflowError => "WORKFLOW_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}
