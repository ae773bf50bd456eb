//! Idempotent side-effectful steps invoked by the workflow (C3, §4.3).
//!
//! Each function here owns exactly one compensating-rollback concern and
//! returns a tagged [`ActivityError`] so the workflow's retry loop never has
//! to match on message strings. Transient store errors are retried in place
//! with [`RetryPolicy`]; retrying is safe because every verb below is
//! idempotent at the level of its intended post-state.

use std::sync::Arc;
use std::time::Duration;

use booking_runtime::RetryPolicy;

use crate::errors::ActivityError;
use crate::lock_store::LockStore;
use crate::order_store::OrderStore;
use crate::payment_simulator::PaymentSimulator;
use crate::types::{FailureKind, FlightId, Order, OrderId, OrderStatus, SeatCode};

/// Seat-touching activities retry up to 3 times with 1s->10s exponential
/// backoff, per §5's "Seat activities" cancellation/timeout table.
fn seat_retry_policy() -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(10))
}

async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut f: F) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ActivityError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Acquires lock entries with TTL, then marks seat rows reserved. Rolls back
/// locks if the DB step fails; makes no DB changes if the lock step fails.
///
/// # Errors
///
/// Returns `ActivityError::NonRetryable` with kind `SEATS_UNAVAILABLE` if any
/// seat is held by another order or is not `available`.
pub async fn reserve_seats(
    lock_store: &dyn LockStore,
    order_store: &dyn OrderStore,
    flight_id: FlightId,
    seats: Vec<SeatCode>,
    order_id: OrderId,
    lock_ttl: Duration,
) -> Result<(), ActivityError> {
    let policy = seat_retry_policy();

    with_retry(&policy, || async {
        lock_store
            .lock_seats(flight_id, seats.clone(), order_id, lock_ttl)
            .await
            .map_err(ActivityError::from)
    })
    .await?;

    match order_store.mark_seats_reserved(flight_id, seats.clone(), order_id).await {
        Ok(()) => Ok(()),
        Err(db_err) => {
            let _ = lock_store.release_seats(flight_id, seats, order_id).await;
            Err(ActivityError::from(db_err))
        }
    }
}

/// Compare-and-delete locks, then unconditionally frees seat rows. Safe to
/// call repeatedly, and safe when some seats are already released (P8).
///
/// # Errors
///
/// Returns `ActivityError::Retryable` on a lock-store or DB backend error.
pub async fn release_seats(
    lock_store: &dyn LockStore,
    order_store: &dyn OrderStore,
    flight_id: FlightId,
    seats: Vec<SeatCode>,
    order_id: OrderId,
) -> Result<(), ActivityError> {
    let policy = seat_retry_policy();
    with_retry(&policy, || async {
        lock_store
            .release_seats(flight_id, seats.clone(), order_id)
            .await
            .map_err(ActivityError::from)
    })
    .await?;
    with_retry(&policy, || async {
        order_store
            .mark_seats_available(flight_id, seats.clone())
            .await
            .map_err(ActivityError::from)
    })
    .await
}

/// Best-effort atomic swap: releases `old_seats`, acquires `new_seats`. If
/// acquiring the new set fails at any stage, re-acquires `old_seats` and
/// reports failure; the workflow then keeps `old_seats` as its state (§4.3).
///
/// # Errors
///
/// Returns the error from acquiring `new_seats`, after the old set has been
/// (best-effort) restored.
pub async fn update_seat_selection(
    lock_store: &dyn LockStore,
    order_store: &dyn OrderStore,
    flight_id: FlightId,
    order_id: OrderId,
    old_seats: Vec<SeatCode>,
    new_seats: Vec<SeatCode>,
    lock_ttl: Duration,
) -> Result<(), ActivityError> {
    release_seats(lock_store, order_store, flight_id, old_seats.clone(), order_id).await?;

    match reserve_seats(lock_store, order_store, flight_id, new_seats, order_id, lock_ttl).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = reserve_seats(lock_store, order_store, flight_id, old_seats, order_id, lock_ttl).await;
            Err(err)
        }
    }
}

/// Inserts the order row in `SEATS_RESERVED`.
///
/// # Errors
///
/// Returns `ActivityError::Retryable` on a backend error.
pub async fn create_order(order_store: &dyn OrderStore, order: Order) -> Result<(), ActivityError> {
    with_retry(&seat_retry_policy(), || async {
        order_store.create_order(order.clone()).await.map_err(ActivityError::from)
    })
    .await
}

/// Replaces the order's seat list and expiry deadline.
///
/// # Errors
///
/// Returns `ActivityError::Retryable` on a backend error.
pub async fn update_order_seats(
    order_store: &dyn OrderStore,
    order_id: OrderId,
    seats: Vec<SeatCode>,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), ActivityError> {
    with_retry(&seat_retry_policy(), || async {
        order_store
            .update_seats_and_expiry(order_id, seats.clone(), expires_at)
            .await
            .map_err(ActivityError::from)
    })
    .await
}

/// Writes a new order status, honoured only for legal transitions.
///
/// # Errors
///
/// Returns `ActivityError::NonRetryable` with kind `WORKFLOW_ERROR` if the
/// transition is illegal; should never occur in practice.
pub async fn update_order_status(
    order_store: &dyn OrderStore,
    order_id: OrderId,
    status: OrderStatus,
) -> Result<(), ActivityError> {
    with_retry(&seat_retry_policy(), || async {
        order_store.update_status(order_id, status).await.map_err(ActivityError::from)
    })
    .await
}

/// Terminal write: `EXPIRED`.
///
/// # Errors
///
/// Returns `ActivityError::Retryable` on a backend error.
pub async fn expire_order(order_store: &dyn OrderStore, order_id: OrderId) -> Result<(), ActivityError> {
    with_retry(&seat_retry_policy(), || async {
        order_store.expire(order_id).await.map_err(ActivityError::from)
    })
    .await
}

/// Terminal write: `FAILED`, with a reason.
///
/// # Errors
///
/// Returns `ActivityError::Retryable` on a backend error.
pub async fn fail_order(
    order_store: &dyn OrderStore,
    order_id: OrderId,
    reason: String,
    kind: FailureKind,
) -> Result<(), ActivityError> {
    with_retry(&seat_retry_policy(), || async {
        order_store.fail(order_id, reason.clone(), kind).await.map_err(ActivityError::from)
    })
    .await
}

/// Books seat rows, decrements the flight counter, and releases lock
/// entries, since seats are now booked rather than held (§4.3).
///
/// # Errors
///
/// Returns `ActivityError::Retryable` if either the booking transaction or
/// the subsequent lock release fails (Q2: the order may be left `CONFIRMED`
/// with a briefly lingering lock entry; the reconciler repairs this).
pub async fn confirm_order(
    lock_store: &dyn LockStore,
    order_store: &dyn OrderStore,
    flight_id: FlightId,
    order_id: OrderId,
    seats: Vec<SeatCode>,
    confirmed_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), ActivityError> {
    with_retry(&seat_retry_policy(), || async {
        order_store.book_seats(flight_id, seats.clone(), order_id).await.map_err(ActivityError::from)
    })
    .await?;

    with_retry(&seat_retry_policy(), || async {
        order_store.confirm(order_id, confirmed_at).await.map_err(ActivityError::from)
    })
    .await?;

    let _ = lock_store.release_seats(flight_id, seats, order_id).await;
    Ok(())
}

/// Validates a payment code via the simulator (C7), enforcing the single
/// attempt's 10s start-to-close deadline (§4.5, §5).
///
/// # Errors
///
/// Returns `ActivityError::Retryable` if the deadline elapses or the
/// simulator returns a transient error; `ActivityError::NonRetryable`
/// otherwise.
pub async fn validate_payment(
    simulator: &Arc<dyn PaymentSimulator>,
    code: &str,
    deadline: Duration,
) -> Result<(), ActivityError> {
    match tokio::time::timeout(deadline, simulator.validate(code)).await {
        Ok(result) => result.map_err(ActivityError::from),
        Err(_) => Err(ActivityError::Retryable("payment validation timed out".to_string())),
    }
}
