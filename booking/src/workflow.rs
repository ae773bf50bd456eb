//! Durable booking state machine (C4, §4.4).
//!
//! Modeled as a [`Reducer`]: `reduce` is a pure function of `(state, action,
//! environment)` that mutates `state` in place and returns the [`Effect`]s
//! the runtime must perform. Side effects (activities, the hold timer) never
//! run inline — this is what makes replay (P9) just "call `reduce` again and
//! throw the effects away".
//!
//! The hold-phase timer is an `Effect::Delay` tagged with the `expires_at`
//! it was computed for; `HoldTimerFired` carries that same tag, and
//! [`BookingReducer::reduce`] ignores a fire whose tag no longer matches the
//! live deadline (§4.4 "cancel before scheduling the next one").

use std::sync::Arc;
use std::time::Duration as StdDuration;

use booking_core::effect::Effect;
use booking_core::environment::Clock;
use booking_core::reducer::Reducer;
use booking_macros::Action;
use chrono::{DateTime, Utc};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};

use crate::activities;
use crate::errors::{ActivityError, WorkflowError};
use crate::lock_store::LockStore;
use crate::order_store::OrderStore;
use crate::payment_simulator::PaymentSimulator;
use crate::types::{FailureKind, FlightId, Order, OrderId, OrderStatus, SeatCode};

/// Commands and events for one order's booking workflow.
#[derive(Clone, Debug, Action)]
pub enum BookingAction {
    /// Starts the workflow (§4.4 step 1): reserve, then enter the hold loop.
    #[command]
    Start {
        /// Order id (generated by the facade before the workflow starts).
        order_id: OrderId,
        /// Flight reference.
        flight_id: FlightId,
        /// Initial requested seats.
        seats: Vec<SeatCode>,
        /// Unit price at the time of the request, to compute total price.
        unit_price: crate::types::Money,
    },
    /// `update-seats` signal.
    #[command]
    UpdateSeats {
        /// Replacement seat set. An empty list releases all seats while
        /// staying in `SEATS_RESERVED` (Q1; rejected at the HTTP layer
        /// instead, per the decision recorded in `DESIGN.md`).
        seats: Vec<SeatCode>,
    },
    /// `proceed-to-payment` signal.
    #[command]
    ProceedToPayment {
        /// Five-digit payment code.
        payment_code: String,
    },
    /// `cancel-booking` signal.
    #[command]
    CancelBooking,
    /// Hold timer fire, tagged with the deadline it was scheduled against.
    #[command]
    HoldTimerFired {
        /// The `expires_at` this timer was created for.
        tagged_expires_at: DateTime<Utc>,
    },

    /// Reserve phase completed successfully.
    #[event]
    Reserved {
        /// Computed initial deadline.
        expires_at: DateTime<Utc>,
    },
    /// Reserve phase failed; workflow is about to fail.
    #[event]
    ReserveFailed {
        /// Classified activity error.
        reason: String,
    },
    /// `UpdateSeatSelection` succeeded; new seats become current.
    #[event]
    SeatsUpdated {
        /// Accepted seat set.
        seats: Vec<SeatCode>,
        /// New deadline.
        expires_at: DateTime<Utc>,
    },
    /// `UpdateSeatSelection` failed; old seats remain current.
    #[event]
    SeatUpdateFailed {
        /// Human-readable reason, recorded as `last_error`.
        reason: String,
    },
    /// One payment attempt finished.
    #[event]
    PaymentAttempted {
        /// Outcome of this attempt.
        outcome: PaymentOutcome,
    },
    /// Confirm phase completed.
    #[event]
    Confirmed {
        /// Confirmation timestamp.
        confirmed_at: DateTime<Utc>,
    },
    /// Workflow reached a terminal `FAILED` state.
    #[event]
    Failed {
        /// Failure reason recorded on the order row.
        reason: String,
    },
    /// Workflow reached a terminal `EXPIRED` state.
    #[event]
    Expired,
}

/// Outcome of a single `ValidatePayment` attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Payment accepted.
    Success,
    /// Transient failure; may retry if attempts remain.
    RetryableFailure(String),
    /// Terminal failure; no further attempts.
    NonRetryableFailure(String),
}

/// Workflow-visible lifecycle phase, coarser than [`OrderStatus`] only in
/// that it additionally distinguishes "not yet started".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Reserve phase in flight.
    Reserving,
    /// Hold-phase wait loop is active.
    Holding,
    /// Payment phase in flight.
    Paying,
    /// Terminal.
    Done,
}

/// In-memory workflow state for one order.
#[derive(Clone, Debug)]
pub struct BookingState {
    /// Order id.
    pub order_id: OrderId,
    /// Flight reference.
    pub flight_id: FlightId,
    /// Current seat set.
    pub seats: Vec<SeatCode>,
    /// Current order status (mirrors the persisted row).
    pub status: OrderStatus,
    /// Current hold/payment deadline.
    pub expires_at: DateTime<Utc>,
    /// Total price for the current seat set.
    pub total_price: crate::types::Money,
    /// Number of payment attempts made so far.
    pub payment_attempts: u32,
    /// Most recent non-fatal error, surfaced via the query handler.
    pub last_error: Option<String>,
    /// Current phase.
    pub phase: Phase,
    /// Set once `Confirmed` is applied.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Set once a terminal failure/expiry is applied.
    pub failure_reason: Option<String>,
    /// Set alongside `failure_reason` when `fail()` runs; tags *why* rather
    /// than leaving callers to re-derive it from the reason text (§9).
    pub failure_kind: Option<FailureKind>,
    /// Payment code supplied by `proceed-to-payment`, retained across the
    /// bounded retry loop so a retryable failure can re-attempt with the
    /// same code.
    pending_payment_code: Option<String>,
}

impl BookingState {
    /// Starting state before the `Start` command has been applied.
    #[must_use]
    pub fn new(order_id: OrderId, flight_id: FlightId) -> Self {
        Self {
            order_id,
            flight_id,
            seats: Vec::new(),
            status: OrderStatus::Created,
            expires_at: Utc::now(),
            total_price: crate::types::Money::from_cents(0),
            payment_attempts: 0,
            last_error: None,
            phase: Phase::Reserving,
            confirmed_at: None,
            failure_reason: None,
            failure_kind: None,
            pending_payment_code: None,
        }
    }

    /// Snapshot returned by the query handler (§4.4 "Entry").
    #[must_use]
    pub fn query(&self, engine_now: DateTime<Utc>) -> BookingStatus {
        let remaining = (self.expires_at - engine_now).num_seconds().max(0);
        BookingStatus {
            order_id: self.order_id,
            flight_id: self.flight_id,
            status: self.status,
            seats: self.seats.clone(),
            expires_at: self.expires_at,
            #[allow(clippy::cast_sign_loss)]
            timer_remaining_seconds: remaining as u64,
            payment_attempts: self.payment_attempts,
            last_error: self.last_error.clone(),
        }
    }
}

/// Query-handler response shape (§4.4, §4.6).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatus {
    /// Order id.
    pub order_id: OrderId,
    /// Flight reference.
    pub flight_id: FlightId,
    /// Current status.
    pub status: OrderStatus,
    /// Current seats.
    pub seats: Vec<SeatCode>,
    /// Current deadline.
    pub expires_at: DateTime<Utc>,
    /// `max(0, expires_at - engine_now)`.
    pub timer_remaining_seconds: u64,
    /// Payment attempts so far.
    pub payment_attempts: u32,
    /// Most recent non-fatal error.
    pub last_error: Option<String>,
}

/// Injected dependencies for the booking reducer.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Engine clock (swappable for tests).
    pub clock: Arc<dyn Clock>,
    /// Advisory lock store (C1).
    pub lock_store: Arc<dyn LockStore>,
    /// Authoritative order store (C2).
    pub order_store: Arc<dyn OrderStore>,
    /// Payment simulator (C7).
    pub payment_simulator: Arc<dyn PaymentSimulator>,
    /// Hold duration (canonical 15 min).
    pub hold_duration: chrono::Duration,
    /// Lock TTL: hold duration + buffer (§4.1, §9).
    pub lock_ttl: StdDuration,
    /// Max payment attempts (canonical 3).
    pub payment_max_attempts: u32,
    /// Base backoff between payment attempts; attempt `n` sleeps `n * base`.
    pub payment_backoff_base: StdDuration,
    /// Single payment attempt deadline (canonical 10s).
    pub payment_attempt_deadline: StdDuration,
}

/// The booking workflow's reducer: the pure state machine described in §4.4.
#[derive(Clone, Default)]
pub struct BookingReducer;

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::Start {
                order_id,
                flight_id,
                seats,
                unit_price,
            } => {
                #[allow(clippy::cast_possible_truncation)]
                let total_price = unit_price.multiply(seats.len() as u32);
                state.order_id = order_id;
                state.flight_id = flight_id;
                state.seats = seats.clone();
                state.total_price = total_price;
                state.phase = Phase::Reserving;

                let now = env.clock.now();
                let expires_at = now + env.hold_duration;

                let lock_store = Arc::clone(&env.lock_store);
                let order_store = Arc::clone(&env.order_store);
                let lock_ttl = env.lock_ttl;
                let order = Order {
                    id: order_id,
                    flight_id,
                    workflow_id: order_id.workflow_id(),
                    status: OrderStatus::SeatsReserved,
                    seats: seats.clone(),
                    total_price,
                    expires_at,
                    confirmed_at: None,
                    failure_reason: None,
                    failure_kind: None,
                    payment_attempts: 0,
                };

                smallvec![Effect::Future(Box::pin(async move {
                    if let Err(err) = activities::create_order(&*order_store, order).await {
                        return Some(BookingAction::ReserveFailed { reason: err.to_string() });
                    }
                    match activities::reserve_seats(&*lock_store, &*order_store, flight_id, seats, order_id, lock_ttl).await {
                        Ok(()) => Some(BookingAction::Reserved { expires_at }),
                        Err(err) => Some(BookingAction::ReserveFailed { reason: err.to_string() }),
                    }
                }))]
            }

            BookingAction::Reserved { expires_at } => {
                state.status = OrderStatus::SeatsReserved;
                state.expires_at = expires_at;
                state.phase = Phase::Holding;
                smallvec![self.schedule_hold_timer(env, expires_at)]
            }

            BookingAction::ReserveFailed { reason } => {
                smallvec![self.fail(state, env, reason, FailureKind::Activity)]
            }

            BookingAction::HoldTimerFired { tagged_expires_at } => {
                if state.phase != Phase::Holding || tagged_expires_at != state.expires_at {
                    // Stale timer from a since-superseded deadline; ignore.
                    return smallvec![Effect::None];
                }
                smallvec![self.expire(state, env)]
            }

            BookingAction::UpdateSeats { seats: new_seats } => {
                if state.phase != Phase::Holding {
                    return smallvec![Effect::None];
                }
                let order_id = state.order_id;
                let flight_id = state.flight_id;
                let old_seats = state.seats.clone();
                let new_deadline = env.clock.now() + env.hold_duration;
                let lock_store = Arc::clone(&env.lock_store);
                let order_store = Arc::clone(&env.order_store);
                let lock_ttl = env.lock_ttl;

                smallvec![Effect::Future(Box::pin(async move {
                    match activities::update_seat_selection(
                        &*lock_store,
                        &*order_store,
                        flight_id,
                        order_id,
                        old_seats,
                        new_seats.clone(),
                        lock_ttl,
                    )
                    .await
                    {
                        Ok(()) => {
                            if let Err(err) =
                                activities::update_order_seats(&*order_store, order_id, new_seats.clone(), new_deadline).await
                            {
                                return Some(BookingAction::SeatUpdateFailed { reason: err.to_string() });
                            }
                            Some(BookingAction::SeatsUpdated {
                                seats: new_seats,
                                expires_at: new_deadline,
                            })
                        }
                        Err(err) => Some(BookingAction::SeatUpdateFailed { reason: err.to_string() }),
                    }
                }))]
            }

            BookingAction::SeatsUpdated { seats, expires_at } => {
                state.seats = seats;
                state.expires_at = expires_at;
                state.last_error = None;
                smallvec![self.schedule_hold_timer(env, expires_at)]
            }

            BookingAction::SeatUpdateFailed { reason } => {
                state.last_error = Some(reason);
                // Current seats/expires_at are untouched; re-arm the existing timer.
                smallvec![self.schedule_hold_timer(env, state.expires_at)]
            }

            BookingAction::ProceedToPayment { payment_code } => {
                if state.phase != Phase::Holding {
                    return smallvec![Effect::None];
                }
                state.phase = Phase::Paying;
                state.status = OrderStatus::PaymentProcessing;
                state.pending_payment_code = Some(payment_code.clone());
                let order_id = state.order_id;
                let order_store = Arc::clone(&env.order_store);

                smallvec![Effect::Future(Box::pin(async move {
                    let _ = activities::update_order_status(&*order_store, order_id, OrderStatus::PaymentProcessing).await;
                    None
                })), self.attempt_payment(env, payment_code, 1)]
            }

            BookingAction::CancelBooking => {
                if state.phase == Phase::Done {
                    return smallvec![Effect::None];
                }
                smallvec![self.fail(state, env, "canceled by user".to_string(), FailureKind::Canceled)]
            }

            BookingAction::PaymentAttempted { outcome } => {
                state.payment_attempts += 1;
                match outcome {
                    PaymentOutcome::Success => {
                        state.last_error = None;
                        smallvec![self.confirm(state, env)]
                    }
                    PaymentOutcome::NonRetryableFailure(reason) => {
                        smallvec![self.fail(state, env, reason, FailureKind::Payment)]
                    }
                    PaymentOutcome::RetryableFailure(reason) => {
                        state.last_error = Some(reason.clone());
                        if state.payment_attempts >= env.payment_max_attempts {
                            return smallvec![self.fail(state, env, reason, FailureKind::Payment)];
                        }
                        let code = state.pending_payment_code.clone().unwrap_or_default();
                        let next_attempt = state.payment_attempts + 1;
                        smallvec![self.attempt_payment(env, code, next_attempt)]
                    }
                }
            }

            BookingAction::Confirmed { confirmed_at } => {
                state.status = OrderStatus::Confirmed;
                state.confirmed_at = Some(confirmed_at);
                state.phase = Phase::Done;
                smallvec![Effect::None]
            }

            BookingAction::Failed { reason } => {
                state.status = OrderStatus::Failed;
                state.failure_reason = Some(reason);
                state.failure_kind = Some(FailureKind::Activity);
                state.phase = Phase::Done;
                smallvec![Effect::None]
            }

            BookingAction::Expired => {
                state.status = OrderStatus::Expired;
                state.phase = Phase::Done;
                smallvec![Effect::None]
            }
        }
    }
}

impl BookingReducer {
    /// B1: a zero (or already-elapsed) hold duration falls out of this as a
    /// zero-length `Effect::Delay`, which fires on the next tick — so a
    /// zero-duration order still gets `CreateOrder`/`ReserveSeats` run for it
    /// before it expires, rather than short-circuiting before either runs.
    fn schedule_hold_timer(&self, env: &BookingEnvironment, expires_at: DateTime<Utc>) -> Effect<BookingAction> {
        let remaining = (expires_at - env.clock.now()).to_std().unwrap_or(StdDuration::ZERO);
        Effect::Delay {
            duration: remaining,
            action: Box::new(BookingAction::HoldTimerFired { tagged_expires_at: expires_at }),
        }
    }

    /// Compensation + terminal `FAILED` transition, run on every non-happy
    /// exit (§4.4 step 6). Seats release runs regardless of cancellation
    /// because it is its own detached effect, not nested inside the
    /// triggering command's context.
    fn fail(&self, state: &mut BookingState, env: &BookingEnvironment, reason: String, kind: FailureKind) -> Effect<BookingAction> {
        state.status = OrderStatus::Failed;
        state.failure_reason = Some(reason.clone());
        state.failure_kind = Some(kind);
        state.phase = Phase::Done;

        let lock_store = Arc::clone(&env.lock_store);
        let order_store = Arc::clone(&env.order_store);
        let flight_id = state.flight_id;
        let order_id = state.order_id;
        let seats = state.seats.clone();

        Effect::Future(Box::pin(async move {
            // The order row may not exist yet if cancellation races the
            // reserve phase's CreateOrder activity; ignore that case.
            let _ = activities::fail_order(&*order_store, order_id, reason.clone(), kind).await;
            let _ = activities::release_seats(&*lock_store, &*order_store, flight_id, seats, order_id).await;
            None
        }))
    }

    fn expire(&self, state: &mut BookingState, env: &BookingEnvironment) -> Effect<BookingAction> {
        state.status = OrderStatus::Expired;
        state.phase = Phase::Done;

        let lock_store = Arc::clone(&env.lock_store);
        let order_store = Arc::clone(&env.order_store);
        let flight_id = state.flight_id;
        let order_id = state.order_id;
        let seats = state.seats.clone();

        Effect::Future(Box::pin(async move {
            let _ = activities::expire_order(&*order_store, order_id).await;
            let _ = activities::release_seats(&*lock_store, &*order_store, flight_id, seats, order_id).await;
            None
        }))
    }

    fn confirm(&self, state: &mut BookingState, env: &BookingEnvironment) -> Effect<BookingAction> {
        let lock_store = Arc::clone(&env.lock_store);
        let order_store = Arc::clone(&env.order_store);
        let flight_id = state.flight_id;
        let order_id = state.order_id;
        let seats = state.seats.clone();
        let now = env.clock.now();

        Effect::Future(Box::pin(async move {
            match activities::confirm_order(&*lock_store, &*order_store, flight_id, order_id, seats, now).await {
                Ok(()) => Some(BookingAction::Confirmed { confirmed_at: now }),
                Err(err) => Some(BookingAction::Failed { reason: err.to_string() }),
            }
        }))
    }

    /// Runs one payment attempt, sleeping `attempt * backoff_base` before it
    /// if `attempt > 1` (§4.4 step 4: "1s, then 2s").
    fn attempt_payment(&self, env: &BookingEnvironment, payment_code: String, attempt: u32) -> Effect<BookingAction> {
        let simulator = Arc::clone(&env.payment_simulator);
        let deadline = env.payment_attempt_deadline;
        let backoff = env.payment_backoff_base.saturating_mul(attempt.saturating_sub(1));

        Effect::Future(Box::pin(async move {
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
            let outcome = match activities::validate_payment(&simulator, &payment_code, deadline).await {
                Ok(()) => PaymentOutcome::Success,
                Err(ActivityError::Retryable(reason)) => PaymentOutcome::RetryableFailure(reason),
                Err(ActivityError::NonRetryable { message, .. }) => PaymentOutcome::NonRetryableFailure(message),
            };
            Some(BookingAction::PaymentAttempted { outcome })
        }))
    }
}

/// Shared by [`terminal_error`] (live state) and [`terminal_error_for_order`]
/// (the persisted row, once a workflow instance has closed) — both read the
/// same `status`/`failure_kind`/`failure_reason` triple, just from different
/// sources.
fn workflow_error_for(
    order_id: OrderId,
    status: OrderStatus,
    failure_kind: Option<FailureKind>,
    failure_reason: Option<String>,
) -> Option<WorkflowError> {
    match status {
        OrderStatus::Confirmed => None,
        OrderStatus::Expired => Some(WorkflowError::Expired(order_id)),
        OrderStatus::Failed => Some(match failure_kind {
            Some(FailureKind::Canceled) => WorkflowError::Canceled(order_id),
            Some(FailureKind::Payment) => WorkflowError::PaymentFailed {
                order_id,
                reason: failure_reason.unwrap_or_default(),
            },
            Some(FailureKind::Activity) | None => WorkflowError::ActivityFailed {
                order_id,
                source: ActivityError::non_retryable("ACTIVITY_FAILED", failure_reason.unwrap_or_default()),
            },
        }),
        _ => None,
    }
}

/// Converts a workflow-level terminal state into the [`WorkflowError`] the
/// facade surfaces when a run did not confirm (§4.4).
#[must_use]
pub fn terminal_error(state: &BookingState) -> Option<WorkflowError> {
    workflow_error_for(state.order_id, state.status, state.failure_kind, state.failure_reason.clone())
}

/// Same as [`terminal_error`], read from a persisted [`Order`] row instead
/// of live state — used once a workflow instance has been evicted (§4.6).
#[must_use]
pub fn terminal_error_for_order(order: &Order) -> Option<WorkflowError> {
    workflow_error_for(order.id, order.status, order.failure_kind, order.failure_reason.clone())
}
