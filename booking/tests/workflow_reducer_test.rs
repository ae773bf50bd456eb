//! Booking workflow integration tests.
//!
//! Exercises [`BookingReducer`] directly with [`ReducerTest`], the same
//! given/when/then harness used for unit-level reducer testing. Effects are
//! inspected by shape (count, `Future` vs `Delay`) rather than executed,
//! since `reduce` itself never performs I/O.

use std::sync::Arc;
use std::time::Duration;

use booking::errors::ActivityError;
use booking::lock_store::InMemoryLockStore;
use booking::order_store::memory::InMemoryOrderStore;
use booking::payment_simulator::DefaultPaymentSimulator;
use booking::types::{FlightId, Money, OrderStatus, SeatCode};
use booking::workflow::{BookingAction, BookingEnvironment, BookingReducer, BookingState, Phase, PaymentOutcome};
use booking_core::effect::Effect;
use booking_testing::{FixedClock, ReducerTest};
use chrono::Utc;

fn env(clock: Arc<FixedClock>, hold_duration: chrono::Duration) -> BookingEnvironment {
    BookingEnvironment {
        clock,
        lock_store: Arc::new(InMemoryLockStore::new()),
        order_store: Arc::new(InMemoryOrderStore::new()),
        payment_simulator: DefaultPaymentSimulator::shared(0.0),
        hold_duration,
        lock_ttl: Duration::from_secs(16 * 60),
        payment_max_attempts: 3,
        payment_backoff_base: Duration::from_secs(1),
        payment_attempt_deadline: Duration::from_secs(10),
    }
}

fn fifteen_minute_env(clock: Arc<FixedClock>) -> BookingEnvironment {
    env(clock, chrono::Duration::minutes(15))
}

#[test]
fn start_dispatches_reserve_activity_and_enters_reserving() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(BookingState::new(order_id, flight_id))
        .when_action(BookingAction::Start {
            order_id,
            flight_id,
            seats: vec![SeatCode::new("1A"), SeatCode::new("1B")],
            unit_price: Money::from_cents(5_000),
        })
        .then_state(|state| {
            assert_eq!(state.phase, Phase::Reserving);
            assert_eq!(state.total_price, Money::from_cents(10_000));
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert!(matches!(effects[0], Effect::Future(_)));
        })
        .run();
}

/// B1 (a zero/elapsed hold duration still reaches `Expired` only after the
/// order row and seat lock exist) needs the full `Store`+`BookingFacade`
/// pipeline to verify the order row is actually written, not just the
/// in-memory state transition — see `facade::tests::zero_hold_duration_still_persists_order_before_expiring`.
///
/// `Start` always dispatches the reserve activity first; a zero hold
/// duration falls out of `schedule_hold_timer` as a zero-length `Effect::Delay`
/// that fires on the very next tick, rather than a branch taken before the
/// reserve activity runs.
#[test]
fn start_reaches_holding_even_with_zero_hold_duration() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();

    ReducerTest::new(BookingReducer)
        .with_env(env(clock, chrono::Duration::zero()))
        .given_state(BookingState::new(order_id, flight_id))
        .when_action(BookingAction::Start {
            order_id,
            flight_id,
            seats: vec![SeatCode::new("1A")],
            unit_price: Money::from_cents(5_000),
        })
        .then_state(|state| {
            assert_eq!(state.phase, Phase::Reserving, "reserve activity dispatched before any expiry");
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert!(matches!(effects[0], Effect::Future(_)));
        })
        .run();
}

/// `Reserved` moves the state into the hold loop and arms the timer.
#[test]
fn reserved_enters_holding_and_schedules_timer() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.seats = vec![SeatCode::new("1A")];

    let expires_at = clock.now() + chrono::Duration::minutes(15);

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::Reserved { expires_at })
        .then_state(move |state| {
            assert_eq!(state.phase, Phase::Holding);
            assert_eq!(state.status, OrderStatus::SeatsReserved);
            assert_eq!(state.expires_at, expires_at);
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert!(matches!(effects[0], Effect::Delay { .. }));
        })
        .run();
}

/// A `HoldTimerFired` whose tag no longer matches the live deadline (because
/// a seat update re-armed the timer in between) is ignored (§4.4).
#[test]
fn stale_hold_timer_is_ignored() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Holding;
    state.expires_at = clock.now() + chrono::Duration::minutes(20);
    let stale_tag = clock.now() + chrono::Duration::minutes(15);

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::HoldTimerFired { tagged_expires_at: stale_tag })
        .then_state(|state| {
            assert_eq!(state.phase, Phase::Holding, "stale timer must not expire the order");
        })
        .then_effects(|effects| {
            assert!(matches!(effects[0], Effect::None));
        })
        .run();
}

/// A `HoldTimerFired` whose tag matches the live deadline expires the order
/// and releases its seats.
#[test]
fn matching_hold_timer_expires_order() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Holding;
    state.expires_at = clock.now() + chrono::Duration::minutes(15);
    let tag = state.expires_at;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::HoldTimerFired { tagged_expires_at: tag })
        .then_state(|state| {
            assert_eq!(state.status, OrderStatus::Expired);
            assert_eq!(state.phase, Phase::Done);
        })
        .run();
}

/// `update-seats` while holding resets the deadline once the activity
/// reports success (tested via the `SeatsUpdated` event it dispatches).
#[test]
fn seats_updated_resets_deadline_and_clears_last_error() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Holding;
    state.seats = vec![SeatCode::new("1A")];
    state.last_error = Some("previous transient failure".to_string());
    let new_expires_at = clock.now() + chrono::Duration::minutes(15);

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::SeatsUpdated {
            seats: vec![SeatCode::new("2C")],
            expires_at: new_expires_at,
        })
        .then_state(move |state| {
            assert_eq!(state.seats, vec![SeatCode::new("2C")]);
            assert_eq!(state.expires_at, new_expires_at);
            assert!(state.last_error.is_none());
        })
        .then_effects(|effects| {
            assert!(matches!(effects[0], Effect::Delay { .. }));
        })
        .run();
}

/// `update-seats` is ignored outside the hold phase.
#[test]
fn update_seats_ignored_outside_holding() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Paying;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::UpdateSeats {
            seats: vec![SeatCode::new("3D")],
        })
        .then_state(|state| {
            assert_eq!(state.phase, Phase::Paying);
        })
        .then_effects(|effects| {
            assert!(matches!(effects[0], Effect::None));
        })
        .run();
}

/// `proceed-to-payment` moves the order into the paying phase and dispatches
/// the first payment attempt.
#[test]
fn proceed_to_payment_enters_paying_phase() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Holding;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::ProceedToPayment {
            payment_code: "99999".to_string(),
        })
        .then_state(|state| {
            assert_eq!(state.phase, Phase::Paying);
            assert_eq!(state.status, OrderStatus::PaymentProcessing);
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 2, "status-update activity + first payment attempt");
        })
        .run();
}

/// A retryable payment failure with attempts remaining schedules another
/// attempt rather than failing the order.
#[test]
fn retryable_payment_failure_schedules_retry() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Paying;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::PaymentAttempted {
            outcome: PaymentOutcome::RetryableFailure("gateway timeout".to_string()),
        })
        .then_state(|state| {
            assert_eq!(state.payment_attempts, 1);
            assert_eq!(state.last_error.as_deref(), Some("gateway timeout"));
            assert_eq!(state.phase, Phase::Paying, "still in flight, not yet failed");
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert!(matches!(effects[0], Effect::Future(_)));
        })
        .run();
}

/// A retryable failure that exhausts `payment_max_attempts` fails the order
/// instead of scheduling a fourth attempt.
#[test]
fn retryable_payment_failure_past_max_attempts_fails_order() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Paying;
    state.payment_attempts = 2; // this is the 3rd (and last) attempt

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::PaymentAttempted {
            outcome: PaymentOutcome::RetryableFailure("gateway timeout".to_string()),
        })
        .then_state(|state| {
            assert_eq!(state.payment_attempts, 3);
            assert_eq!(state.status, OrderStatus::Failed);
            assert_eq!(state.phase, Phase::Done);
        })
        .run();
}

/// Payment decline (`00000`, non-retryable) fails the order on the first
/// attempt regardless of attempts remaining.
#[test]
fn declined_payment_fails_order_without_retry() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Paying;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::PaymentAttempted {
            outcome: PaymentOutcome::NonRetryableFailure("payment declined".to_string()),
        })
        .then_state(|state| {
            assert_eq!(state.payment_attempts, 1);
            assert_eq!(state.status, OrderStatus::Failed);
            assert_eq!(state.phase, Phase::Done);
            assert_eq!(state.failure_reason.as_deref(), Some("payment declined"));
        })
        .run();
}

/// A successful payment attempt dispatches the confirm activity.
#[test]
fn successful_payment_dispatches_confirm() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Paying;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::PaymentAttempted { outcome: PaymentOutcome::Success })
        .then_state(|state| {
            assert_eq!(state.payment_attempts, 1);
            assert!(state.last_error.is_none());
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert!(matches!(effects[0], Effect::Future(_)));
        })
        .run();
}

/// `Confirmed` closes the workflow in the `CONFIRMED` terminal state.
#[test]
fn confirmed_closes_workflow() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let state = BookingState::new(order_id, flight_id);
    let confirmed_at = clock.now();

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::Confirmed { confirmed_at })
        .then_state(move |state| {
            assert_eq!(state.status, OrderStatus::Confirmed);
            assert_eq!(state.phase, Phase::Done);
            assert_eq!(state.confirmed_at, Some(confirmed_at));
        })
        .run();
}

/// User cancellation fails the order and releases seats, from any
/// non-terminal phase.
#[test]
fn cancel_booking_fails_order_with_compensation() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Holding;
    state.seats = vec![SeatCode::new("1A")];

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::CancelBooking)
        .then_state(|state| {
            assert_eq!(state.status, OrderStatus::Failed);
            assert_eq!(state.phase, Phase::Done);
            assert_eq!(state.failure_reason.as_deref(), Some("canceled by user"));
        })
        .then_effects(|effects| {
            assert_eq!(effects.len(), 1);
            assert!(matches!(effects[0], Effect::Future(_)), "release_seats compensation runs");
        })
        .run();
}

/// Cancellation after the workflow has already closed is a no-op (idempotent
/// against a race between the timer and a late cancel signal).
#[test]
fn cancel_booking_ignored_once_done() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let mut state = BookingState::new(order_id, flight_id);
    state.phase = Phase::Done;
    state.status = OrderStatus::Confirmed;

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::CancelBooking)
        .then_state(|state| {
            assert_eq!(state.status, OrderStatus::Confirmed, "already-closed order is untouched");
        })
        .then_effects(|effects| {
            assert!(matches!(effects[0], Effect::None));
        })
        .run();
}

/// An activity error propagated through `ReserveFailed` fails the order
/// before it ever reaches the hold phase.
#[test]
fn reserve_failure_fails_order_before_holding() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let order_id = booking::types::OrderId::new();
    let flight_id = FlightId::new();
    let state = BookingState::new(order_id, flight_id);
    let reason = ActivityError::non_retryable("SEATS_UNAVAILABLE", "seat 1A already held").to_string();

    ReducerTest::new(BookingReducer)
        .with_env(fifteen_minute_env(clock))
        .given_state(state)
        .when_action(BookingAction::ReserveFailed { reason: reason.clone() })
        .then_state(move |state| {
            assert_eq!(state.status, OrderStatus::Failed);
            assert_eq!(state.phase, Phase::Done);
            assert_eq!(state.failure_reason, Some(reason));
        })
        .run();
}
