//! Client facade (C5, §4.6): the only entry point the HTTP layer (or any
//! other caller) needs.
//!
//! Workflow instances are kept as live [`Store`]s in a process-local map for
//! their running lifetime. The first query or signal that observes an
//! instance's phase as [`Phase::Done`] drops it from the map; from then on
//! the persisted order row is the source of truth — the fallback §4.6
//! describes for a "closed" workflow.

use std::collections::HashMap;
use std::sync::Arc;

use booking_runtime::Store;
use tokio::sync::RwLock;

use crate::errors::{OrderStoreError, SignalError, WorkflowError};
use crate::order_store::OrderStore;
use crate::types::{FlightId, Money, Order, OrderId, OrderStatus, SeatCode};
use crate::workflow::{
    terminal_error, terminal_error_for_order, BookingAction, BookingEnvironment, BookingReducer, BookingState, BookingStatus, Phase,
};

type BookingStore = Arc<Store<BookingState, BookingAction, BookingEnvironment, BookingReducer>>;

/// A closed workflow always has a `terminal_error`; this only falls back to
/// `Expired` for the unreachable case where status reads `Confirmed` (no
/// signal is sent to a confirmed order's live instance, since it evicts
/// itself the moment it is observed as `Done`).
fn closed_workflow_error(order_id: OrderId, terminal: Option<WorkflowError>) -> WorkflowError {
    terminal.unwrap_or(WorkflowError::Expired(order_id))
}

/// Result of starting a booking workflow.
#[derive(Clone, Debug)]
pub struct StartedBooking {
    /// Generated order id.
    pub order_id: OrderId,
    /// Derived workflow id (`booking-<order id>`).
    pub workflow_id: String,
    /// Status immediately after submission (always `SEATS_RESERVED` on
    /// success, since `start_booking_workflow` waits for the reserve phase).
    pub status: OrderStatus,
    /// Initial hold deadline.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Facade over the running set of booking workflow instances.
#[derive(Clone)]
pub struct BookingFacade {
    environment: BookingEnvironment,
    order_store: Arc<dyn OrderStore>,
    instances: Arc<RwLock<HashMap<OrderId, BookingStore>>>,
}

impl BookingFacade {
    /// Builds a facade sharing the given environment and order store.
    #[must_use]
    pub fn new(environment: BookingEnvironment, order_store: Arc<dyn OrderStore>) -> Self {
        Self {
            environment,
            order_store,
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Starts a new workflow instance and waits for the reserve phase to
    /// settle, then returns its outcome (§4.6).
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError` if the reserve phase fails (e.g. seats
    /// unavailable).
    pub async fn start_booking_workflow(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        unit_price: Money,
    ) -> Result<StartedBooking, WorkflowError> {
        let order_id = OrderId::new();
        let state = BookingState::new(order_id, flight_id);
        let store: BookingStore = Arc::new(Store::new(state, BookingReducer, self.environment.clone()));

        store
            .send(BookingAction::Start {
                order_id,
                flight_id,
                seats,
                unit_price,
            })
            .await;

        // The reserve phase's Effect::Future dispatches Reserved/ReserveFailed
        // back into this same store; poll briefly for it to settle since
        // send() returns once effect *execution* has started, not finished.
        let outcome = self.await_phase_settled(&store).await;

        self.instances.write().await.insert(order_id, Arc::clone(&store));

        match outcome {
            Ok(status) => Ok(StartedBooking {
                order_id,
                workflow_id: order_id.workflow_id(),
                status: status.status,
                expires_at: status.expires_at,
            }),
            Err(err) => Err(err),
        }
    }

    /// `update-seats` signal (§4.4 step 3).
    ///
    /// # Errors
    ///
    /// Returns `SignalError::Order(OrderNotFound)` if the order never
    /// existed, or `SignalError::Workflow` if it did but has already closed;
    /// the caller should fall back to `query_status` in the latter case.
    pub async fn signal_update_seats(&self, order_id: OrderId, seats: Vec<SeatCode>) -> Result<(), SignalError> {
        self.signal(order_id, BookingAction::UpdateSeats { seats }).await
    }

    /// `proceed-to-payment` signal.
    ///
    /// # Errors
    ///
    /// See [`Self::signal_update_seats`].
    pub async fn signal_proceed(&self, order_id: OrderId, payment_code: String) -> Result<(), SignalError> {
        self.signal(order_id, BookingAction::ProceedToPayment { payment_code }).await
    }

    /// `cancel-booking` signal.
    ///
    /// # Errors
    ///
    /// See [`Self::signal_update_seats`].
    pub async fn signal_cancel(&self, order_id: OrderId) -> Result<(), SignalError> {
        self.signal(order_id, BookingAction::CancelBooking).await
    }

    async fn signal(&self, order_id: OrderId, action: BookingAction) -> Result<(), SignalError> {
        let store = self.instances.read().await.get(&order_id).cloned();
        if let Some(store) = store {
            let state = store.state(Clone::clone).await;
            if state.phase != Phase::Done {
                store.send(action).await;
                return Ok(());
            }
            self.instances.write().await.remove(&order_id);
            return Err(SignalError::Workflow(closed_workflow_error(order_id, terminal_error(&state))));
        }

        let order = self.order_store.get_order(order_id).await?;
        Err(SignalError::Workflow(closed_workflow_error(order_id, terminal_error_for_order(&order))))
    }

    /// `QueryStatus` (§4.6): fans to the live workflow's query handler, or
    /// falls back to the persisted order row if the workflow has closed.
    ///
    /// # Errors
    ///
    /// Returns `OrderStoreError::OrderNotFound` if neither a live instance
    /// nor a persisted row exists.
    pub async fn query_status(&self, order_id: OrderId) -> Result<BookingStatus, OrderStoreError> {
        if let Some(store) = self.instances.read().await.get(&order_id).cloned() {
            let now = self.environment.clock.now();
            let (phase, status) = store.state(|s| (s.phase, s.query(now))).await;
            if phase == Phase::Done {
                self.instances.write().await.remove(&order_id);
            }
            return Ok(status);
        }

        let order = self.order_store.get_order(order_id).await?;
        Ok(Self::status_from_order(&order))
    }

    fn status_from_order(order: &Order) -> BookingStatus {
        BookingStatus {
            order_id: order.id,
            flight_id: order.flight_id,
            status: order.status,
            seats: order.seats.clone(),
            expires_at: order.expires_at,
            timer_remaining_seconds: 0,
            payment_attempts: order.payment_attempts,
            last_error: order.failure_reason.clone(),
        }
    }

    async fn await_phase_settled(&self, store: &BookingStore) -> Result<BookingStatus, WorkflowError> {
        for _ in 0..100 {
            let (phase, status) = store.state(|s| (s.phase, s.query(self.environment.clock.now()))).await;
            if phase != Phase::Reserving {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        let state = store.state(Clone::clone).await;
        match terminal_error(&state) {
            Some(err) => Err(err),
            None => Ok(state.query(self.environment.clock.now())),
        }
    }
}
