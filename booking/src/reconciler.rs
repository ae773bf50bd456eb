//! Lock/seat drift repair (C6, §4.7).
//!
//! Runs as a background loop, independent of any single workflow instance.
//! For each flight: enumerate lock entries, compare each against the
//! authoritative seat row, and release whichever side disagrees. Never
//! creates locks — only repairs orphans left by a crashed worker (I1).

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::lock_store::LockStore;
use crate::order_store::OrderStore;
use crate::types::{FlightId, SeatStatus};

/// Periodic reconciliation sweep over a fixed set of flights.
pub struct Reconciler {
    lock_store: Arc<dyn LockStore>,
    order_store: Arc<dyn OrderStore>,
    interval: Duration,
}

impl Reconciler {
    /// Builds a reconciler with the given sweep cadence.
    #[must_use]
    pub fn new(lock_store: Arc<dyn LockStore>, order_store: Arc<dyn OrderStore>, interval: Duration) -> Self {
        Self {
            lock_store,
            order_store,
            interval,
        }
    }

    /// Runs one sweep over `flights`, releasing every lock entry whose owner
    /// disagrees with the seat row's `order_id` or whose seat row is
    /// `available`. Best-effort: a failure on one flight or one seat is
    /// logged and does not stop the rest of the sweep.
    pub async fn sweep_once(&self, flights: &[FlightId]) {
        for &flight_id in flights {
            let locks = match self.lock_store.enumerate_locks(flight_id).await {
                Ok(locks) => locks,
                Err(err) => {
                    warn!(%flight_id, %err, "reconciler: failed to enumerate locks");
                    continue;
                }
            };

            for (seat_code, lock_owner) in locks {
                let owner_row = match self.order_store.seat_owner(flight_id, seat_code.clone()).await {
                    Ok(row) => row,
                    Err(err) => {
                        warn!(%flight_id, %seat_code, %err, "reconciler: failed to read seat row");
                        continue;
                    }
                };

                let should_release = match owner_row {
                    None => true,
                    Some((status, order_id)) => status == SeatStatus::Available || order_id != Some(lock_owner),
                };

                if !should_release {
                    continue;
                }

                debug!(%flight_id, %seat_code, %lock_owner, "reconciler: releasing orphaned lock");
                if let Err(err) = self
                    .lock_store
                    .release_seats(flight_id, vec![seat_code.clone()], lock_owner)
                    .await
                {
                    warn!(%flight_id, %seat_code, %err, "reconciler: failed to release lock");
                }
            }
        }
    }

    /// Runs `sweep_once` forever at the configured interval, re-fetching the
    /// flight set from `flights_provider` on every tick. Intended to be
    /// spawned as its own task; never returns.
    pub async fn run_forever<F, Fut>(&self, flights_provider: F) -> !
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Vec<FlightId>>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            let flights = flights_provider().await;
            self.sweep_once(&flights).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_store::InMemoryLockStore;
    use crate::order_store::memory::InMemoryOrderStore;
    use crate::types::{OrderId, SeatCode};

    #[tokio::test]
    async fn releases_lock_with_no_matching_seat_row() {
        let lock_store = Arc::new(InMemoryLockStore::new());
        let order_store = Arc::new(InMemoryOrderStore::new());
        let flight_id = FlightId::new();
        let order_id = OrderId::new();
        let seat = SeatCode::new("1A");

        lock_store
            .lock_seats(flight_id, vec![seat.clone()], order_id, Duration::from_secs(60))
            .await
            .unwrap();

        let reconciler = Reconciler::new(lock_store.clone(), order_store, Duration::from_secs(60));
        reconciler.sweep_once(&[flight_id]).await;

        let locks = lock_store.enumerate_locks(flight_id).await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn releases_lock_whose_seat_row_is_available() {
        let lock_store = Arc::new(InMemoryLockStore::new());
        let order_store = Arc::new(InMemoryOrderStore::new());
        let flight_id = FlightId::new();
        let order_id = OrderId::new();
        let seat = SeatCode::new("1A");
        order_store.seed_seat(flight_id, seat.clone());

        lock_store
            .lock_seats(flight_id, vec![seat.clone()], order_id, Duration::from_secs(60))
            .await
            .unwrap();

        let reconciler = Reconciler::new(lock_store.clone(), order_store, Duration::from_secs(60));
        reconciler.sweep_once(&[flight_id]).await;

        assert!(lock_store.enumerate_locks(flight_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keeps_lock_matching_reserved_owner() {
        let lock_store = Arc::new(InMemoryLockStore::new());
        let order_store = Arc::new(InMemoryOrderStore::new());
        let flight_id = FlightId::new();
        let order_id = OrderId::new();
        let seat = SeatCode::new("1A");
        order_store.seed_seat(flight_id, seat.clone());
        order_store
            .mark_seats_reserved(flight_id, vec![seat.clone()], order_id)
            .await
            .unwrap();

        lock_store
            .lock_seats(flight_id, vec![seat.clone()], order_id, Duration::from_secs(60))
            .await
            .unwrap();

        let reconciler = Reconciler::new(lock_store.clone(), order_store, Duration::from_secs(60));
        reconciler.sweep_once(&[flight_id]).await;

        let locks = lock_store.enumerate_locks(flight_id).await.unwrap();
        assert_eq!(locks.get(&seat), Some(&order_id));
    }
}
