//! Authoritative relational store for flights, seats, and orders (C2, §4.2).
//!
//! All conditional updates are single-statement, row-scoped predicates; only
//! `book_seats` (seat rows + the flight's available-seat counter) needs a
//! transaction spanning more than one statement (§4.2 "Concurrency").

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::errors::OrderStoreError;
use crate::types::{FailureKind, FlightId, Order, OrderId, OrderStatus, SeatCode, SeatStatus};

/// Trait for the authoritative order/seat store.
pub trait OrderStore: Send + Sync {
    /// Inserts a new order row, already in status `SEATS_RESERVED` (the
    /// workflow only creates the order after a successful reserve).
    fn create_order(&self, order: Order) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Writes a new status, honoured only if `order.status.can_transition_to(new_status)`.
    fn update_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Atomically replaces the seat list and deadline (§4.4 step 3,
    /// `update-seats` signal handling).
    fn update_seats_and_expiry(
        &self,
        order_id: OrderId,
        seats: Vec<SeatCode>,
        expires_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Conditionally transitions `available -> reserved, order_id = order_id`
    /// for each seat. Fails with `SeatsUnavailable` (and internally releases
    /// whatever it had already reserved in this same call) if any seat was
    /// not `available`.
    fn mark_seats_reserved(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Unconditionally transitions seats to `available`, clearing `order_id`.
    fn mark_seats_available(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// `reserved -> booked` for the given order; decrements the flight's
    /// available-seat counter by the seat count in the same transaction.
    fn book_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Terminal status write: `CONFIRMED`.
    fn confirm(&self, order_id: OrderId, confirmed_at: DateTime<Utc>) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Terminal status write: `FAILED`, with a reason and its structured kind.
    fn fail(
        &self,
        order_id: OrderId,
        reason: String,
        kind: FailureKind,
    ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Terminal status write: `EXPIRED`.
    fn expire(&self, order_id: OrderId) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>>;

    /// Reads the current order row, for the facade's closed-workflow
    /// status fallback (§4.6).
    fn get_order(&self, order_id: OrderId) -> Pin<Box<dyn Future<Output = Result<Order, OrderStoreError>> + Send + '_>>;

    /// Reads one seat row's current status and owner, for the reconciler
    /// (C6, §4.7). `None` if the seat row doesn't exist.
    fn seat_owner(
        &self,
        flight_id: FlightId,
        seat_code: SeatCode,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(SeatStatus, Option<OrderId>)>, OrderStoreError>> + Send + '_>>;
}

pub mod postgres {
    //! `PostgreSQL`-backed [`super::OrderStore`].

    use super::{DateTime, Future, OrderStore, OrderStoreError, Pin, Utc};
    use crate::types::{FailureKind, FlightId, Order, OrderId, OrderStatus, SeatCode, SeatStatus};
    use sqlx::{PgPool, Row};

    /// `PostgreSQL`-backed order/seat store.
    #[derive(Clone)]
    pub struct PostgresOrderStore {
        pool: PgPool,
    }

    impl PostgresOrderStore {
        /// Wraps an existing pool.
        #[must_use]
        pub const fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn parse_status(s: &str) -> OrderStatus {
            match s {
                "SEATS_RESERVED" => OrderStatus::SeatsReserved,
                "PAYMENT_PROCESSING" => OrderStatus::PaymentProcessing,
                "CONFIRMED" => OrderStatus::Confirmed,
                "FAILED" => OrderStatus::Failed,
                "EXPIRED" => OrderStatus::Expired,
                _ => OrderStatus::Created,
            }
        }

        fn parse_seat_status(s: &str) -> SeatStatus {
            match s {
                "reserved" => SeatStatus::Reserved,
                "booked" => SeatStatus::Booked,
                _ => SeatStatus::Available,
            }
        }

        fn parse_failure_kind(s: Option<&str>) -> Option<FailureKind> {
            match s {
                Some("canceled") => Some(FailureKind::Canceled),
                Some("payment") => Some(FailureKind::Payment),
                Some("activity") => Some(FailureKind::Activity),
                _ => None,
            }
        }
    }

    impl OrderStore for PostgresOrderStore {
        fn create_order(&self, order: Order) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let seats: Vec<String> = order.seats.iter().map(ToString::to_string).collect();
                sqlx::query(
                    "INSERT INTO orders (id, flight_id, workflow_id, status, seats, total_price_cents, expires_at, payment_attempts) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(order.id.as_uuid())
                .bind(order.flight_id.as_uuid())
                .bind(&order.workflow_id)
                .bind(order.status.to_string())
                .bind(&seats)
                .bind(order.total_price.cents() as i64)
                .bind(order.expires_at)
                .bind(i32::try_from(order.payment_attempts).unwrap_or(i32::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn update_status(
            &self,
            order_id: OrderId,
            new_status: OrderStatus,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let current = self.get_order(order_id).await?;
                if !current.status.can_transition_to(new_status) {
                    return Err(OrderStoreError::IllegalTransition {
                        order_id,
                        from: current.status.to_string(),
                        to: new_status.to_string(),
                    });
                }
                sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
                    .bind(new_status.to_string())
                    .bind(order_id.as_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn update_seats_and_expiry(
            &self,
            order_id: OrderId,
            seats: Vec<SeatCode>,
            expires_at: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let seats: Vec<String> = seats.iter().map(ToString::to_string).collect();
                sqlx::query("UPDATE orders SET seats = $1, expires_at = $2 WHERE id = $3")
                    .bind(&seats)
                    .bind(expires_at)
                    .bind(order_id.as_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn mark_seats_reserved(
            &self,
            flight_id: FlightId,
            seats: Vec<SeatCode>,
            order_id: OrderId,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut reserved = Vec::new();
                for seat in &seats {
                    let result = sqlx::query(
                        "UPDATE seats SET status = 'reserved', order_id = $1 \
                         WHERE flight_id = $2 AND seat_code = $3 AND status = 'available'",
                    )
                    .bind(order_id.as_uuid())
                    .bind(flight_id.as_uuid())
                    .bind(seat.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                    if result.rows_affected() == 1 {
                        reserved.push(seat.clone());
                    } else {
                        self.mark_seats_available(flight_id, std::mem::take(&mut reserved)).await?;
                        return Err(OrderStoreError::SeatsUnavailable {
                            flight_id,
                            seats: vec![seat.clone()],
                        });
                    }
                }
                Ok(())
            })
        }

        fn mark_seats_available(
            &self,
            flight_id: FlightId,
            seats: Vec<SeatCode>,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                for seat in &seats {
                    sqlx::query(
                        "UPDATE seats SET status = 'available', order_id = NULL \
                         WHERE flight_id = $1 AND seat_code = $2",
                    )
                    .bind(flight_id.as_uuid())
                    .bind(seat.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                }
                Ok(())
            })
        }

        fn book_seats(
            &self,
            flight_id: FlightId,
            seats: Vec<SeatCode>,
            order_id: OrderId,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut tx = self.pool.begin().await.map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                for seat in &seats {
                    sqlx::query(
                        "UPDATE seats SET status = 'booked' \
                         WHERE flight_id = $1 AND seat_code = $2 AND status = 'reserved' AND order_id = $3",
                    )
                    .bind(flight_id.as_uuid())
                    .bind(seat.as_str())
                    .bind(order_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                }
                #[allow(clippy::cast_possible_wrap)]
                let count = seats.len() as i64;
                sqlx::query("UPDATE flights SET available_seats = available_seats - $1 WHERE id = $2")
                    .bind(count)
                    .bind(flight_id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                tx.commit().await.map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn confirm(&self, order_id: OrderId, confirmed_at: DateTime<Utc>) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                sqlx::query("UPDATE orders SET status = 'CONFIRMED', confirmed_at = $1 WHERE id = $2")
                    .bind(confirmed_at)
                    .bind(order_id.as_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn fail(
            &self,
            order_id: OrderId,
            reason: String,
            kind: FailureKind,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                sqlx::query("UPDATE orders SET status = 'FAILED', failure_reason = $1, failure_kind = $2 WHERE id = $3")
                    .bind(&reason)
                    .bind(kind.as_str())
                    .bind(order_id.as_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn expire(&self, order_id: OrderId) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                sqlx::query("UPDATE orders SET status = 'EXPIRED' WHERE id = $1")
                    .bind(order_id.as_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(())
            })
        }

        fn get_order(&self, order_id: OrderId) -> Pin<Box<dyn Future<Output = Result<Order, OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let row = sqlx::query(
                    "SELECT id, flight_id, workflow_id, status, seats, total_price_cents, expires_at, \
                            confirmed_at, failure_reason, failure_kind, payment_attempts FROM orders WHERE id = $1",
                )
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                let Some(row) = row else {
                    return Err(OrderStoreError::OrderNotFound(order_id));
                };

                let seats: Vec<String> = row.try_get("seats").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                let status: String = row.try_get("status").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                let total_price_cents: i64 = row.try_get("total_price_cents").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                let payment_attempts: i32 = row.try_get("payment_attempts").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                let failure_kind: Option<String> = row.try_get("failure_kind").map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                Ok(Order {
                    id: order_id,
                    flight_id: FlightId::from_uuid(row.try_get("flight_id").map_err(|e| OrderStoreError::Backend(e.to_string()))?),
                    workflow_id: row.try_get("workflow_id").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    status: Self::parse_status(&status),
                    seats: seats.into_iter().map(SeatCode::new).collect(),
                    #[allow(clippy::cast_sign_loss)]
                    total_price: crate::types::Money::from_cents(total_price_cents as u64),
                    expires_at: row.try_get("expires_at").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    confirmed_at: row.try_get("confirmed_at").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    failure_reason: row.try_get("failure_reason").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    failure_kind: Self::parse_failure_kind(failure_kind.as_deref()),
                    #[allow(clippy::cast_sign_loss)]
                    payment_attempts: payment_attempts as u32,
                })
            })
        }

        fn seat_owner(
            &self,
            flight_id: FlightId,
            seat_code: SeatCode,
        ) -> Pin<Box<dyn Future<Output = Result<Option<(SeatStatus, Option<OrderId>)>, OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let row = sqlx::query("SELECT status, order_id FROM seats WHERE flight_id = $1 AND seat_code = $2")
                    .bind(flight_id.as_uuid())
                    .bind(seat_code.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                let Some(row) = row else { return Ok(None) };
                let status: String = row.try_get("status").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                let order_id: Option<uuid::Uuid> =
                    row.try_get("order_id").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                Ok(Some((Self::parse_seat_status(&status), order_id.map(OrderId::from_uuid))))
            })
        }
    }
}

pub mod memory {
    //! In-memory [`super::OrderStore`] for tests and the in-process demo binary.

    use super::{DateTime, Future, OrderStore, OrderStoreError, Pin, Utc};
    use crate::types::{FailureKind, FlightId, Order, OrderId, OrderStatus, SeatCode, SeatStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct SeatEntry {
        status: SeatStatus,
        order_id: Option<OrderId>,
    }

    /// In-memory order/seat store, seeded by inserting orders and seats directly.
    #[derive(Default)]
    pub struct InMemoryOrderStore {
        orders: Mutex<HashMap<OrderId, Order>>,
        seats: Mutex<HashMap<(FlightId, SeatCode), SeatEntry>>,
        flight_available: Mutex<HashMap<FlightId, u32>>,
    }

    impl InMemoryOrderStore {
        /// Empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a seat as `available`, for test setup.
        pub fn seed_seat(&self, flight_id: FlightId, seat_code: SeatCode) {
            self.seats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(
                (flight_id, seat_code),
                SeatEntry {
                    status: SeatStatus::Available,
                    order_id: None,
                },
            );
        }

        /// Seeds a flight's available-seat counter, for test setup.
        pub fn seed_flight_available(&self, flight_id: FlightId, available: u32) {
            self.flight_available
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(flight_id, available);
        }
    }

    impl OrderStore for InMemoryOrderStore {
        fn create_order(&self, order: Order) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                self.orders
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .insert(order.id, order);
                Ok(())
            })
        }

        fn update_status(
            &self,
            order_id: OrderId,
            new_status: OrderStatus,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut orders = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let order = orders.get_mut(&order_id).ok_or(OrderStoreError::OrderNotFound(order_id))?;
                if !order.status.can_transition_to(new_status) {
                    return Err(OrderStoreError::IllegalTransition {
                        order_id,
                        from: order.status.to_string(),
                        to: new_status.to_string(),
                    });
                }
                order.status = new_status;
                Ok(())
            })
        }

        fn update_seats_and_expiry(
            &self,
            order_id: OrderId,
            seats: Vec<SeatCode>,
            expires_at: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut orders = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let order = orders.get_mut(&order_id).ok_or(OrderStoreError::OrderNotFound(order_id))?;
                order.seats = seats;
                order.expires_at = expires_at;
                Ok(())
            })
        }

        fn mark_seats_reserved(
            &self,
            flight_id: FlightId,
            seats: Vec<SeatCode>,
            order_id: OrderId,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut table = self.seats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let mut reserved = Vec::new();
                for seat in &seats {
                    let key = (flight_id, seat.clone());
                    let available = table.get(&key).is_some_and(|e| e.status == SeatStatus::Available);
                    if available {
                        table.insert(
                            key,
                            SeatEntry {
                                status: SeatStatus::Reserved,
                                order_id: Some(order_id),
                            },
                        );
                        reserved.push(seat.clone());
                    } else {
                        for seat in &reserved {
                            table.insert(
                                (flight_id, seat.clone()),
                                SeatEntry {
                                    status: SeatStatus::Available,
                                    order_id: None,
                                },
                            );
                        }
                        return Err(OrderStoreError::SeatsUnavailable {
                            flight_id,
                            seats: vec![seat.clone()],
                        });
                    }
                }
                Ok(())
            })
        }

        fn mark_seats_available(
            &self,
            flight_id: FlightId,
            seats: Vec<SeatCode>,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut table = self.seats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                for seat in seats {
                    table.insert(
                        (flight_id, seat),
                        SeatEntry {
                            status: SeatStatus::Available,
                            order_id: None,
                        },
                    );
                }
                Ok(())
            })
        }

        fn book_seats(
            &self,
            flight_id: FlightId,
            seats: Vec<SeatCode>,
            order_id: OrderId,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut table = self.seats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                for seat in &seats {
                    if let Some(entry) = table.get_mut(&(flight_id, seat.clone())) {
                        if entry.status == SeatStatus::Reserved && entry.order_id == Some(order_id) {
                            entry.status = SeatStatus::Booked;
                        }
                    }
                }
                drop(table);
                let mut counters = self.flight_available.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(count) = counters.get_mut(&flight_id) {
                    *count = count.saturating_sub(u32::try_from(seats.len()).unwrap_or(u32::MAX));
                }
                Ok(())
            })
        }

        fn confirm(&self, order_id: OrderId, confirmed_at: DateTime<Utc>) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut orders = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let order = orders.get_mut(&order_id).ok_or(OrderStoreError::OrderNotFound(order_id))?;
                order.status = OrderStatus::Confirmed;
                order.confirmed_at = Some(confirmed_at);
                Ok(())
            })
        }

        fn fail(
            &self,
            order_id: OrderId,
            reason: String,
            kind: FailureKind,
        ) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut orders = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let order = orders.get_mut(&order_id).ok_or(OrderStoreError::OrderNotFound(order_id))?;
                order.status = OrderStatus::Failed;
                order.failure_reason = Some(reason);
                order.failure_kind = Some(kind);
                Ok(())
            })
        }

        fn expire(&self, order_id: OrderId) -> Pin<Box<dyn Future<Output = Result<(), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let mut orders = self.orders.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let order = orders.get_mut(&order_id).ok_or(OrderStoreError::OrderNotFound(order_id))?;
                order.status = OrderStatus::Expired;
                Ok(())
            })
        }

        fn get_order(&self, order_id: OrderId) -> Pin<Box<dyn Future<Output = Result<Order, OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                self.orders
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(&order_id)
                    .cloned()
                    .ok_or(OrderStoreError::OrderNotFound(order_id))
            })
        }

        fn seat_owner(
            &self,
            flight_id: FlightId,
            seat_code: SeatCode,
        ) -> Pin<Box<dyn Future<Output = Result<Option<(SeatStatus, Option<OrderId>)>, OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                Ok(self
                    .seats
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(&(flight_id, seat_code))
                    .map(|entry| (entry.status, entry.order_id)))
            })
        }
    }

}
