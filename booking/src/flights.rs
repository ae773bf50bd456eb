//! Read-side repository for flights and their seat maps.
//!
//! Flights are created out of band (§3 "Created out of band"); this module
//! only covers the read paths the HTTP layer needs for `GET /flights` and
//! `GET /flights/{id}` (§6). It is not one of the lettered components (C1-C7)
//! but is grounded on the same query shape as [`crate::order_store`].

use std::future::Future;
use std::pin::Pin;

use crate::errors::OrderStoreError;
use crate::types::{Flight, FlightId, Seat};

/// Read-only repository over flights and their seat maps.
pub trait FlightRepository: Send + Sync {
    /// Lists every known flight.
    fn list_flights(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Flight>, OrderStoreError>> + Send + '_>>;

    /// Reads one flight plus its full seat map.
    fn get_flight(
        &self,
        flight_id: FlightId,
    ) -> Pin<Box<dyn Future<Output = Result<(Flight, Vec<Seat>), OrderStoreError>> + Send + '_>>;
}

pub mod postgres {
    //! `PostgreSQL`-backed [`super::FlightRepository`].

    use super::{Flight, FlightId, FlightRepository, OrderStoreError, Pin, Seat};
    use crate::types::{Money, OrderId, SeatCode, SeatStatus};
    use sqlx::{PgPool, Row};
    use std::future::Future;

    /// `PostgreSQL`-backed flight/seat read repository.
    #[derive(Clone)]
    pub struct PostgresFlightRepository {
        pool: PgPool,
    }

    impl PostgresFlightRepository {
        /// Wraps an existing pool.
        #[must_use]
        pub const fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        fn parse_seat_status(s: &str) -> SeatStatus {
            match s {
                "reserved" => SeatStatus::Reserved,
                "booked" => SeatStatus::Booked,
                _ => SeatStatus::Available,
            }
        }
    }

    impl FlightRepository for PostgresFlightRepository {
        fn list_flights(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Flight>, OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let rows = sqlx::query(
                    "SELECT id, flight_number, origin, destination, departure, total_seats, \
                            available_seats, unit_price_cents FROM flights ORDER BY departure",
                )
                .fetch_all(&self.pool)
                .await
                .map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                rows.into_iter()
                    .map(|row| {
                        #[allow(clippy::cast_sign_loss)]
                        let unit_price_cents: i64 = row.try_get("unit_price_cents").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                        Ok(Flight {
                            id: FlightId::from_uuid(row.try_get("id").map_err(|e| OrderStoreError::Backend(e.to_string()))?),
                            flight_number: row.try_get("flight_number").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                            origin: row.try_get("origin").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                            destination: row.try_get("destination").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                            departure: row.try_get("departure").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                            total_seats: row
                                .try_get::<i32, _>("total_seats")
                                .map_err(|e| OrderStoreError::Backend(e.to_string()))? as u32,
                            available_seats: row
                                .try_get::<i32, _>("available_seats")
                                .map_err(|e| OrderStoreError::Backend(e.to_string()))? as u32,
                            unit_price: Money::from_cents(unit_price_cents as u64),
                        })
                    })
                    .collect()
            })
        }

        fn get_flight(
            &self,
            flight_id: FlightId,
        ) -> Pin<Box<dyn Future<Output = Result<(Flight, Vec<Seat>), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let row = sqlx::query(
                    "SELECT id, flight_number, origin, destination, departure, total_seats, \
                            available_seats, unit_price_cents FROM flights WHERE id = $1",
                )
                .bind(flight_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                let Some(row) = row else {
                    return Err(OrderStoreError::FlightNotFound(flight_id));
                };

                #[allow(clippy::cast_sign_loss)]
                let unit_price_cents: i64 = row.try_get("unit_price_cents").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                let flight = Flight {
                    id: flight_id,
                    flight_number: row.try_get("flight_number").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    origin: row.try_get("origin").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    destination: row.try_get("destination").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    departure: row.try_get("departure").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                    total_seats: row.try_get::<i32, _>("total_seats").map_err(|e| OrderStoreError::Backend(e.to_string()))? as u32,
                    available_seats: row
                        .try_get::<i32, _>("available_seats")
                        .map_err(|e| OrderStoreError::Backend(e.to_string()))? as u32,
                    unit_price: Money::from_cents(unit_price_cents as u64),
                };

                let seat_rows = sqlx::query("SELECT seat_code, status, order_id, updated_at FROM seats WHERE flight_id = $1")
                    .bind(flight_id.as_uuid())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| OrderStoreError::Backend(e.to_string()))?;

                let seats = seat_rows
                    .into_iter()
                    .map(|row| {
                        let code: String = row.try_get("seat_code").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                        let status: String = row.try_get("status").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                        let order_id: Option<uuid::Uuid> =
                            row.try_get("order_id").map_err(|e| OrderStoreError::Backend(e.to_string()))?;
                        let seat_code = SeatCode::new(code);
                        Ok(Seat {
                            flight_id,
                            row: seat_code.row().unwrap_or(0),
                            column: seat_code.column().unwrap_or('?'),
                            seat_code,
                            status: Self::parse_seat_status(&status),
                            order_id: order_id.map(OrderId::from_uuid),
                            updated_at: row.try_get("updated_at").map_err(|e| OrderStoreError::Backend(e.to_string()))?,
                        })
                    })
                    .collect::<Result<Vec<_>, OrderStoreError>>()?;

                Ok((flight, seats))
            })
        }
    }
}

pub mod memory {
    //! In-memory [`super::FlightRepository`] for tests and the demo binary.

    use super::{Flight, FlightId, FlightRepository, OrderStoreError, Pin, Seat};
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;

    /// In-memory flight/seat read repository, seeded directly.
    #[derive(Default)]
    pub struct InMemoryFlightRepository {
        flights: Mutex<HashMap<FlightId, Flight>>,
        seats: Mutex<HashMap<FlightId, Vec<Seat>>>,
    }

    impl InMemoryFlightRepository {
        /// Empty repository.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a flight record.
        pub fn seed_flight(&self, flight: Flight) {
            self.flights.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(flight.id, flight);
        }

        /// Seeds that flight's seat map.
        pub fn seed_seats(&self, flight_id: FlightId, seats: Vec<Seat>) {
            self.seats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(flight_id, seats);
        }
    }

    impl FlightRepository for InMemoryFlightRepository {
        fn list_flights(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Flight>, OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                Ok(self
                    .flights
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect())
            })
        }

        fn get_flight(
            &self,
            flight_id: FlightId,
        ) -> Pin<Box<dyn Future<Output = Result<(Flight, Vec<Seat>), OrderStoreError>> + Send + '_>> {
            Box::pin(async move {
                let flight = self
                    .flights
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(&flight_id)
                    .cloned()
                    .ok_or(OrderStoreError::FlightNotFound(flight_id))?;
                let seats = self
                    .seats
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(&flight_id)
                    .cloned()
                    .unwrap_or_default();
                Ok((flight, seats))
            })
        }
    }
}
