//! `PostgreSQL` event store implementation for the booking orchestration engine.
//!
//! This crate provides a production-ready `PostgreSQL`-based event store that implements
//! the `EventStore` trait from `booking-core`. It uses sqlx for runtime-checked
//! queries and supports:
//!
//! - Event persistence with optimistic concurrency
//! - State snapshots for performance
//! - Connection pooling
//!
//! # Example
//!
//! ```ignore
//! use booking_postgres::PostgresEventStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let event_store = PostgresEventStore::connect("postgres://localhost/mydb").await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod event_store;

pub use event_store::PostgresEventStore;
