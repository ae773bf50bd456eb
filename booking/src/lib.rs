//! Flight seat booking orchestration core.
//!
//! Wires together the lettered components from the design: the advisory
//! lock store (C1), the authoritative order/seat store (C2), activities
//! (C3), the durable booking workflow (C4), the client facade (C5), the
//! reconciler (C6), and the payment simulator (C7).

pub mod activities;
pub mod config;
pub mod errors;
pub mod facade;
pub mod flights;
pub mod lock_store;
pub mod order_store;
pub mod payment_simulator;
pub mod reconciler;
pub mod server;
pub mod types;
pub mod workflow;

pub use config::Config;
pub use facade::BookingFacade;
pub use workflow::{BookingEnvironment, BookingState, BookingStatus};
