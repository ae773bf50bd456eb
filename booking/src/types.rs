//! Domain types for the flight seat booking core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightId(Uuid);

impl FlightId {
    /// Creates a new random `FlightId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `FlightId` from an existing `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner `Uuid`.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FlightId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an order, generated client-side by the facade
/// before the workflow starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an `OrderId` from an existing `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner `Uuid`.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Derives this order's workflow id: `booking-<order id>`.
    #[must_use]
    pub fn workflow_id(&self) -> String {
        format!("booking-{}", self.0)
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seat code such as `12A`: row number plus column letter.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatCode(String);

impl SeatCode {
    /// Wraps a raw seat code string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Row number, if the code parses as digits followed by a letter.
    #[must_use]
    pub fn row(&self) -> Option<u32> {
        self.0
            .trim_end_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .ok()
    }

    /// Column letter, if present.
    #[must_use]
    pub fn column(&self) -> Option<char> {
        self.0.chars().last().filter(|c| c.is_ascii_alphabetic())
    }
}

impl fmt::Display for SeatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeatCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SeatCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Monetary amount in integer minor units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiplies by a seat count, saturating on overflow.
    #[must_use]
    pub const fn multiply(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }

    /// Adds two amounts, saturating on overflow.
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Authoritative status of a seat row (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    /// Free to be reserved.
    Available,
    /// Held by a pending order.
    Reserved,
    /// Terminal: owned by a confirmed order.
    Booked,
}

/// Authoritative seat row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Owning flight.
    pub flight_id: FlightId,
    /// Composite identity half: the seat code.
    pub seat_code: SeatCode,
    /// Row number.
    pub row: u32,
    /// Column letter.
    pub column: char,
    /// Current status.
    pub status: SeatStatus,
    /// Owning order, if reserved or booked.
    pub order_id: Option<OrderId>,
    /// Last status-transition timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Flight record (created out of band; §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    /// Flight id.
    pub id: FlightId,
    /// Human flight number, e.g. `BA117`.
    pub flight_number: String,
    /// Origin airport code.
    pub origin: String,
    /// Destination airport code.
    pub destination: String,
    /// Scheduled departure.
    pub departure: DateTime<Utc>,
    /// Total seat count.
    pub total_seats: u32,
    /// Advisory available-seat counter; decremented only on confirmation.
    pub available_seats: u32,
    /// Unit price in minor units.
    pub unit_price: Money,
}

/// Order status (§3, §4.4). The enum's string form is part of the wire
/// contract (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Workflow started, before the first reserve activity completes.
    Created,
    /// Seats held; hold-phase wait loop is active.
    SeatsReserved,
    /// Payment code received; validating.
    PaymentProcessing,
    /// Terminal: seats booked, payment accepted.
    Confirmed,
    /// Terminal: canceled, declined, or exhausted retries.
    Failed,
    /// Terminal: hold timer fired before payment.
    Expired,
}

impl OrderStatus {
    /// Terminal states can never transition further (I4).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Expired)
    }

    /// Whether `self -> to` is a legal transition per the state diagram in
    /// §4.4. Implementations must reject any transition not listed here.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::SeatsReserved | Self::Failed)
                | (Self::SeatsReserved, Self::PaymentProcessing | Self::Expired | Self::Failed)
                | (Self::PaymentProcessing, Self::Confirmed | Self::Failed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::SeatsReserved => "SEATS_RESERVED",
            Self::PaymentProcessing => "PAYMENT_PROCESSING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// Why an order reached `FAILED`, set explicitly at the point of failure
/// (§9: avoid re-deriving this from `failure_reason`'s free text).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `cancel-booking` signal.
    Canceled,
    /// Payment was declined or exhausted its retry budget.
    Payment,
    /// A reserve, seat-update, or confirm activity failed.
    Activity,
}

impl FailureKind {
    /// Wire string, for the `FAILED` column's companion value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Payment => "payment",
            Self::Activity => "activity",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authoritative order record (§3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id.
    pub id: OrderId,
    /// Flight reference.
    pub flight_id: FlightId,
    /// Workflow execution id; 1:1 with `id` (I6).
    pub workflow_id: String,
    /// Current status.
    pub status: OrderStatus,
    /// Current seat set, ordered.
    pub seats: Vec<SeatCode>,
    /// Total price for the current seat set.
    pub total_price: Money,
    /// Moving hold/payment deadline (I5).
    pub expires_at: DateTime<Utc>,
    /// Set once status becomes `CONFIRMED`.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Set once status becomes `FAILED` or `EXPIRED`.
    pub failure_reason: Option<String>,
    /// Set alongside `failure_reason` when status becomes `FAILED`; `None`
    /// for `EXPIRED` (whose cause is always the hold timer).
    pub failure_kind: Option<FailureKind>,
    /// Number of payment attempts made so far (Q3).
    pub payment_attempts: u32,
}
