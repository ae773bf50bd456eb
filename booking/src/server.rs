//! Thin HTTP layer over [`crate::facade::BookingFacade`] (§6).
//!
//! Routes and status codes are normative per the spec's interface table;
//! everything here does is translate JSON in, call the facade, JSON out.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiErrorCode, OrderStoreError, SignalError, WorkflowError};
use crate::facade::BookingFacade;
use crate::flights::FlightRepository;
use crate::types::{Flight, FlightId, OrderId, OrderStatus, Seat, SeatCode};
use crate::workflow::BookingStatus;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    facade: BookingFacade,
    flights: Arc<dyn FlightRepository>,
}

impl AppState {
    /// Builds the shared state handed to the router.
    #[must_use]
    pub const fn new(facade: BookingFacade, flights: Arc<dyn FlightRepository>) -> Self {
        Self { facade, flights }
    }
}

/// Error body shape (§6): `{error, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Wraps an [`ApiErrorCode`] with the HTTP status it maps to.
pub struct ApiError {
    status: StatusCode,
    code: ApiErrorCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.as_str(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<OrderStoreError> for ApiError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::OrderNotFound(_) => Self::new(StatusCode::NOT_FOUND, ApiErrorCode::OrderNotFound, err.to_string()),
            OrderStoreError::FlightNotFound(_) => Self::new(StatusCode::NOT_FOUND, ApiErrorCode::FlightNotFound, err.to_string()),
            OrderStoreError::SeatsUnavailable { .. } => {
                Self::new(StatusCode::CONFLICT, ApiErrorCode::SeatsUnavailable, err.to_string())
            }
            OrderStoreError::IllegalTransition { .. } => {
                Self::new(StatusCode::CONFLICT, ApiErrorCode::WorkflowError, err.to_string())
            }
            OrderStoreError::Backend(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, ApiErrorCode::InternalError, err.to_string()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Expired(_) => Self::new(StatusCode::CONFLICT, ApiErrorCode::OrderExpired, err.to_string()),
            WorkflowError::Canceled(_) => Self::new(StatusCode::CONFLICT, ApiErrorCode::WorkflowError, err.to_string()),
            WorkflowError::PaymentFailed { .. } => Self::new(StatusCode::CONFLICT, ApiErrorCode::PaymentFailed, err.to_string()),
            WorkflowError::ActivityFailed { .. } => {
                Self::new(StatusCode::CONFLICT, ApiErrorCode::SeatsUnavailable, err.to_string())
            }
        }
    }
}

impl From<SignalError> for ApiError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::Order(err) => err.into(),
            SignalError::Workflow(err) => err.into(),
        }
    }
}

/// Builds the Axum router per §6's route table.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/flights", get(list_flights))
        .route("/flights/:id", get(get_flight))
        .route("/orders", post(create_order))
        .route("/orders/:id/seats", put(update_seats))
        .route("/orders/:id/status", get(get_status))
        .route("/orders/:id/pay", post(pay_order))
        .route("/orders/:id", delete(cancel_order))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct FlightResponse {
    #[serde(flatten)]
    flight: Flight,
}

#[derive(Debug, Serialize)]
struct FlightDetailResponse {
    #[serde(flatten)]
    flight: Flight,
    seats: Vec<Seat>,
}

async fn list_flights(State(state): State<AppState>) -> Result<Json<Vec<FlightResponse>>, ApiError> {
    let flights = state.flights.list_flights().await?;
    Ok(Json(flights.into_iter().map(|flight| FlightResponse { flight }).collect()))
}

async fn get_flight(State(state): State<AppState>, Path(id): Path<uuid::Uuid>) -> Result<Json<FlightDetailResponse>, ApiError> {
    let (flight, seats) = state.flights.get_flight(FlightId::from_uuid(id)).await?;
    Ok(Json(FlightDetailResponse { flight, seats }))
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    #[serde(rename = "flightId")]
    flight_id: uuid::Uuid,
    seats: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrderResponse {
    #[serde(rename = "orderId")]
    order_id: OrderId,
    #[serde(rename = "workflowId")]
    workflow_id: String,
    status: OrderStatus,
    #[serde(rename = "expiresAt")]
    expires_at: DateTime<Utc>,
}

async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    if req.seats.is_empty() {
        // Q1: empty seat sets are only valid for an in-flight update-seats
        // signal, never for the initial request.
        return Err(ApiError::new(StatusCode::BAD_REQUEST, ApiErrorCode::InvalidSeats, "seats must not be empty"));
    }
    let seats: Vec<SeatCode> = req.seats.into_iter().map(SeatCode::new).collect();
    let (flight, _) = state.flights.get_flight(FlightId::from_uuid(req.flight_id)).await?;
    let unit_price = flight.unit_price;

    let started = state
        .facade
        .start_booking_workflow(FlightId::from_uuid(req.flight_id), seats, unit_price)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: started.order_id,
            workflow_id: started.workflow_id,
            status: started.status,
            expires_at: started.expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateSeatsRequest {
    seats: Vec<String>,
}

async fn update_seats(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<UpdateSeatsRequest>,
) -> Result<Json<BookingStatus>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let seats: Vec<SeatCode> = req.seats.into_iter().map(SeatCode::new).collect();
    state.facade.signal_update_seats(order_id, seats).await?;
    let status = state.facade.query_status(order_id).await?;
    Ok(Json(status))
}

async fn get_status(State(state): State<AppState>, Path(id): Path<uuid::Uuid>) -> Result<Json<BookingStatus>, ApiError> {
    let status = state.facade.query_status(OrderId::from_uuid(id)).await?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
struct PayRequest {
    #[serde(rename = "paymentCode")]
    payment_code: String,
}

#[derive(Debug, Serialize)]
struct PayResponse {
    status: OrderStatus,
}

async fn pay_order(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<PayRequest>,
) -> Result<(StatusCode, Json<PayResponse>), ApiError> {
    if req.payment_code.len() != 5 || !req.payment_code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, ApiErrorCode::InvalidRequest, "malformed payment code"));
    }
    let order_id = OrderId::from_uuid(id);
    state.facade.signal_proceed(order_id, req.payment_code).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PayResponse {
            status: OrderStatus::PaymentProcessing,
        }),
    ))
}

async fn cancel_order(State(state): State<AppState>, Path(id): Path<uuid::Uuid>) -> Result<StatusCode, ApiError> {
    state.facade.signal_cancel(OrderId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
