//! Booking core HTTP server.
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;
use std::time::Duration;

use booking::config::Config;
use booking::facade::BookingFacade;
use booking::flights::postgres::PostgresFlightRepository;
use booking::flights::FlightRepository;
use booking::lock_store::RedisLockStore;
use booking::order_store::postgres::PostgresOrderStore;
use booking::payment_simulator::DefaultPaymentSimulator;
use booking::reconciler::Reconciler;
use booking::server::{build_router, AppState};
use booking::workflow::BookingEnvironment;
use booking_core::environment::SystemClock;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,booking=debug,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(postgres = %config.postgres.url, redis = %config.redis.url, "configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .connect(&config.postgres.url)
        .await?;
    let lock_store = Arc::new(RedisLockStore::connect(&config.redis.url).await?);
    let order_store = Arc::new(PostgresOrderStore::new(pool.clone()));
    let flight_repository = Arc::new(PostgresFlightRepository::new(pool));

    let environment = BookingEnvironment {
        clock: Arc::new(SystemClock),
        lock_store: lock_store.clone(),
        order_store: order_store.clone(),
        payment_simulator: DefaultPaymentSimulator::shared(config.workflow.payment_failure_probability),
        hold_duration: config.workflow.hold_duration(),
        lock_ttl: config.workflow.lock_ttl(),
        payment_max_attempts: config.workflow.payment_max_attempts,
        payment_backoff_base: Duration::from_secs(config.workflow.payment_backoff_base_secs),
        payment_attempt_deadline: Duration::from_secs(config.workflow.payment_attempt_deadline_secs),
    };

    let facade = BookingFacade::new(environment, order_store.clone());
    let reconciler = Reconciler::new(lock_store, order_store, Duration::from_secs(config.workflow.reconciler_interval_secs));
    let flights_for_reconciler = flight_repository.clone();
    tokio::spawn(async move {
        reconciler
            .run_forever(|| {
                let flights = flights_for_reconciler.clone();
                async move { flights.list_flights().await.map(|fs| fs.into_iter().map(|f| f.id).collect()).unwrap_or_default() }
            })
            .await
    });

    let state = AppState::new(facade, flight_repository);
    let router = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(%addr, "booking server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
