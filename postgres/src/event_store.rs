//! `PostgreSQL`-backed implementation of [`booking_core::event_store::EventStore`].

use std::future::Future;
use std::pin::Pin;

use booking_core::event::SerializedEvent;
use booking_core::event_store::{EventStore, EventStoreError};
use booking_core::stream::{StreamId, Version};
use sqlx::{PgPool, Row};

/// Event store backed by a `PostgreSQL` database.
///
/// Expects two tables to exist (see `migrations/`):
///
/// ```sql
/// CREATE TABLE events (
///     stream_id   TEXT NOT NULL,
///     version     BIGINT NOT NULL,
///     event_type  TEXT NOT NULL,
///     data        BYTEA NOT NULL,
///     metadata    JSONB,
///     inserted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
///     PRIMARY KEY (stream_id, version)
/// );
///
/// CREATE TABLE snapshots (
///     stream_id TEXT PRIMARY KEY,
///     version   BIGINT NOT NULL,
///     state     BYTEA NOT NULL,
///     saved_at  TIMESTAMPTZ NOT NULL DEFAULT now()
/// );
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `PostgreSQL` and run the event-store migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// migrations fail to apply.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

}

impl EventStore for PostgresEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            let current_row = sqlx::query(
                "SELECT COALESCE(MAX(version), 0) AS version FROM events WHERE stream_id = $1 FOR UPDATE",
            )
            .bind(stream_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let current: i64 = current_row
                .try_get("version")
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            let current_version = Version::new(current as u64);

            if let Some(expected) = expected_version {
                if expected != current_version {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual: current_version,
                    });
                }
            }

            let mut version = current_version;
            for event in events {
                version = version.next();
                sqlx::query(
                    "INSERT INTO events (stream_id, version, event_type, data, metadata) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(stream_id.as_str())
                .bind(version.value() as i64)
                .bind(&event.event_type)
                .bind(&event.data)
                .bind(&event.metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            }

            tx.commit()
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            Ok(version)
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let from = from_version.map_or(0, |v| v.value() as i64);
            let rows = sqlx::query(
                "SELECT event_type, data, metadata FROM events \
                 WHERE stream_id = $1 AND version > $2 ORDER BY version ASC",
            )
            .bind(stream_id.as_str())
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            rows.into_iter()
                .map(|row| {
                    Ok(SerializedEvent {
                        event_type: row
                            .try_get("event_type")
                            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?,
                        data: row
                            .try_get("data")
                            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?,
                        metadata: row
                            .try_get("metadata")
                            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?,
                    })
                })
                .collect()
        })
    }

    fn save_snapshot(
        &self,
        stream_id: StreamId,
        version: Version,
        state: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO snapshots (stream_id, version, state) VALUES ($1, $2, $3) \
                 ON CONFLICT (stream_id) DO UPDATE SET version = EXCLUDED.version, \
                 state = EXCLUDED.state, saved_at = now()",
            )
            .bind(stream_id.as_str())
            .bind(version.value() as i64)
            .bind(&state)
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;
            Ok(())
        })
    }

    fn load_snapshot(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(Version, Vec<u8>)>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let row = sqlx::query("SELECT version, state FROM snapshots WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

            let Some(row) = row else {
                return Ok(None);
            };
            let version: i64 = row
                .try_get("version")
                .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;
            let state: Vec<u8> = row
                .try_get("state")
                .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;
            Ok(Some((Version::new(version as u64), state)))
        })
    }
}
