//! Advisory per-seat lock store (C1, §4.1).
//!
//! Acquisition is two round trips — read all target keys, then write all
//! keys with a TTL — which is not itself atomic; the authoritative
//! admission gate is the conditional seat-row update in [`crate::order_store`]
//! (§4.1, Q4). Compare-and-delete and compare-and-extend are owner-scoped so
//! retries from the activity layer are idempotent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::errors::LockStoreError;
use crate::types::{FlightId, OrderId, SeatCode};

fn lock_key(flight_id: FlightId, seat_code: &SeatCode) -> String {
    format!("lock:{flight_id}:{seat_code}")
}

/// Trait for the per-seat advisory lock store.
pub trait LockStore: Send + Sync {
    /// Acquires all `seats` for `order`, atomically per key. Fails if any
    /// seat is held by a different order. Re-locking seats already held by
    /// the same order is a no-op success (refresh semantics).
    fn lock_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>>;

    /// Deletes each entry only if its value equals `order_id`. Missing
    /// entries are success.
    fn release_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>>;

    /// Updates the TTL for entries owned by `order_id`; missing or
    /// foreign-owned entries are silent skips.
    fn extend_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>>;

    /// Diagnostic enumeration of every live lock entry for a flight.
    fn enumerate_locks(
        &self,
        flight_id: FlightId,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<SeatCode, OrderId>, LockStoreError>> + Send + '_>>;
}

/// Redis-backed lock store. Acquisition reads all keys in one round trip,
/// then writes all keys with `SET ... EX` in one pipeline; release/extend
/// use a Lua script so compare-and-delete / compare-and-expire are atomic
/// server-side operations (§4.1).
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
    /// Connects to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const EXTEND_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return 0
";

impl LockStore for RedisLockStore {
    fn lock_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let keys: Vec<String> = seats.iter().map(|s| lock_key(flight_id, s)).collect();
            if keys.is_empty() {
                return Ok(());
            }

            let owner = order_id.to_string();
            let existing: Vec<Option<String>> = conn
                .mget(&keys)
                .await
                .map_err(|e| LockStoreError::Backend(e.to_string()))?;

            for (seat, current) in seats.iter().zip(existing.iter()) {
                if let Some(value) = current {
                    if value != &owner {
                        return Err(LockStoreError::Conflict {
                            flight_id,
                            seat_code: seat.clone(),
                        });
                    }
                }
            }

            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.set_ex(key, &owner, ttl.as_secs().max(1));
            }
            pipe.query_async::<()>(&mut conn)
                .await
                .map_err(|e| LockStoreError::Backend(e.to_string()))?;
            Ok(())
        })
    }

    fn release_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let owner = order_id.to_string();
            let script = redis::Script::new(RELEASE_SCRIPT);
            for seat in &seats {
                let key = lock_key(flight_id, seat);
                script
                    .key(key)
                    .arg(&owner)
                    .invoke_async::<i64>(&mut conn)
                    .await
                    .map_err(|e| LockStoreError::Backend(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn extend_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let owner = order_id.to_string();
            let script = redis::Script::new(EXTEND_SCRIPT);
            for seat in &seats {
                let key = lock_key(flight_id, seat);
                script
                    .key(key)
                    .arg(&owner)
                    .arg(ttl.as_secs().max(1))
                    .invoke_async::<i64>(&mut conn)
                    .await
                    .map_err(|e| LockStoreError::Backend(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn enumerate_locks(
        &self,
        flight_id: FlightId,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<SeatCode, OrderId>, LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let pattern = format!("lock:{flight_id}:*");
            let keys: Vec<String> = conn
                .keys(&pattern)
                .await
                .map_err(|e| LockStoreError::Backend(e.to_string()))?;

            let mut result = HashMap::new();
            for key in keys {
                let Some(value): Option<String> = conn
                    .get(&key)
                    .await
                    .map_err(|e| LockStoreError::Backend(e.to_string()))?
                else {
                    continue;
                };
                let Ok(order_id) = value.parse::<uuid::Uuid>() else {
                    continue;
                };
                let Some(seat) = key.rsplit(':').next() else {
                    continue;
                };
                result.insert(SeatCode::new(seat), OrderId::from_uuid(order_id));
            }
            Ok(result)
        })
    }
}

struct Entry {
    order_id: OrderId,
    expires_at: Instant,
}

/// In-memory lock store for tests; TTL enforced by wall-clock `Instant`
/// comparison rather than a background sweep.
#[derive(Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<(FlightId, SeatCode), Entry>>,
}

impl InMemoryLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entries: &HashMap<(FlightId, SeatCode), Entry>, key: &(FlightId, SeatCode)) -> Option<OrderId> {
        entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.order_id)
            } else {
                None
            }
        })
    }
}

impl LockStore for InMemoryLockStore {
    fn lock_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().map_err(|_| LockStoreError::Backend("poisoned".into()))?;
            for seat in &seats {
                let key = (flight_id, seat.clone());
                if let Some(owner) = Self::live(&entries, &key) {
                    if owner != order_id {
                        return Err(LockStoreError::Conflict {
                            flight_id,
                            seat_code: seat.clone(),
                        });
                    }
                }
            }
            let expires_at = Instant::now() + ttl;
            for seat in seats {
                entries.insert((flight_id, seat), Entry { order_id, expires_at });
            }
            Ok(())
        })
    }

    fn release_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().map_err(|_| LockStoreError::Backend("poisoned".into()))?;
            for seat in seats {
                let key = (flight_id, seat);
                if matches!(entries.get(&key), Some(entry) if entry.order_id == order_id) {
                    entries.remove(&key);
                }
            }
            Ok(())
        })
    }

    fn extend_seats(
        &self,
        flight_id: FlightId,
        seats: Vec<SeatCode>,
        order_id: OrderId,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().map_err(|_| LockStoreError::Backend("poisoned".into()))?;
            for seat in seats {
                let key = (flight_id, seat);
                if let Some(entry) = entries.get_mut(&key) {
                    if entry.order_id == order_id {
                        entry.expires_at = Instant::now() + ttl;
                    }
                }
            }
            Ok(())
        })
    }

    fn enumerate_locks(
        &self,
        flight_id: FlightId,
    ) -> Pin<Box<dyn Future<Output = Result<HashMap<SeatCode, OrderId>, LockStoreError>> + Send + '_>> {
        Box::pin(async move {
            let entries = self.entries.lock().map_err(|_| LockStoreError::Backend("poisoned".into()))?;
            Ok(entries
                .iter()
                .filter(|(key, entry)| key.0 == flight_id && entry.expires_at > Instant::now())
                .map(|((_, seat), entry)| (seat.clone(), entry.order_id))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(codes: &[&str]) -> Vec<SeatCode> {
        codes.iter().map(|c| SeatCode::new(*c)).collect()
    }

    #[tokio::test]
    async fn lock_then_relock_same_order_succeeds() {
        let store = InMemoryLockStore::new();
        let flight = FlightId::new();
        let order = OrderId::new();
        store
            .lock_seats(flight, seats(&["1A"]), order, Duration::from_secs(60))
            .await
            .unwrap();
        store
            .lock_seats(flight, seats(&["1A"]), order, Duration::from_secs(60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lock_conflicts_with_other_owner() {
        let store = InMemoryLockStore::new();
        let flight = FlightId::new();
        let order_a = OrderId::new();
        let order_b = OrderId::new();
        store
            .lock_seats(flight, seats(&["1A"]), order_a, Duration::from_secs(60))
            .await
            .unwrap();
        let result = store
            .lock_seats(flight, seats(&["1A"]), order_b, Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(LockStoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn release_is_idempotent_and_owner_scoped() {
        let store = InMemoryLockStore::new();
        let flight = FlightId::new();
        let order_a = OrderId::new();
        let order_b = OrderId::new();
        store
            .lock_seats(flight, seats(&["1A"]), order_a, Duration::from_secs(60))
            .await
            .unwrap();

        store.release_seats(flight, seats(&["1A"]), order_b).await.unwrap();
        let locks = store.enumerate_locks(flight).await.unwrap();
        assert_eq!(locks.get(&SeatCode::new("1A")), Some(&order_a));

        store.release_seats(flight, seats(&["1A"]), order_a).await.unwrap();
        store.release_seats(flight, seats(&["1A"]), order_a).await.unwrap();
        let locks = store.enumerate_locks(flight).await.unwrap();
        assert!(locks.is_empty());
    }
}
