//! In-memory `EventStore` for fast, deterministic tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use booking_core::event::SerializedEvent;
use booking_core::event_store::{EventStore, EventStoreError};
use booking_core::stream::{StreamId, Version};

#[derive(Default)]
struct Stream {
    events: Vec<SerializedEvent>,
    snapshot: Option<(Version, Vec<u8>)>,
}

/// An `EventStore` backed by an in-process `HashMap`, guarded by a `Mutex`.
///
/// Stream versions are the number of events appended so far; there is no
/// persistence across process restarts, which is exactly what makes this
/// useful for unit and integration tests.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<StreamId, Stream>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
            let stream = streams.entry(stream_id.clone()).or_default();
            let current = Version::new(stream.events.len() as u64);

            if let Some(expected) = expected_version {
                if expected != current {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual: current,
                    });
                }
            }

            stream.events.extend(events);
            Ok(Version::new(stream.events.len() as u64))
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
            let Some(stream) = streams.get(&stream_id) else {
                return Ok(Vec::new());
            };
            let skip = from_version.map_or(0, |v| v.value() as usize);
            Ok(stream.events.iter().skip(skip).cloned().collect())
        })
    }

    fn save_snapshot(
        &self,
        stream_id: StreamId,
        version: Version,
        state: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
            let stream = streams.entry(stream_id).or_default();
            stream.snapshot = Some((version, state));
            Ok(())
        })
    }

    fn load_snapshot(
        &self,
        stream_id: StreamId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<(Version, Vec<u8>)>, EventStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let streams = self.streams.lock().unwrap_or_else(|e| e.into_inner());
            Ok(streams.get(&stream_id).and_then(|s| s.snapshot.clone()))
        })
    }
}
