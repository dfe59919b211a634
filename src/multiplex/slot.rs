use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedSemaphorePermit;

use crate::{
    error::SinkError,
    sink::Sink,
    stream::ResumableStream,
    transport,
};

use super::analytics::StreamAnalytics;

pub(super) type SharedAnalytics = Arc<Mutex<StreamAnalytics>>;

pub(super) fn lock(analytics: &SharedAnalytics) -> MutexGuard<'_, StreamAnalytics> {
    analytics.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One admitted logical stream.
///
/// Holding the permit is what occupies an admission place; dropping the slot frees it.
pub(super) struct Slot {
    pub tool_name: String,
    pub priority: i32,
    pub analytics: SharedAnalytics,
    /// `None` while the stream is still being opened.
    pub stream: Option<ResumableStream>,
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    pub fn new(
        tool_name: &str,
        priority: i32,
        analytics: SharedAnalytics,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            priority,
            analytics,
            stream: None,
            _permit: permit,
        }
    }
}

/// Logical view of the shared physical sink.
///
/// Prefixes every write with the stream's `id:` tag and counts it in the slot's
/// analytics. `end` is a no-op: the physical sink belongs to the manager.
pub(super) struct TaggedSink {
    stream_id: String,
    physical: Arc<dyn Sink>,
    analytics: SharedAnalytics,
}

impl TaggedSink {
    pub fn new(stream_id: &str, physical: Arc<dyn Sink>, analytics: SharedAnalytics) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            physical,
            analytics,
        }
    }
}

impl Sink for TaggedSink {
    fn write(&self, frame: &str) -> Result<(), SinkError> {
        let tagged = transport::tag(&self.stream_id, frame);
        let res = self.physical.write(&tagged);
        let mut a = lock(&self.analytics);
        match res {
            Ok(()) => {
                a.events_emitted += 1;
                a.bytes_transferred += tagged.len() as u64;
            }
            Err(_) => a.errors += 1,
        }
        res
    }

    fn end(&self) {}
}
