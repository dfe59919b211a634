//! # Multiplex manager: many resumable streams over one physical sink.
//!
//! ```text
//! create_stream(tool, args, opts)
//!   ├─ closed / no admission permit ──► None + StreamRejected
//!   ├─ reserve slot (permit + analytics) under a fresh `mux_{ts}_{rand}` id
//!   ├─ write `stream_start` on the physical sink
//!   ├─ ResumableStream::open(controller ─► TaggedSink ─► physical)
//!   │    └─ future dropped here ──► reservation frees the slot, controller aborted
//!   └─ StreamStarted ──► Some(stream)
//!
//! producer: complete / error / abort ──► release hook ──► slot removed, StreamFinished
//! cancel_stream(id) ──► slot removed ──► abort ──► `stream_cancel` + StreamCancelled
//! close()           ──► all slots removed ──► abort each ──► ManagerClosed ──► physical.end()
//! ```
//!
//! ## Rules
//! - Admission fails closed: there is no queue. `priority` is recorded, never consulted.
//! - The slot map lock is never held while calling into a stream; cancel and close
//!   remove the slot first, so the release hook they trigger finds nothing to do.
//! - Manager frames (`stream_start`, `stream_cancel`, `heartbeat`) are routed under
//!   [`MANAGER_ROUTE`] and carry envelope ids `mux_{n}`.
//! - Accessors read the live slot map; a stream is visible from admission until release.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use rand::{Rng, distr::Alphanumeric};
use serde_json::{Value, json};
use tokio::sync::{Semaphore, TryAcquireError};

use crate::{
    checkpoint::CheckpointStore,
    clock::{Clock, SystemClock},
    config::MultiplexConfig,
    envelope::{Envelope, EventType},
    error::StreamError,
    events::{Bus, Notice, NoticeKind},
    sink::Sink,
    stream::{ResumableStream, ResumeOptions, StreamController, StreamState},
    transport::{self, MANAGER_ROUTE},
};

use super::analytics::StreamAnalytics;
use super::slot::{SharedAnalytics, Slot, TaggedSink, lock};

/// Options of [`MultiplexManager::create_stream`].
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    /// Recorded with the slot; admission is FIFO regardless.
    pub priority: i32,
    /// Id of a stream whose checkpoint should be restored.
    pub resume_from: Option<String>,
}

impl CreateOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn resume_from(mut self, stream_id: impl Into<String>) -> Self {
        self.resume_from = Some(stream_id.into());
        self
    }
}

struct State {
    physical: Arc<dyn Sink>,
    store: Arc<dyn CheckpointStore>,
    config: MultiplexConfig,
    clock: Arc<dyn Clock>,
    bus: Bus,
    admission: Arc<Semaphore>,
    slots: Mutex<HashMap<String, Slot>>,
    frames: AtomicU64,
    closed: AtomicBool,
}

impl State {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encodes and writes one manager frame; failures are logged.
    fn write_frame(&self, kind: EventType, data: Value) {
        let seq = self.frames.fetch_add(1, Ordering::Relaxed);
        let mut env = Envelope::new(kind, data);
        env.stamp(MANAGER_ROUTE, seq, self.clock.now_ms());

        let res = self
            .config
            .stream
            .transport
            .encode(MANAGER_ROUTE, &env)
            .and_then(|frame| {
                let routed = transport::tag(MANAGER_ROUTE, &frame);
                self.physical.write(&routed).map_err(StreamError::from)
            });
        if let Err(e) = res {
            tracing::warn!(kind = %env.kind, error = %e, "manager frame write failed");
        }
    }

    /// Runs once per stream, after its terminal transition.
    fn release(&self, stream_id: &str, outcome: StreamState) {
        let (slot, active) = {
            let mut slots = self.slots();
            let slot = slots.remove(stream_id);
            (slot, slots.len())
        };
        // cancel_stream / close already took the slot
        let Some(slot) = slot else { return };

        {
            let mut a = lock(&slot.analytics);
            a.close(self.clock.now_ms());
            if outcome == StreamState::Errored {
                a.errors += 1;
            }
        }
        tracing::debug!(stream = stream_id, outcome = outcome.as_label(), active, "stream released");
        self.bus.publish(
            Notice::new(NoticeKind::StreamFinished)
                .with_stream(stream_id)
                .with_tool(slot.tool_name.as_str())
                .with_reason(outcome.as_label())
                .with_active(active),
        );
    }

    fn reject(&self, tool_name: &str, reason: &'static str) {
        let active = self.slots().len();
        tracing::warn!(tool = tool_name, reason, active, "stream rejected");
        self.bus.publish(
            Notice::new(NoticeKind::StreamRejected)
                .with_tool(tool_name)
                .with_reason(reason)
                .with_active(active),
        );
    }
}

/// Slot held by a `create_stream` call that has not returned yet.
///
/// Dropped while still armed (the caller gave up on the future), it removes the
/// slot, which frees the admission permit, and aborts the controller.
struct Reservation<'a> {
    state: &'a State,
    stream_id: String,
    controller: Option<StreamController>,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let slot = self.state.slots().remove(&self.stream_id);
        if let Some(slot) = &slot {
            lock(&slot.analytics).close(self.state.clock.now_ms());
        }
        // slot is gone, so the release hook finds nothing
        if let Some(controller) = &self.controller {
            controller.abort();
        }
        tracing::debug!(stream = %self.stream_id, "stream creation abandoned");
    }
}

/// Bounded set of resumable streams sharing one physical sink.
///
/// Cheap to clone; all clones drive the same manager.
///
/// ## Example
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use serde_json::json;
/// use toolstream::{
///     CreateOptions, EventType, MemoryCheckpointStore, MemorySink, MultiplexConfig,
///     MultiplexManager, StoreConfig,
/// };
///
/// let physical = MemorySink::new();
/// let store = MemoryCheckpointStore::new(StoreConfig::default());
/// let mux = MultiplexManager::new(
///     physical.clone(),
///     store,
///     MultiplexConfig {
///         max_concurrent_streams: 1,
///         ..MultiplexConfig::default()
///     },
/// );
///
/// let a = mux.create_stream("scan", json!({}), CreateOptions::default()).await.unwrap();
/// assert!(mux.create_stream("scan", json!({}), CreateOptions::default()).await.is_none());
///
/// a.send_data(EventType::Chunk, json!([1])).await.unwrap();
/// a.complete(None).await.unwrap();
/// assert_eq!(mux.get_stream_count(), 0);
///
/// mux.close();
/// assert!(physical.is_ended());
/// # }
/// ```
#[derive(Clone)]
pub struct MultiplexManager {
    state: Arc<State>,
}

impl MultiplexManager {
    /// Creates a manager writing into `physical` and checkpointing into `store`.
    pub fn new(
        physical: Arc<dyn Sink>,
        store: Arc<dyn CheckpointStore>,
        config: MultiplexConfig,
    ) -> Self {
        Self::with_clock(physical, store, config, Arc::new(SystemClock))
    }

    /// Creates a manager reading time from `clock`.
    pub fn with_clock(
        physical: Arc<dyn Sink>,
        store: Arc<dyn CheckpointStore>,
        config: MultiplexConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = Bus::new(config.bus_capacity);
        let admission = Arc::new(Semaphore::new(config.max_concurrent_streams));
        Self {
            state: Arc::new(State {
                physical,
                store,
                config,
                clock,
                bus,
                admission,
                slots: Mutex::new(HashMap::new()),
                frames: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Bus carrying this manager's notices (and those of its streams).
    pub fn bus(&self) -> &Bus {
        &self.state.bus
    }

    /// Admits and opens a new logical stream.
    ///
    /// Returns `None` when the admission ceiling is reached or the manager is closed;
    /// a [`NoticeKind::StreamRejected`] notice is published in that case.
    pub async fn create_stream(
        &self,
        tool_name: &str,
        args: Value,
        opts: CreateOptions,
    ) -> Option<ResumableStream> {
        let st = &self.state;
        if st.closed.load(Ordering::Acquire) {
            st.reject(tool_name, "closed");
            return None;
        }
        let permit = match st.admission.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                st.reject(tool_name, "capacity");
                return None;
            }
            Err(TryAcquireError::Closed) => {
                st.reject(tool_name, "closed");
                return None;
            }
        };

        let now = st.clock.now_ms();
        let (stream_id, analytics) = {
            let mut slots = st.slots();
            let mut id = new_stream_id(now);
            while slots.contains_key(&id) {
                id = new_stream_id(now);
            }
            let analytics: SharedAnalytics =
                Arc::new(Mutex::new(StreamAnalytics::new(&id, tool_name, now)));
            slots.insert(
                id.clone(),
                Slot::new(tool_name, opts.priority, analytics.clone(), permit),
            );
            (id, analytics)
        };
        let mut reservation = Reservation {
            state: st.as_ref(),
            stream_id: stream_id.clone(),
            controller: None,
            armed: true,
        };

        st.write_frame(
            EventType::Other("stream_start".into()),
            json!({ "streamId": stream_id, "toolName": tool_name }),
        );

        let weak: Weak<State> = Arc::downgrade(&self.state);
        let hook_id = stream_id.clone();
        let tagged = Arc::new(TaggedSink::new(
            &stream_id,
            st.physical.clone(),
            analytics.clone(),
        ));
        let controller = StreamController::builder(stream_id.as_str(), tagged)
            .config(st.config.stream.clone())
            .clock(st.clock.clone())
            .tool(tool_name)
            .on_release(move |outcome| {
                if let Some(st) = weak.upgrade() {
                    st.release(&hook_id, outcome);
                }
            })
            .build();
        reservation.controller = Some(controller.clone());

        let mut resume = ResumeOptions::new(tool_name, args)
            .config(st.config.resume.clone())
            .bus(st.bus.clone());
        resume.resume_from = opts.resume_from;
        let stream = ResumableStream::open(controller, st.store.clone(), resume).await;

        let active = {
            let mut slots = st.slots();
            match slots.get_mut(&stream_id) {
                Some(slot) => {
                    slot.stream = Some(stream.clone());
                    reservation.armed = false;
                    Some(slots.len())
                }
                None => None,
            }
        };
        // cancelled or closed while opening
        let Some(active) = active else {
            reservation.armed = false;
            stream.abort();
            return None;
        };
        lock(&analytics).resume_count = stream.resume_count();

        tracing::debug!(stream = %stream_id, tool = tool_name, priority = opts.priority, active, "stream started");
        st.bus.publish(
            Notice::new(NoticeKind::StreamStarted)
                .with_stream(stream_id.as_str())
                .with_tool(tool_name)
                .with_active(active),
        );
        Some(stream)
    }

    /// Aborts the stream, writes `stream_cancel` and frees its slot.
    ///
    /// Returns `false` if `stream_id` is not an active stream of this manager.
    pub fn cancel_stream(&self, stream_id: &str) -> bool {
        let st = &self.state;
        let (slot, active) = {
            let mut slots = st.slots();
            let slot = slots.remove(stream_id);
            (slot, slots.len())
        };
        let Some(slot) = slot else { return false };

        lock(&slot.analytics).close(st.clock.now_ms());
        if let Some(stream) = &slot.stream {
            stream.abort();
        }
        st.write_frame(
            EventType::Other("stream_cancel".into()),
            json!({ "streamId": stream_id }),
        );

        tracing::debug!(stream = stream_id, active, "stream cancelled");
        st.bus.publish(
            Notice::new(NoticeKind::StreamCancelled)
                .with_stream(stream_id)
                .with_tool(slot.tool_name.as_str())
                .with_active(active),
        );
        true
    }

    /// Writes one manager `heartbeat` frame with the active stream count.
    pub fn send_heartbeat(&self) {
        let st = &self.state;
        let active = st.slots().len();
        st.write_frame(
            EventType::Heartbeat,
            json!({ "timestamp": st.clock.now_ms(), "activeStreams": active }),
        );
    }

    /// Aborts every stream, clears all slots and ends the physical sink.
    ///
    /// Later calls are no-ops; later `create_stream` calls are rejected.
    pub fn close(&self) {
        let st = &self.state;
        if st.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        st.admission.close();

        let drained: Vec<(String, Slot)> = st.slots().drain().collect();
        let now = st.clock.now_ms();
        for (_, slot) in &drained {
            lock(&slot.analytics).close(now);
            if let Some(stream) = &slot.stream {
                stream.abort();
            }
        }

        tracing::debug!(aborted = drained.len(), "multiplex manager closed");
        st.bus
            .publish(Notice::new(NoticeKind::ManagerClosed).with_active(drained.len()));
        drop(drained);
        st.physical.end();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Analytics of every active stream, ordered by stream id.
    pub fn get_analytics(&self) -> Vec<StreamAnalytics> {
        let slots = self.state.slots();
        let mut out: Vec<StreamAnalytics> =
            slots.values().map(|s| lock(&s.analytics).clone()).collect();
        out.sort_unstable_by(|a, b| a.stream_id.cmp(&b.stream_id));
        out
    }

    /// Analytics of one active stream.
    pub fn analytics(&self, stream_id: &str) -> Option<StreamAnalytics> {
        let slots = self.state.slots();
        slots.get(stream_id).map(|s| lock(&s.analytics).clone())
    }

    /// Sorted ids of the active streams.
    pub fn get_active_streams(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.slots().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of active streams.
    pub fn get_stream_count(&self) -> usize {
        self.state.slots().len()
    }

    /// Handle of an active stream.
    pub fn stream(&self, stream_id: &str) -> Option<ResumableStream> {
        self.state
            .slots()
            .get(stream_id)
            .and_then(|s| s.stream.clone())
    }

    /// Priority recorded at admission.
    pub fn slot_priority(&self, stream_id: &str) -> Option<i32> {
        self.state.slots().get(stream_id).map(|s| s.priority)
    }
}

impl fmt::Debug for MultiplexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexManager")
            .field("active", &self.get_stream_count())
            .field("max", &self.state.config.max_concurrent_streams)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// `mux_{ms}_{9 lowercase alphanumerics}`.
fn new_stream_id(now_ms: u64) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{MANAGER_ROUTE}_{now_ms}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{Checkpoint, MemoryCheckpointStore};
    use crate::error::CheckpointError;
    use async_trait::async_trait;
    use std::time::Duration;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::sink::MemorySink;
    use crate::transport::split_tag;
    use std::collections::HashSet;

    const T0: u64 = 1_700_000_000_000;

    struct Fixture {
        mux: MultiplexManager,
        physical: Arc<MemorySink>,
        store: Arc<MemoryCheckpointStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(max: usize) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let physical = MemorySink::new();
        let store = MemoryCheckpointStore::with_clock(StoreConfig::default(), clock.clone());
        let mux = MultiplexManager::with_clock(
            physical.clone(),
            store.clone(),
            MultiplexConfig {
                max_concurrent_streams: max,
                ..MultiplexConfig::default()
            },
            clock.clone(),
        );
        Fixture {
            mux,
            physical,
            store,
            clock,
        }
    }

    async fn create(mux: &MultiplexManager) -> Option<ResumableStream> {
        mux.create_stream("whale_tracker", json!({"chain": "eth"}), CreateOptions::default())
            .await
    }

    #[test]
    fn stream_ids_have_expected_shape() {
        let id = new_stream_id(T0);
        let suffix = id.strip_prefix(&format!("mux_{T0}_")).unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[tokio::test]
    async fn admission_ceiling_reuses_freed_slot() {
        let f = fixture(2);
        let mut rx = f.mux.bus().subscribe();

        let a = create(&f.mux).await.unwrap();
        let b = create(&f.mux).await.unwrap();
        assert!(create(&f.mux).await.is_none());
        assert_eq!(f.mux.get_stream_count(), 2);

        assert!(f.mux.cancel_stream(a.stream_id()));
        assert!(!f.mux.cancel_stream(a.stream_id()));
        let c = create(&f.mux).await.unwrap();

        let ids: HashSet<&str> = [a.stream_id(), b.stream_id(), c.stream_id()].into();
        assert_eq!(ids.len(), 3);
        assert_eq!(f.mux.get_stream_count(), 2);

        let mut rejected = 0;
        while let Ok(n) = rx.try_recv() {
            if n.kind == NoticeKind::StreamRejected {
                rejected += 1;
                assert_eq!(n.reason.as_deref(), Some("capacity"));
                assert_eq!(n.active, Some(2));
            }
        }
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn zero_ceiling_rejects_everything() {
        let f = fixture(0);
        assert!(create(&f.mux).await.is_none());
        assert!(f.physical.frames().is_empty());
    }

    #[tokio::test]
    async fn cancel_leaves_other_stream_untouched() {
        let f = fixture(4);
        let a = create(&f.mux).await.unwrap();
        let b = create(&f.mux).await.unwrap();

        for i in 0..3 {
            a.send_data(EventType::Chunk, json!(i)).await.unwrap();
            b.send_data(EventType::Chunk, json!(i)).await.unwrap();
        }
        b.set_cursor("page:2");
        let before = f.mux.analytics(b.stream_id()).unwrap();

        assert!(f.mux.cancel_stream(a.stream_id()));
        assert!(a.is_aborted());
        assert!(b.is_active());
        assert_eq!(b.position(), 3);
        assert_eq!(b.cursor().as_deref(), Some("page:2"));
        assert_eq!(f.mux.analytics(b.stream_id()).unwrap(), before);
        assert_eq!(before.events_emitted, 3);
        assert_eq!(f.mux.get_active_streams(), vec![b.stream_id().to_string()]);
        assert!(!f.physical.is_ended());

        let last = f.physical.frames().pop().unwrap();
        assert!(last.contains("event: stream_cancel\n"));
        assert!(last.contains(a.stream_id()));
    }

    #[tokio::test]
    async fn physical_writes_demux_by_tag() {
        let f = fixture(4);
        let a = create(&f.mux).await.unwrap();
        let b = create(&f.mux).await.unwrap();
        a.send_data(EventType::Chunk, json!("a0")).await.unwrap();
        b.send_data(EventType::Chunk, json!("b0")).await.unwrap();
        a.send_data(EventType::Chunk, json!("a1")).await.unwrap();

        let frames = f.physical.frames();
        assert!(frames[0].starts_with("id: mux\nid: mux_0\nevent: stream_start\n"));

        let mut per_stream: HashMap<String, Vec<String>> = HashMap::new();
        for frame in &frames {
            let (id, inner) = split_tag(frame).unwrap();
            per_stream.entry(id.to_string()).or_default().push(inner.to_string());
        }
        // two stream_start frames, nothing else
        assert_eq!(per_stream[MANAGER_ROUTE].len(), 2);
        assert_eq!(per_stream.len(), 3);
        let a_frames = &per_stream[a.stream_id()];
        assert_eq!(a_frames.len(), 2);
        assert!(a_frames[0].starts_with(&format!("id: {}_0\n", a.stream_id())));
        assert!(a_frames[1].contains(r#"data: "a1""#));
        assert_eq!(per_stream[b.stream_id()].len(), 1);
    }

    #[tokio::test]
    async fn finishing_releases_slot_and_checkpoint() {
        let f = fixture(1);
        let mut rx = f.mux.bus().subscribe();
        let a = create(&f.mux).await.unwrap();
        a.create_checkpoint(None).await.unwrap();
        assert!(f.store.get(a.stream_id()).await.unwrap().is_some());

        a.complete(Some(json!({"whales": 3}))).await.unwrap();
        assert_eq!(f.mux.get_stream_count(), 0);
        assert!(f.store.get(a.stream_id()).await.unwrap().is_none());
        assert!(!f.physical.is_ended());

        let finished = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|n| n.kind == NoticeKind::StreamFinished)
            .unwrap();
        assert_eq!(finished.reason.as_deref(), Some("completed"));
        assert_eq!(finished.active, Some(0));

        let b = create(&f.mux).await.unwrap();
        b.fail("RpcError", "node unreachable").unwrap();
        assert_eq!(f.mux.get_stream_count(), 0);
    }

    #[tokio::test]
    async fn resume_through_manager() {
        let f = fixture(2);
        f.store
            .save(
                Checkpoint::new("prev", "whale_tracker", json!({"chain": "eth"}))
                    .with_position(7)
                    .with_cursor("c7"),
            )
            .await
            .unwrap();

        let s = f
            .mux
            .create_stream(
                "whale_tracker",
                json!({"chain": "eth"}),
                CreateOptions::default().priority(5).resume_from("prev"),
            )
            .await
            .unwrap();
        assert_eq!(s.position(), 7);
        assert_eq!(f.mux.slot_priority(s.stream_id()), Some(5));
        assert_eq!(f.mux.analytics(s.stream_id()).unwrap().resume_count, 1);

        s.complete(None).await.unwrap();
        assert!(f.store.get("prev").await.unwrap().is_none());
    }

    /// Backend whose `get` outlives any reasonable caller deadline.
    struct StalledStore;

    #[async_trait]
    impl CheckpointStore for StalledStore {
        async fn save(&self, _checkpoint: Checkpoint) -> Result<(), CheckpointError> {
            Ok(())
        }

        async fn get(&self, _stream_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn delete(&self, _stream_id: &str) -> Result<bool, CheckpointError> {
            Ok(false)
        }

        async fn get_by_tool(&self, _tool_name: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
            Ok(Vec::new())
        }

        async fn sweep_expired(&self) -> Result<usize, CheckpointError> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_create_frees_its_slot() {
        let physical = MemorySink::new();
        let mux = MultiplexManager::new(
            physical.clone(),
            Arc::new(StalledStore),
            MultiplexConfig {
                max_concurrent_streams: 1,
                ..MultiplexConfig::default()
            },
        );

        let opening = mux.create_stream(
            "whale_tracker",
            json!({}),
            CreateOptions::default().resume_from("old"),
        );
        let res = tokio::time::timeout(Duration::from_millis(10), opening).await;
        assert!(res.is_err());
        assert_eq!(mux.get_stream_count(), 0);
        assert!(mux.get_analytics().is_empty());

        let next = create(&mux).await.unwrap();
        assert!(next.is_active());
        assert_eq!(mux.get_stream_count(), 1);
    }

    #[tokio::test]
    async fn heartbeat_reports_active_count() {
        let f = fixture(4);
        create(&f.mux).await.unwrap();
        f.clock.set(T0 + 5_000);
        f.mux.send_heartbeat();

        let last = f.physical.frames().pop().unwrap();
        assert!(last.starts_with("id: mux\nid: mux_1\nevent: heartbeat\n"));
        assert_eq!(split_tag(&last).map(|(id, _)| id), Some(MANAGER_ROUTE));
        assert!(last.contains(r#""activeStreams":1"#));
        assert!(last.contains(&format!(r#""timestamp":{}"#, T0 + 5_000)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let f = fixture(4);
        let mut rx = f.mux.bus().subscribe();
        let a = create(&f.mux).await.unwrap();
        let b = create(&f.mux).await.unwrap();
        b.abort();

        f.mux.close();
        f.mux.close();
        assert!(a.is_aborted());
        assert!(f.physical.is_ended());
        assert_eq!(f.mux.get_stream_count(), 0);
        assert!(f.mux.get_analytics().is_empty());
        assert!(create(&f.mux).await.is_none());

        let closes = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|n| n.kind == NoticeKind::ManagerClosed)
            .count();
        assert_eq!(closes, 1);
    }
}
