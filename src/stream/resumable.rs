//! # Resumable stream: position tracking and checkpoints on top of a controller.
//!
//! ```text
//! open(controller, store, opts)
//!   └─ resume_from? ──► store.get ──► found: restore position/cursor, write `resume` partial
//!                                 └─► none / failed: start fresh
//!
//! send ──► controller.send ──► Written? position += 1
//!                                   └─ position - last_checkpoint >= interval?
//!                                        └─► store.save ──► ok: write `checkpoint` partial
//!                                                       └─► err: warn + CheckpointFailed
//!
//! complete ──► store.delete(own id [, resumed-from id]) ──► controller.complete
//!                    └─ ended by abort/error meanwhile ──► own checkpoint saved again
//! error / abort ──► controller only (checkpoint kept for a later resume)
//! ```
//!
//! ## Rules
//! - `position` counts producer envelopes written on the logical stream since its
//!   first construction. It starts at the checkpointed value after a resume and is
//!   never decremented.
//! - The synthetic `resume` and `checkpoint` partials are written through the
//!   controller and do not advance `position`.
//! - A checkpoint notification is written only after `save` returned `Ok`.
//! - Store failures never end the stream: a failed `get` is a fresh start, a failed
//!   `save` or `delete` is logged and published as [`NoticeKind::CheckpointFailed`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    config::ResumeConfig,
    envelope::{CheckpointNotice, Envelope, EventType, ResumeNotice},
    error::{CheckpointError, StreamError},
    events::{Bus, Notice, NoticeKind},
};

use super::controller::{Delivery, StreamController, StreamState};

/// Construction parameters of a [`ResumableStream`].
#[derive(Clone, Debug)]
pub struct ResumeOptions {
    pub tool_name: String,
    /// Original invocation parameters, stored in every checkpoint.
    pub args: Value,
    /// Id of the stream whose checkpoint should be restored.
    pub resume_from: Option<String>,
    pub config: ResumeConfig,
    /// Bus receiving resume and checkpoint-failure notices.
    pub bus: Option<Bus>,
}

impl ResumeOptions {
    pub fn new(tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            resume_from: None,
            config: ResumeConfig::default(),
            bus: None,
        }
    }

    pub fn resume_from(mut self, stream_id: impl Into<String>) -> Self {
        self.resume_from = Some(stream_id.into());
        self
    }

    pub fn config(mut self, config: ResumeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }
}

struct Progress {
    position: u64,
    cursor: Option<String>,
    last_checkpoint: u64,
    data: Option<Value>,
}

struct Inner {
    controller: StreamController,
    store: Arc<dyn CheckpointStore>,
    bus: Option<Bus>,
    tool_name: String,
    args: Value,
    config: ResumeConfig,
    progress: Mutex<Progress>,
    resume_count: u32,
    resumed: Option<Checkpoint>,
}

/// A [`StreamController`] decorated with position tracking and checkpoints.
///
/// Cheap to clone; all clones drive the same stream.
///
/// ## Example
/// ```rust
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use serde_json::json;
/// use toolstream::{
///     CheckpointStore, EventType, MemoryCheckpointStore, MemorySink, ResumeOptions,
///     ResumableStream, StoreConfig, StreamController,
/// };
///
/// let store = MemoryCheckpointStore::new(StoreConfig::default());
/// let sink = MemorySink::new();
/// let stream = ResumableStream::open(
///     StreamController::new("s1", sink.clone()),
///     store.clone(),
///     ResumeOptions::new("whale_tracker", json!({"chain": "eth"})),
/// )
/// .await;
///
/// stream.send_data(EventType::Chunk, json!([1, 2, 3])).await.unwrap();
/// stream.set_cursor("block:19000000");
/// stream.create_checkpoint(None).await.unwrap();
///
/// let saved = store.get("s1").await.unwrap().unwrap();
/// assert_eq!(saved.position, 1);
/// assert_eq!(saved.cursor.as_deref(), Some("block:19000000"));
/// # }
/// ```
#[derive(Clone)]
pub struct ResumableStream {
    inner: Arc<Inner>,
}

impl ResumableStream {
    /// Wraps `controller`, restoring from `opts.resume_from` when a live checkpoint exists.
    ///
    /// An unknown, expired or unreadable resume token starts the stream fresh.
    pub async fn open(
        controller: StreamController,
        store: Arc<dyn CheckpointStore>,
        opts: ResumeOptions,
    ) -> Self {
        let ResumeOptions {
            tool_name,
            args,
            resume_from,
            config,
            bus,
        } = opts;

        let resumed = match resume_from {
            Some(id) => match store.get(&id).await {
                Ok(found) => {
                    if found.is_none() {
                        tracing::debug!(stream = controller.stream_id(), resume_from = %id, "no live checkpoint, starting fresh");
                    }
                    found
                }
                Err(e) => {
                    tracing::warn!(
                        stream = controller.stream_id(),
                        resume_from = %id,
                        error = %e,
                        "checkpoint lookup failed, starting fresh"
                    );
                    publish_failure(bus.as_ref(), controller.stream_id(), &e);
                    None
                }
            },
            None => None,
        };

        let (position, cursor, data) = match &resumed {
            Some(cp) => (cp.position, cp.cursor.clone(), cp.data.clone()),
            None => (0, None, None),
        };

        let stream = Self {
            inner: Arc::new(Inner {
                controller,
                store,
                bus,
                tool_name,
                args,
                config,
                progress: Mutex::new(Progress {
                    position,
                    cursor,
                    last_checkpoint: position,
                    data,
                }),
                resume_count: u32::from(resumed.is_some()),
                resumed,
            }),
        };

        if let Some(cp) = &stream.inner.resumed {
            let notice = ResumeNotice::new(cp.stream_id.as_str(), cp.position, cp.cursor.clone());
            if let Err(e) = stream.write_partial(&notice) {
                tracing::warn!(stream = stream.stream_id(), error = %e, "resume notification failed");
            }
            if let Some(bus) = &stream.inner.bus {
                bus.publish(
                    Notice::new(NoticeKind::StreamResumed)
                        .with_stream(stream.stream_id())
                        .with_tool(stream.inner.tool_name.as_str())
                        .with_position(cp.position)
                        .with_reason(cp.stream_id.as_str()),
                );
            }
        }
        stream
    }

    fn tracker(&self) -> MutexGuard<'_, Progress> {
        self.inner
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Logical stream id; also the id this stream's checkpoints are saved under.
    pub fn stream_id(&self) -> &str {
        self.inner.controller.stream_id()
    }

    pub fn tool_name(&self) -> &str {
        &self.inner.tool_name
    }

    pub fn args(&self) -> &Value {
        &self.inner.args
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &StreamController {
        &self.inner.controller
    }

    pub fn state(&self) -> StreamState {
        self.inner.controller.state()
    }

    pub fn is_active(&self) -> bool {
        self.inner.controller.is_active()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.controller.is_aborted()
    }

    /// Producer envelopes written since the stream's first construction.
    pub fn position(&self) -> u64 {
        self.tracker().position
    }

    pub fn cursor(&self) -> Option<String> {
        self.tracker().cursor.clone()
    }

    /// Sets the opaque cursor stored with the next checkpoint.
    pub fn set_cursor(&self, cursor: impl Into<String>) {
        self.tracker().cursor = Some(cursor.into());
    }

    /// Sets the snapshot stored with the next checkpoint.
    pub fn set_snapshot(&self, data: Value) {
        self.tracker().data = Some(data);
    }

    /// `1` if this stream was restored from a checkpoint, `0` otherwise.
    pub fn resume_count(&self) -> u32 {
        self.inner.resume_count
    }

    /// The checkpoint this stream was restored from.
    pub fn resumed_from(&self) -> Option<&Checkpoint> {
        self.inner.resumed.as_ref()
    }

    /// Writes one envelope, advancing `position` and checkpointing when due.
    pub async fn send(&self, envelope: Envelope) -> Result<Delivery, StreamError> {
        let delivery = self.inner.controller.send(envelope)?;
        if delivery.is_written() {
            self.advance().await;
        }
        Ok(delivery)
    }

    pub async fn send_data(&self, kind: EventType, data: Value) -> Result<Delivery, StreamError> {
        self.send(Envelope::new(kind, data)).await
    }

    pub async fn start(&self, data: Value) -> Result<Delivery, StreamError> {
        let env = self.inner.controller.start_envelope(data);
        self.send(env).await
    }

    /// Writes a `progress` envelope; dropped when progress is disabled.
    pub async fn progress(&self, percent: f64, message: Option<&str>) -> Result<Delivery, StreamError> {
        match self.inner.controller.progress_envelope(percent, message) {
            Some(env) => self.send(env).await,
            None => Ok(Delivery::Dropped),
        }
    }

    /// Streams an array as `chunk` envelopes; each written chunk counts as one send.
    pub async fn send_chunks(&self, items: Vec<Value>) -> Result<usize, StreamError> {
        let mut written = 0;
        for env in self.inner.controller.chunk_envelopes(items)? {
            if !self.send(env).await?.is_written() {
                break;
            }
            written += 1;
        }
        Ok(written)
    }

    /// Saves a checkpoint now and returns its id (the stream id).
    ///
    /// `data` replaces the stored snapshot when given. On a terminal stream nothing
    /// is saved and the id is returned as is.
    pub async fn create_checkpoint(&self, data: Option<Value>) -> Result<String, CheckpointError> {
        let id = self.stream_id().to_string();
        if !self.is_active() {
            return Ok(id);
        }
        let checkpoint = {
            let mut p = self.tracker();
            if let Some(data) = data {
                p.data = Some(data);
            }
            p.last_checkpoint = p.position;
            self.snapshot(&p)
        };
        self.commit(checkpoint).await?;
        Ok(id)
    }

    /// Deletes this stream's checkpoint, then completes the controller.
    ///
    /// A stream resumed from another id also drops that checkpoint. Delete
    /// failures are logged and do not prevent completion. If the stream is
    /// aborted or errored while the deletes are in flight, its own checkpoint is
    /// saved again at the current position and `Dropped` is returned. A future
    /// dropped mid-delete leaves the stream active; its next checkpoint recreates
    /// the entry.
    pub async fn complete(&self, result: Option<Value>) -> Result<Delivery, StreamError> {
        if !self.is_active() {
            return Ok(Delivery::Dropped);
        }
        let had_own = self.forget(self.stream_id()).await;
        if let Some(cp) = &self.inner.resumed {
            if cp.stream_id != self.stream_id() {
                self.forget(&cp.stream_id).await;
            }
        }

        let res = self.inner.controller.complete(result);
        if had_own && self.state() != StreamState::Completed {
            self.restore().await;
        }
        res
    }

    /// Ends the stream with an `error` envelope; the checkpoint is kept.
    pub fn error<E>(&self, err: &E) -> Result<Delivery, StreamError>
    where
        E: std::error::Error + ?Sized,
    {
        self.inner.controller.error(err)
    }

    /// Ends the stream with an `error` envelope built from `name` and `message`.
    pub fn fail(&self, name: &str, message: &str) -> Result<Delivery, StreamError> {
        self.inner.controller.fail(name, message)
    }

    /// Ends the stream without writing; the checkpoint is kept.
    pub fn abort(&self) -> bool {
        self.inner.controller.abort()
    }

    async fn advance(&self) {
        let due = {
            let mut p = self.tracker();
            p.position += 1;
            match self.inner.config.auto_interval() {
                Some(every) if p.position.saturating_sub(p.last_checkpoint) >= every => {
                    p.last_checkpoint = p.position;
                    Some(self.snapshot(&p))
                }
                _ => None,
            }
        };
        if let Some(checkpoint) = due {
            // failure already logged and published
            let _ = self.commit(checkpoint).await;
        }
    }

    fn snapshot(&self, p: &Progress) -> Checkpoint {
        let mut cp = Checkpoint::new(
            self.stream_id(),
            self.inner.tool_name.as_str(),
            self.inner.args.clone(),
        )
        .with_position(p.position)
        .with_ttl(self.inner.config.checkpoint_ttl);
        cp.cursor = p.cursor.clone();
        cp.data = p.data.clone();
        cp
    }

    async fn commit(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let position = checkpoint.position;
        let cursor = checkpoint.cursor.clone();

        if let Err(e) = self.inner.store.save(checkpoint).await {
            tracing::warn!(stream = self.stream_id(), position, error = %e, "checkpoint save failed");
            publish_failure(self.inner.bus.as_ref(), self.stream_id(), &e);
            return Err(e);
        }

        let notice = CheckpointNotice::new(self.stream_id(), position, cursor);
        if let Err(e) = self.write_partial(&notice) {
            tracing::warn!(stream = self.stream_id(), error = %e, "checkpoint notification failed");
        }
        Ok(())
    }

    async fn forget(&self, stream_id: &str) -> bool {
        match self.inner.store.delete(stream_id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(stream = self.stream_id(), checkpoint = stream_id, error = %e, "checkpoint delete failed");
                publish_failure(self.inner.bus.as_ref(), stream_id, &e);
                false
            }
        }
    }

    /// Puts back the checkpoint a racing `complete` deleted.
    async fn restore(&self) {
        let checkpoint = self.snapshot(&self.tracker());
        let position = checkpoint.position;
        tracing::debug!(stream = self.stream_id(), position, state = self.state().as_label(), "restoring checkpoint after interrupted completion");
        if let Err(e) = self.inner.store.save(checkpoint).await {
            tracing::warn!(stream = self.stream_id(), position, error = %e, "checkpoint restore failed");
            publish_failure(self.inner.bus.as_ref(), self.stream_id(), &e);
        }
    }

    fn write_partial<T: Serialize>(&self, payload: &T) -> Result<Delivery, StreamError> {
        let data = serde_json::to_value(payload)?;
        self.inner
            .controller
            .send(Envelope::new(EventType::Partial, data))
    }
}

impl fmt::Debug for ResumableStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumableStream")
            .field("stream_id", &self.stream_id())
            .field("tool_name", &self.inner.tool_name)
            .field("position", &self.position())
            .field("state", &self.state())
            .finish()
    }
}

fn publish_failure(bus: Option<&Bus>, stream_id: &str, err: &CheckpointError) {
    if let Some(bus) = bus {
        bus.publish(
            Notice::new(NoticeKind::CheckpointFailed)
                .with_stream(stream_id)
                .with_reason(err.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    const T0: u64 = 1_700_000_000_000;

    fn memory_store() -> Arc<MemoryCheckpointStore> {
        MemoryCheckpointStore::with_clock(StoreConfig::default(), Arc::new(ManualClock::new(T0)))
    }

    fn interval(n: u64) -> ResumeConfig {
        ResumeConfig {
            checkpoint_interval: n,
            ..ResumeConfig::default()
        }
    }

    async fn open(
        id: &str,
        sink: &Arc<MemorySink>,
        store: Arc<dyn CheckpointStore>,
        opts: ResumeOptions,
    ) -> ResumableStream {
        ResumableStream::open(StreamController::new(id, sink.clone()), store, opts).await
    }

    fn partials(sink: &MemorySink, kind: &str) -> Vec<Value> {
        sink.frames()
            .iter()
            .filter(|f| f.contains("event: partial\n"))
            .filter_map(|f| {
                let json = f.lines().find_map(|l| l.strip_prefix("data: "))?;
                serde_json::from_str::<Value>(json).ok()
            })
            .filter(|v| v["type"] == kind)
            .collect()
    }

    /// Store whose every call fails.
    struct DownStore;

    #[async_trait]
    impl CheckpointStore for DownStore {
        async fn save(&self, _: Checkpoint) -> Result<(), CheckpointError> {
            Err(CheckpointError::Unavailable("redis down".into()))
        }
        async fn get(&self, _: &str) -> Result<Option<Checkpoint>, CheckpointError> {
            Err(CheckpointError::Unavailable("redis down".into()))
        }
        async fn delete(&self, _: &str) -> Result<bool, CheckpointError> {
            Err(CheckpointError::Unavailable("redis down".into()))
        }
        async fn get_by_tool(&self, _: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
            Ok(Vec::new())
        }
        async fn sweep_expired(&self) -> Result<usize, CheckpointError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn auto_checkpoints_every_interval() {
        let store = memory_store();
        let sink = MemorySink::new();
        let stream = open(
            "s1",
            &sink,
            store.clone(),
            ResumeOptions::new("scan", json!({})).config(interval(5)),
        )
        .await;

        for i in 0..12 {
            stream.send_data(EventType::Chunk, json!(i)).await.unwrap();
        }

        let notes = partials(&sink, "checkpoint");
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0]["position"], 5);
        assert_eq!(notes[1]["position"], 10);
        assert_eq!(notes[0]["checkpointId"], "s1");
        assert_eq!(stream.position(), 12);
        assert_eq!(store.get("s1").await.unwrap().unwrap().position, 10);
    }

    #[tokio::test]
    async fn resume_restores_position_and_cursor() {
        let store = memory_store();
        store
            .save(
                Checkpoint::new("s1", "scan", json!({"address": "0xabc"}))
                    .with_position(7)
                    .with_cursor("c7")
                    .with_ttl(Duration::from_millis(60_000)),
            )
            .await
            .unwrap();

        let sink = MemorySink::new();
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let stream = open(
            "s2",
            &sink,
            store.clone(),
            ResumeOptions::new("scan", json!({"address": "0xabc"}))
                .resume_from("s1")
                .bus(bus),
        )
        .await;

        assert_eq!(stream.resume_count(), 1);
        assert_eq!(stream.position(), 7);
        assert_eq!(stream.cursor().as_deref(), Some("c7"));
        assert_eq!(stream.resumed_from().unwrap().args["address"], "0xabc");

        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("event: partial\n"));
        let note = &partials(&sink, "resume")[0];
        assert_eq!(note["resumedFrom"], "s1");
        assert_eq!(note["position"], 7);
        assert_eq!(note["cursor"], "c7");
        assert_eq!(note["message"], "Resumed from position 7");

        let n = rx.recv().await.unwrap();
        assert_eq!(n.kind, NoticeKind::StreamResumed);
        assert_eq!(n.position, Some(7));
    }

    #[tokio::test]
    async fn unknown_token_starts_fresh() {
        let sink = MemorySink::new();
        let stream = open(
            "s1",
            &sink,
            memory_store(),
            ResumeOptions::new("scan", json!({})).resume_from("missing"),
        )
        .await;

        assert_eq!(stream.resume_count(), 0);
        assert_eq!(stream.position(), 0);
        assert!(stream.resumed_from().is_none());
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn position_continues_across_resume() {
        let store = memory_store();
        let sink = MemorySink::new();
        let first = open(
            "s1",
            &sink,
            store.clone(),
            ResumeOptions::new("scan", json!({})).config(interval(3)),
        )
        .await;
        for i in 0..4 {
            first.send_data(EventType::Chunk, json!(i)).await.unwrap();
        }
        first.abort();
        let before = store.get("s1").await.unwrap().unwrap().position;
        assert_eq!(before, 3);

        let sink = MemorySink::new();
        let second = open(
            "s1",
            &sink,
            store.clone(),
            ResumeOptions::new("scan", json!({}))
                .config(interval(3))
                .resume_from("s1"),
        )
        .await;
        assert_eq!(second.position(), before);
        second.send_data(EventType::Chunk, json!(4)).await.unwrap();
        assert_eq!(second.position(), 4);
    }

    #[tokio::test]
    async fn complete_deletes_checkpoints() {
        let store = memory_store();
        store
            .save(Checkpoint::new("old", "scan", json!({})).with_position(2))
            .await
            .unwrap();

        let sink = MemorySink::new();
        let stream = open(
            "new",
            &sink,
            store.clone(),
            ResumeOptions::new("scan", json!({})).resume_from("old"),
        )
        .await;
        stream.create_checkpoint(Some(json!({"page": 3}))).await.unwrap();
        assert_eq!(store.len().await, 2);

        assert!(stream.complete(Some(json!("done"))).await.unwrap().is_written());
        assert!(store.is_empty().await);
        assert_eq!(stream.state(), StreamState::Completed);
        assert_eq!(stream.complete(None).await.unwrap(), Delivery::Dropped);
    }

    /// Memory store whose `delete` waits for the test to open a gate.
    struct GatedStore {
        inner: Arc<MemoryCheckpointStore>,
        entered: tokio::sync::Notify,
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl CheckpointStore for GatedStore {
        async fn save(&self, cp: Checkpoint) -> Result<(), CheckpointError> {
            self.inner.save(cp).await
        }
        async fn get(&self, id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
            self.inner.get(id).await
        }
        async fn delete(&self, id: &str) -> Result<bool, CheckpointError> {
            self.entered.notify_one();
            self.gate.notified().await;
            self.inner.delete(id).await
        }
        async fn get_by_tool(&self, tool: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
            self.inner.get_by_tool(tool).await
        }
        async fn sweep_expired(&self) -> Result<usize, CheckpointError> {
            self.inner.sweep_expired().await
        }
    }

    #[tokio::test]
    async fn abort_during_complete_keeps_checkpoint() {
        let memory = memory_store();
        let gated = Arc::new(GatedStore {
            inner: memory.clone(),
            entered: tokio::sync::Notify::new(),
            gate: tokio::sync::Notify::new(),
        });
        let sink = MemorySink::new();
        let stream = open("s1", &sink, gated.clone(), ResumeOptions::new("scan", json!({}))).await;
        stream.send_data(EventType::Chunk, json!(1)).await.unwrap();
        stream.create_checkpoint(None).await.unwrap();

        let completing = tokio::spawn({
            let stream = stream.clone();
            async move { stream.complete(Some(json!("done"))).await }
        });
        gated.entered.notified().await;
        assert!(stream.abort());
        gated.gate.notify_one();

        assert_eq!(completing.await.unwrap().unwrap(), Delivery::Dropped);
        assert!(stream.is_aborted());
        let kept = memory.get("s1").await.unwrap().unwrap();
        assert_eq!(kept.position, 1);
        assert!(!sink.frames().iter().any(|f| f.contains("event: complete\n")));
    }

    #[tokio::test]
    async fn error_and_abort_keep_checkpoint() {
        let store = memory_store();
        let sink = MemorySink::new();
        let stream = open("s1", &sink, store.clone(), ResumeOptions::new("scan", json!({}))).await;
        stream.send_data(EventType::Chunk, json!(1)).await.unwrap();
        stream.create_checkpoint(None).await.unwrap();
        stream.fail("RpcError", "node unreachable").unwrap();
        assert!(store.get("s1").await.unwrap().is_some());

        let sink = MemorySink::new();
        let stream = open("s2", &sink, store.clone(), ResumeOptions::new("scan", json!({}))).await;
        stream.create_checkpoint(None).await.unwrap();
        assert!(stream.abort());
        assert!(store.get("s2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminal_stream_saves_nothing() {
        let store = memory_store();
        let sink = MemorySink::new();
        let stream = open("s1", &sink, store.clone(), ResumeOptions::new("scan", json!({}))).await;
        stream.abort();

        assert_eq!(stream.create_checkpoint(None).await.unwrap(), "s1");
        assert!(store.is_empty().await);
        assert_eq!(
            stream.send_data(EventType::Chunk, json!(1)).await.unwrap(),
            Delivery::Dropped
        );
        assert_eq!(stream.position(), 0);
    }

    #[tokio::test]
    async fn failing_store_degrades_without_ending_stream() {
        let sink = MemorySink::new();
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let stream = open(
            "s1",
            &sink,
            Arc::new(DownStore),
            ResumeOptions::new("scan", json!({}))
                .config(interval(2))
                .resume_from("s0")
                .bus(bus),
        )
        .await;
        assert_eq!(stream.resume_count(), 0);
        assert_eq!(rx.recv().await.unwrap().kind, NoticeKind::CheckpointFailed);

        for i in 0..4 {
            stream.send_data(EventType::Chunk, json!(i)).await.unwrap();
        }
        assert!(stream.is_active());
        assert_eq!(stream.position(), 4);
        assert!(partials(&sink, "checkpoint").is_empty());
        assert!(matches!(
            stream.create_checkpoint(None).await,
            Err(CheckpointError::Unavailable(_))
        ));

        assert!(stream.complete(None).await.unwrap().is_written());
        assert!(sink.is_ended());
    }

    #[tokio::test]
    async fn chunks_and_progress_count_as_sends() {
        let sink = MemorySink::new();
        let stream = open(
            "s1",
            &sink,
            memory_store(),
            ResumeOptions::new("scan", json!({})).config(interval(0)),
        )
        .await;

        stream.start(json!({"query": "whales"})).await.unwrap();
        stream.progress(50.0, None).await.unwrap();
        let items: Vec<Value> = (0..25).map(|i| json!(i)).collect();
        assert_eq!(stream.send_chunks(items).await.unwrap(), 3);
        assert_eq!(stream.position(), 5);
        assert!(partials(&sink, "checkpoint").is_empty());
    }
}
