//! # Stream controller: the producer-facing state machine of one logical stream.
//!
//! ## States
//! ```text
//!            ┌──► Completed   (complete(): writes `complete`)
//!  Active ───┼──► Errored     (error():    writes `error`)
//!            └──► Aborted     (abort():    writes nothing)
//! ```
//! Terminal states have no transitions out. Every operation on a terminal
//! controller is a silent no-op reported as [`Delivery::Dropped`].
//!
//! ## Teardown
//! Every terminal transition runs the same teardown exactly once:
//! 1. cancel the heartbeat timer,
//! 2. `end()` the sink (a multiplexed sink only releases its logical slot),
//! 3. run the release hook, if one was registered.
//!
//! ## Rules
//! - Operations are synchronous: they return once the frame was handed to the sink.
//! - `id` and `timestamp` defaults are stamped before encoding; the counter used for
//!   `{streamId}_{n}` ids advances only on successful writes.
//! - Writes and state transitions are serialized per stream, so a heartbeat can never
//!   land after the terminal envelope.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    config::StreamConfig,
    envelope::{Envelope, EventType, Metadata},
    error::StreamError,
    sink::Sink,
};

use super::builder::ControllerBuilder;
use super::chunk::plan_chunks;

pub(crate) type ReleaseHook = Box<dyn FnOnce(StreamState) + Send>;

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Active,
    Completed,
    Errored,
    Aborted,
}

impl StreamState {
    /// True for every state except [`StreamState::Active`].
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, StreamState::Active)
    }

    /// Returns a short stable label (snake_case).
    pub fn as_label(self) -> &'static str {
        match self {
            StreamState::Active => "active",
            StreamState::Completed => "completed",
            StreamState::Errored => "errored",
            StreamState::Aborted => "aborted",
        }
    }
}

/// Outcome of a write attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame handed to the sink.
    Written,
    /// Stream is terminal (or the envelope kind is disabled); nothing was written.
    Dropped,
}

impl Delivery {
    #[inline]
    pub fn is_written(self) -> bool {
        matches!(self, Delivery::Written)
    }
}

/// Payload of the terminal `error` envelope.
#[derive(Serialize)]
struct ErrorPayload<'a> {
    message: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

struct Core {
    state: StreamState,
    seq: u64,
}

struct Shared {
    stream_id: String,
    tool: Option<String>,
    config: StreamConfig,
    sink: Arc<dyn Sink>,
    clock: Arc<dyn Clock>,
    core: Mutex<Core>,
    heartbeat: CancellationToken,
    release: Mutex<Option<ReleaseHook>>,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamps, encodes and writes one envelope while holding the core lock.
    fn write_locked(&self, core: &mut Core, mut envelope: Envelope) -> Result<(), StreamError> {
        envelope.stamp(&self.stream_id, core.seq, self.clock.now_ms());
        let frame = self.config.transport.encode(&self.stream_id, &envelope)?;
        self.sink.write(&frame)?;
        core.seq += 1;
        Ok(())
    }

    fn emit(&self, envelope: Envelope) -> Result<Delivery, StreamError> {
        let mut core = self.core();
        if core.state.is_terminal() {
            return Ok(Delivery::Dropped);
        }
        self.write_locked(&mut core, envelope)?;
        Ok(Delivery::Written)
    }

    /// Writes the terminal envelope (if any) and transitions; the transition happens
    /// even when the write fails. Returns `None` if the stream was already terminal.
    fn finish(
        &self,
        to: StreamState,
        envelope: Option<Envelope>,
    ) -> Option<Result<Delivery, StreamError>> {
        let written = {
            let mut core = self.core();
            if core.state.is_terminal() {
                return None;
            }
            let written = match envelope {
                Some(env) => self.write_locked(&mut core, env).map(|()| Delivery::Written),
                None => Ok(Delivery::Dropped),
            };
            core.state = to;
            written
        };
        self.teardown(to);
        Some(written)
    }

    fn teardown(&self, state: StreamState) {
        self.heartbeat.cancel();
        self.sink.end();
        let hook = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook(state);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.heartbeat.cancel();
    }
}

/// Producer-facing handle of one logical stream.
///
/// Cheap to clone; all clones drive the same stream.
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use toolstream::{MemorySink, StreamController, StreamState};
///
/// let sink = MemorySink::new();
/// let ctl = StreamController::new("s1", sink.clone());
///
/// ctl.send_data(toolstream::EventType::Chunk, json!([1, 2])).unwrap();
/// ctl.complete(Some(json!({"rows": 2}))).unwrap();
///
/// assert_eq!(ctl.state(), StreamState::Completed);
/// assert!(sink.is_ended());
/// assert_eq!(sink.frames()[0], "id: s1_0\nevent: chunk\ndata: [1,2]\n\n");
/// ```
#[derive(Clone)]
pub struct StreamController {
    shared: Arc<Shared>,
}

impl StreamController {
    /// Creates a controller with default configuration and the system clock.
    pub fn new(stream_id: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        ControllerBuilder::new(stream_id, sink).build()
    }

    /// Starts a builder for a controller with custom configuration.
    pub fn builder(stream_id: impl Into<String>, sink: Arc<dyn Sink>) -> ControllerBuilder {
        ControllerBuilder::new(stream_id, sink)
    }

    pub(super) fn from_parts(
        stream_id: String,
        sink: Arc<dyn Sink>,
        config: StreamConfig,
        clock: Arc<dyn Clock>,
        tool: Option<String>,
        release: Option<ReleaseHook>,
    ) -> Self {
        let heartbeat = config.heartbeat();
        let shared = Arc::new(Shared {
            stream_id,
            tool,
            config,
            sink,
            clock,
            core: Mutex::new(Core {
                state: StreamState::Active,
                seq: 0,
            }),
            heartbeat: CancellationToken::new(),
            release: Mutex::new(release),
        });
        if let Some(period) = heartbeat {
            spawn_heartbeat(&shared, period);
        }
        Self { shared }
    }

    /// Logical stream id.
    pub fn stream_id(&self) -> &str {
        &self.shared.stream_id
    }

    /// Tool name, if one was configured.
    pub fn tool(&self) -> Option<&str> {
        self.shared.tool.as_deref()
    }

    /// Stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.shared.core().state
    }

    /// True while the stream accepts writes.
    pub fn is_active(&self) -> bool {
        self.state() == StreamState::Active
    }

    /// True only if the stream ended via [`abort`](Self::abort).
    ///
    /// Producers check this between steps of long loops and stop early.
    pub fn is_aborted(&self) -> bool {
        self.state() == StreamState::Aborted
    }

    /// Number of envelopes written so far (heartbeats included).
    pub fn events_sent(&self) -> u64 {
        self.shared.core().seq
    }

    /// Writes one envelope. No-op on a terminal stream.
    pub fn send(&self, envelope: Envelope) -> Result<Delivery, StreamError> {
        self.shared.emit(envelope)
    }

    /// Shorthand for `send(Envelope::new(kind, data))`.
    pub fn send_data(&self, kind: EventType, data: Value) -> Result<Delivery, StreamError> {
        self.send(Envelope::new(kind, data))
    }

    /// Writes a `start` envelope.
    pub fn start(&self, data: Value) -> Result<Delivery, StreamError> {
        self.send(self.start_envelope(data))
    }

    /// Writes a `progress` envelope; `percent` is not clamped.
    ///
    /// Dropped when progress is disabled in the stream configuration.
    pub fn progress(&self, percent: f64, message: Option<&str>) -> Result<Delivery, StreamError> {
        match self.progress_envelope(percent, message) {
            Some(env) => self.send(env),
            None => Ok(Delivery::Dropped),
        }
    }

    /// Streams an array result as `chunk` envelopes; returns how many were written.
    ///
    /// Stops early if the stream becomes terminal midway.
    pub fn send_chunks(&self, items: Vec<Value>) -> Result<usize, StreamError> {
        let mut written = 0;
        for env in self.chunk_envelopes(items)? {
            if !self.send(env)?.is_written() {
                break;
            }
            written += 1;
        }
        Ok(written)
    }

    /// Writes `complete` with `result`, then transitions to `Completed` and tears down.
    pub fn complete(&self, result: Option<Value>) -> Result<Delivery, StreamError> {
        let env = Envelope::new(EventType::Complete, result.unwrap_or(Value::Null));
        self.shared
            .finish(StreamState::Completed, Some(env))
            .unwrap_or(Ok(Delivery::Dropped))
    }

    /// Writes `error` for `err`, then transitions to `Errored` and tears down.
    ///
    /// `name` is the error's type name; the `source()` chain is included as `stack`
    /// when `include_error_detail` is enabled.
    pub fn error<E>(&self, err: &E) -> Result<Delivery, StreamError>
    where
        E: std::error::Error + ?Sized,
    {
        let stack = self.shared.config.include_error_detail.then(|| {
            let mut out = format!("{err:?}");
            let mut source = err.source();
            while let Some(cause) = source {
                out.push_str("\ncaused by: ");
                out.push_str(&cause.to_string());
                source = cause.source();
            }
            out
        });
        self.fail_with(short_type_name::<E>(), &err.to_string(), stack)
    }

    /// Writes an `error` envelope from a plain name/message pair and tears down.
    pub fn fail(&self, name: &str, message: &str) -> Result<Delivery, StreamError> {
        self.fail_with(name, message, None)
    }

    fn fail_with(
        &self,
        name: &str,
        message: &str,
        stack: Option<String>,
    ) -> Result<Delivery, StreamError> {
        let data = serde_json::to_value(ErrorPayload {
            message,
            name,
            stack,
        })?;
        self.shared
            .finish(StreamState::Errored, Some(Envelope::new(EventType::Error, data)))
            .unwrap_or(Ok(Delivery::Dropped))
    }

    /// Transitions to `Aborted` without writing; returns `false` if already terminal.
    pub fn abort(&self) -> bool {
        self.shared.finish(StreamState::Aborted, None).is_some()
    }

    pub(crate) fn start_envelope(&self, data: Value) -> Envelope {
        Envelope::new(EventType::Start, data).with_metadata(Metadata {
            tool_name: self.shared.tool.clone(),
            ..Metadata::default()
        })
    }

    pub(crate) fn progress_envelope(&self, percent: f64, message: Option<&str>) -> Option<Envelope> {
        if !self.shared.config.enable_progress {
            return None;
        }
        let data = match message {
            Some(m) => json!({ "progress": percent, "message": m }),
            None => json!({ "progress": percent }),
        };
        Some(Envelope::new(EventType::Progress, data).with_metadata(Metadata {
            tool_name: self.shared.tool.clone(),
            progress: Some(percent),
            ..Metadata::default()
        }))
    }

    pub(crate) fn chunk_envelopes(&self, items: Vec<Value>) -> Result<Vec<Envelope>, StreamError> {
        Ok(plan_chunks(
            items,
            &self.shared.config,
            self.shared.tool.as_deref(),
        )?)
    }

    fn heartbeat(&self) -> Result<Delivery, StreamError> {
        let now = self.shared.clock.now_ms();
        self.send(Envelope::new(
            EventType::Heartbeat,
            json!({ "timestamp": now }),
        ))
    }
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("stream_id", &self.shared.stream_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Self-timed heartbeat; holds only a weak reference so a forgotten stream
/// still lets the timer exit.
fn spawn_heartbeat(shared: &Arc<Shared>, period: Duration) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let token = shared.heartbeat.clone();

    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(shared) = weak.upgrade() else { break };
                    let ctl = StreamController { shared };
                    if let Err(e) = ctl.heartbeat() {
                        tracing::warn!(stream = ctl.stream_id(), error = %e, "heartbeat write failed");
                    }
                }
            }
        }
    });
}

/// `my_crate::errors::RpcError<T>` → `RpcError`.
fn short_type_name<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SinkError, ToolError};
    use crate::sink::MemorySink;
    use crate::transport::Transport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn controller(sink: &Arc<MemorySink>, config: StreamConfig) -> StreamController {
        StreamController::builder("s1", sink.clone())
            .config(config)
            .tool("whale_tracker")
            .build()
    }

    #[test]
    fn auto_ids_follow_counter() {
        let sink = MemorySink::new();
        let ctl = controller(&sink, StreamConfig::default());

        ctl.send_data(EventType::Partial, json!(1)).unwrap();
        ctl.send(Envelope::new(EventType::Partial, json!(2)).with_id("mine"))
            .unwrap();
        ctl.send_data(EventType::Partial, json!(3)).unwrap();

        let frames = sink.frames();
        assert!(frames[0].starts_with("id: s1_0\n"));
        assert!(frames[1].starts_with("id: mine\n"));
        assert!(frames[2].starts_with("id: s1_2\n"));
        assert_eq!(ctl.events_sent(), 3);
    }

    #[test]
    fn terminal_states_drop_everything() {
        let sink = MemorySink::new();
        let ctl = controller(&sink, StreamConfig::default());

        assert_eq!(ctl.complete(None).unwrap(), Delivery::Written);
        assert_eq!(ctl.send_data(EventType::Chunk, json!(1)).unwrap(), Delivery::Dropped);
        assert_eq!(ctl.complete(None).unwrap(), Delivery::Dropped);
        assert_eq!(ctl.fail("X", "late").unwrap(), Delivery::Dropped);
        assert!(!ctl.abort());
        assert_eq!(ctl.state(), StreamState::Completed);
        assert!(!ctl.is_aborted());
        assert_eq!(sink.frames().len(), 1);
        assert!(sink.frames()[0].contains("event: complete\n"));
    }

    #[test]
    fn abort_writes_nothing_and_ends_sink() {
        let sink = MemorySink::new();
        let ctl = controller(&sink, StreamConfig::default());

        assert!(ctl.abort());
        assert!(ctl.is_aborted());
        assert!(sink.is_ended());
        assert!(sink.frames().is_empty());
        assert!(!ctl.abort());
    }

    #[test]
    fn release_hook_runs_once_with_outcome() {
        let sink = MemorySink::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let (c, s) = (calls.clone(), seen.clone());
        let ctl = StreamController::builder("s1", sink.clone())
            .on_release(move |state| {
                c.fetch_add(1, Ordering::SeqCst);
                *s.lock().unwrap() = Some(state);
            })
            .build();

        ctl.fail("RpcError", "upstream down").unwrap();
        ctl.abort();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), Some(StreamState::Errored));
    }

    #[test]
    fn error_payload_carries_name_and_optional_stack() {
        let sink = MemorySink::new();
        let ctl = controller(
            &sink,
            StreamConfig {
                include_error_detail: false,
                ..StreamConfig::default()
            },
        );
        ctl.error(&ToolError::fail("rpc timeout")).unwrap();

        let frame = &sink.frames()[0];
        assert!(frame.contains("event: error\n"));
        assert!(frame.contains(r#""message":"execution failed: rpc timeout""#));
        assert!(frame.contains(r#""name":"ToolError""#));
        assert!(!frame.contains("stack"));

        let sink = MemorySink::new();
        let ctl = controller(
            &sink,
            StreamConfig {
                include_error_detail: true,
                ..StreamConfig::default()
            },
        );
        ctl.error(&SinkError::Closed).unwrap();
        assert!(sink.frames()[0].contains(r#""stack":"Closed""#));
    }

    #[test]
    fn progress_respects_config() {
        let sink = MemorySink::new();
        let ctl = controller(&sink, StreamConfig::default());
        ctl.progress(150.0, Some("overshoot")).unwrap();
        assert!(sink.frames()[0].contains(r#"data: {"message":"overshoot","progress":150.0}"#));

        let sink = MemorySink::new();
        let ctl = controller(
            &sink,
            StreamConfig {
                enable_progress: false,
                ..StreamConfig::default()
            },
        );
        assert_eq!(ctl.progress(10.0, None).unwrap(), Delivery::Dropped);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn write_failure_surfaces_and_keeps_counter() {
        let sink = MemorySink::new();
        let ctl = controller(&sink, StreamConfig::default());
        sink.fail_writes(true);
        let err = ctl.send_data(EventType::Chunk, json!(1)).unwrap_err();
        assert_eq!(err.as_label(), "sink_write_failed");
        assert_eq!(ctl.events_sent(), 0);
        assert!(ctl.is_active());

        // terminal transition happens even if the final write fails
        assert!(ctl.complete(None).is_err());
        assert_eq!(ctl.state(), StreamState::Completed);
    }

    #[test]
    fn websocket_transport_frames() {
        let sink = MemorySink::new();
        let ctl = controller(
            &sink,
            StreamConfig {
                transport: Transport::WebSocket,
                ..StreamConfig::default()
            },
        );
        ctl.start(json!({"query": "eth"})).unwrap();
        let v: Value = serde_json::from_str(&sink.frames()[0]).unwrap();
        assert_eq!(v["streamId"], "s1");
        assert_eq!(v["type"], "start");
        assert_eq!(v["metadata"]["toolName"], "whale_tracker");
    }

    #[test]
    fn send_chunks_stops_when_terminal() {
        let sink = MemorySink::new();
        let ctl = controller(
            &sink,
            StreamConfig {
                chunk_size: 2,
                ..StreamConfig::default()
            },
        );
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();
        assert_eq!(ctl.send_chunks(items.clone()).unwrap(), 3);
        ctl.abort();
        assert_eq!(ctl.send_chunks(items).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_ticks_until_terminal() {
        let sink = MemorySink::new();
        let ctl = controller(
            &sink,
            StreamConfig {
                heartbeat_interval: Duration::from_secs(15),
                ..StreamConfig::default()
            },
        );

        time::sleep(Duration::from_secs(46)).await;
        let beats = sink
            .frames()
            .iter()
            .filter(|f| f.contains("event: heartbeat\n"))
            .count();
        assert_eq!(beats, 3);

        ctl.complete(None).unwrap();
        time::sleep(Duration::from_secs(60)).await;
        let frames = sink.frames();
        assert_eq!(frames.len(), 4);
        assert!(frames[3].contains("event: complete\n"));
    }

    #[test]
    fn short_names() {
        assert_eq!(short_type_name::<ToolError>(), "ToolError");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}
