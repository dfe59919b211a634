//! # Physical writer.
//!
//! [`Sink`] is the single capability the runtime receives from its caller: a place
//! to `write` encoded frames and a way to `end` the connection. Any transport
//! (HTTP chunked body, socket, in-memory test double) implements it.
//!
//! ## Rules
//! - Each `write` call is one atomic, non-interleaved unit; multiplexed streams
//!   rely on this instead of locking.
//! - Only the component that constructed the sink (a bare stream or the multiplex
//!   manager) ever calls `end`.
//! - `end` is idempotent.
//!
//! ## Provided sinks
//! - [`ChannelSink`]: forwards frames into a `tokio::sync::mpsc` channel that an HTTP
//!   body or socket writer drains.
//! - [`MemorySink`]: records frames for inspection in tests.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::SinkError;

/// Narrow writer interface: exactly two methods.
pub trait Sink: Send + Sync + 'static {
    /// Writes one encoded frame.
    fn write(&self, frame: &str) -> Result<(), SinkError>;

    /// Ends the underlying connection. Further writes fail with [`SinkError::Closed`].
    fn end(&self);
}

/// Sink that forwards frames to an unbounded tokio channel.
///
/// `end()` drops the sender, so the draining side observes the channel closing
/// once all queued frames are consumed.
///
/// ```
/// use toolstream::{ChannelSink, Sink};
///
/// let (sink, mut rx) = ChannelSink::new();
/// sink.write("data: 1\n\n").unwrap();
/// sink.end();
/// assert_eq!(rx.try_recv().unwrap(), "data: 1\n\n");
/// assert!(sink.write("late").is_err());
/// ```
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
        });
        (sink, rx)
    }
}

impl Sink for ChannelSink {
    fn write(&self, frame: &str) -> Result<(), SinkError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(frame.to_string()).map_err(|_| SinkError::Closed),
            None => Err(SinkError::Closed),
        }
    }

    fn end(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[derive(Default)]
struct Recorded {
    frames: Vec<String>,
    ended: bool,
    fail_writes: bool,
}

/// In-memory sink recording every frame.
///
/// Can be switched into a failing mode to exercise write-failure paths.
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<Recorded>,
}

impl MemorySink {
    /// Creates an empty sink wrapped in an `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a snapshot of all frames written so far.
    pub fn frames(&self) -> Vec<String> {
        self.lock().frames.clone()
    }

    /// Returns and clears the frames written so far.
    pub fn take_frames(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().frames)
    }

    /// True once `end()` was called.
    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Makes every subsequent write fail with [`SinkError::Write`].
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sink for MemorySink {
    fn write(&self, frame: &str) -> Result<(), SinkError> {
        let mut rec = self.lock();
        if rec.ended {
            return Err(SinkError::Closed);
        }
        if rec.fail_writes {
            return Err(SinkError::Write("injected failure".into()));
        }
        rec.frames.push(frame.to_string());
        Ok(())
    }

    fn end(&self) {
        self.lock().ended = true;
    }
}
