//! # Runtime notices emitted by the checkpoint store and the multiplex manager.
//!
//! Notices are the observer channel of the runtime; they never reach the client
//! wire. The [`NoticeKind`] enum classifies them across three groups:
//! - **Checkpoint notices**: saved, deleted, expired, backend failures
//! - **Stream notices**: multiplexed stream lifecycle and admission rejections
//! - **Subscriber notices**: overflow/panic of a notice subscriber
//!
//! ## Ordering guarantees
//! Each notice has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use toolstream::{Notice, NoticeKind};
//!
//! let n = Notice::new(NoticeKind::CheckpointSaved)
//!     .with_stream("s1")
//!     .with_tool("whale_tracker")
//!     .with_position(10);
//!
//! assert_eq!(n.kind, NoticeKind::CheckpointSaved);
//! assert_eq!(n.stream.as_deref(), Some("s1"));
//! assert_eq!(n.position, Some(10));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for notice ordering.
static NOTICE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    // === Checkpoint store ===
    /// Checkpoint upserted.
    ///
    /// Sets: `stream`, `tool`, `position`
    CheckpointSaved,

    /// Checkpoint removed explicitly.
    ///
    /// Sets: `stream`
    CheckpointDeleted,

    /// Checkpoint removed because its TTL elapsed (lazy read or sweep).
    ///
    /// Sets: `stream`
    CheckpointExpired,

    /// Backend failure swallowed by a stream (save/get/delete).
    ///
    /// Sets: `stream`, `reason`
    CheckpointFailed,

    // === Multiplex manager ===
    /// Slot admitted and `stream_start` written.
    ///
    /// Sets: `stream`, `tool`, `active`
    StreamStarted,

    /// A new stream restored its position from a checkpoint.
    ///
    /// Sets: `stream`, `tool`, `position`, `reason` (resumed-from id)
    StreamResumed,

    /// Stream reached a terminal state on its own; slot released.
    ///
    /// Sets: `stream`, `tool`, `reason` (`completed` / `errored` / `aborted`), `active`
    StreamFinished,

    /// Stream aborted via `cancel_stream`; slot released.
    ///
    /// Sets: `stream`, `tool`, `active`
    StreamCancelled,

    /// `create_stream` rejected by the admission ceiling (or a closed manager).
    ///
    /// Sets: `tool`, `reason`, `active`
    StreamRejected,

    /// Manager closed; every remaining stream aborted.
    ///
    /// Sets: `active` (streams aborted by the close)
    ManagerClosed,

    // === Subscribers ===
    /// Subscriber dropped a notice (queue full or worker closed).
    ///
    /// Sets: `stream` (subscriber name), `reason`
    SubscriberOverflow,

    /// Subscriber panicked while processing a notice.
    ///
    /// Sets: `stream` (subscriber name), `reason` (panic info)
    SubscriberPanicked,
}

/// Runtime notice with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`NoticeKind`]
#[derive(Clone, Debug)]
pub struct Notice {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Notice classification.
    pub kind: NoticeKind,
    /// Logical stream (or subscriber) the notice concerns.
    pub stream: Option<Arc<str>>,
    /// Tool name, if applicable.
    pub tool: Option<Arc<str>>,
    /// Human-readable reason (errors, outcome, resumed-from id, etc.).
    pub reason: Option<Arc<str>>,
    /// Stream position, if applicable.
    pub position: Option<u64>,
    /// Active stream count after the change, if applicable.
    pub active: Option<usize>,
}

impl Notice {
    /// Creates a notice of the given kind with current timestamp and next sequence number.
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            seq: NOTICE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            stream: None,
            tool: None,
            reason: None,
            position: None,
            active: None,
        }
    }

    /// Attaches a stream id.
    #[inline]
    pub fn with_stream(mut self, stream: impl Into<Arc<str>>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Attaches a tool name.
    #[inline]
    pub fn with_tool(mut self, tool: impl Into<Arc<str>>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a stream position.
    #[inline]
    pub fn with_position(mut self, position: u64) -> Self {
        self.position = Some(position);
        self
    }

    /// Attaches the active stream count.
    #[inline]
    pub fn with_active(mut self, active: usize) -> Self {
        self.active = Some(active);
        self
    }

    /// Creates a subscriber overflow notice.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Notice::new(NoticeKind::SubscriberOverflow)
            .with_stream(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic notice.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Notice::new(NoticeKind::SubscriberPanicked)
            .with_stream(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, NoticeKind::SubscriberOverflow)
    }
}
