//! # LogWriter: notice logger
//!
//! A minimal subscriber that renders incoming [`Notice`]s through `tracing`.
//! Install any `tracing` subscriber in the host application to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  stream started stream="mux_1700000000000_k3j9x0a1b" tool="whale_tracker" active=1
//! DEBUG checkpoint saved stream="mux_1700000000000_k3j9x0a1b" position=10
//! WARN  stream rejected tool="market_scan" reason="capacity" active=2
//! ```

use async_trait::async_trait;

use crate::events::{Notice, NoticeKind};
use crate::subscribers::Subscribe;

/// Notice writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_notice(&self, n: &Notice) {
        let stream = n.stream.as_deref().unwrap_or("-");
        let tool = n.tool.as_deref().unwrap_or("-");
        let reason = n.reason.as_deref().unwrap_or("");

        match n.kind {
            NoticeKind::CheckpointSaved => {
                tracing::debug!(stream, tool, position = ?n.position, "checkpoint saved");
            }
            NoticeKind::CheckpointDeleted => tracing::debug!(stream, "checkpoint deleted"),
            NoticeKind::CheckpointExpired => tracing::debug!(stream, "checkpoint expired"),
            NoticeKind::CheckpointFailed => {
                tracing::warn!(stream, reason, "checkpoint backend failure");
            }
            NoticeKind::StreamStarted => {
                tracing::info!(stream, tool, active = ?n.active, "stream started");
            }
            NoticeKind::StreamResumed => {
                tracing::info!(stream, tool, from = reason, position = ?n.position, "stream resumed");
            }
            NoticeKind::StreamFinished => {
                tracing::info!(stream, tool, outcome = reason, active = ?n.active, "stream finished");
            }
            NoticeKind::StreamCancelled => {
                tracing::info!(stream, tool, active = ?n.active, "stream cancelled");
            }
            NoticeKind::StreamRejected => tracing::warn!(tool, reason, "stream rejected"),
            NoticeKind::ManagerClosed => {
                tracing::info!(aborted = ?n.active, "multiplex manager closed");
            }
            NoticeKind::SubscriberOverflow => {
                tracing::warn!(subscriber = stream, reason, "subscriber overflow");
            }
            NoticeKind::SubscriberPanicked => {
                tracing::error!(subscriber = stream, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
