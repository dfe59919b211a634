//! Error types used by the streaming runtime and tool producers.
//!
//! This module defines the error enums crossing the public API:
//!
//! - [`SinkError`]: failures of the physical writer.
//! - [`StreamError`]: failures of a single controller write (encode or sink).
//! - [`CheckpointError`]: failures of a checkpoint backend.
//! - [`ToolError`]: outcomes reported by tool producers at the executor boundary.
//!
//! Every type provides `as_label` (a stable snake_case label for logs/metrics).

use thiserror::Error;

/// # Errors produced by a physical writer.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The writer was already ended (or its receiving side went away).
    #[error("sink closed")]
    Closed,

    /// The underlying transport rejected the write.
    #[error("sink write failed: {0}")]
    Write(String),
}

impl SinkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Closed => "sink_closed",
            SinkError::Write(_) => "sink_write_failed",
        }
    }
}

/// # Errors produced by a controller write.
///
/// The core never retries; the caller decides whether a failed write should abort the stream.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StreamError {
    /// Physical writer failure.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Envelope payload could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StreamError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use toolstream::{SinkError, StreamError};
    ///
    /// let err = StreamError::from(SinkError::Closed);
    /// assert_eq!(err.as_label(), "sink_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Sink(e) => e.as_label(),
            StreamError::Encode(_) => "stream_encode_failed",
        }
    }
}

/// # Errors produced by a checkpoint backend.
///
/// None of these abort a running stream: save failures degrade resumability,
/// get failures during resume are treated as "no checkpoint".
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Backend unreachable or refused the operation.
    #[error("checkpoint backend unavailable: {0}")]
    Unavailable(String),

    /// Checkpoint contents could not be (de)serialized by the backend.
    #[error("checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend does not implement an optional operation.
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl CheckpointError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CheckpointError::Unavailable(_) => "checkpoint_unavailable",
            CheckpointError::Serialization(_) => "checkpoint_serialization",
            CheckpointError::Unsupported(_) => "checkpoint_unsupported",
        }
    }
}

/// # Errors produced by tool execution.
///
/// Returned from [`Tool::run`](crate::Tool::run) and funnelled into the stream's
/// terminal `error` envelope by [`drive`](crate::drive).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ToolError {
    /// Non-recoverable failure (resuming will not help).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Execution failed but may succeed if resumed from the last checkpoint.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The producer observed an abort and stopped early.
    #[error("stream aborted")]
    Canceled,
}

impl ToolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use toolstream::ToolError;
    ///
    /// let err = ToolError::Fail { error: "rpc timeout".into() };
    /// assert_eq!(err.as_label(), "tool_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ToolError::Fatal { .. } => "tool_fatal",
            ToolError::Fail { .. } => "tool_failed",
            ToolError::Canceled => "tool_canceled",
        }
    }

    /// Indicates whether resuming from a checkpoint is worth attempting.
    ///
    /// Returns `true` only for [`ToolError::Fail`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Fail { .. })
    }

    /// Convenience constructor for a retryable failure.
    pub fn fail(error: impl Into<String>) -> Self {
        ToolError::Fail {
            error: error.into(),
        }
    }

    /// Convenience constructor for a fatal failure.
    pub fn fatal(error: impl Into<String>) -> Self {
        ToolError::Fatal {
            error: error.into(),
        }
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(SinkError::Write("x".into()).as_label(), "sink_write_failed");
        assert_eq!(
            CheckpointError::Unsupported("search").as_label(),
            "checkpoint_unsupported"
        );
        assert_eq!(ToolError::Canceled.as_label(), "tool_canceled");
        assert_eq!(ToolError::fatal("nope").as_label(), "tool_fatal");
    }

    #[test]
    fn only_fail_is_retryable() {
        assert!(ToolError::fail("boom").is_retryable());
        assert!(!ToolError::fatal("boom").is_retryable());
        assert!(!ToolError::Canceled.is_retryable());
    }

    #[test]
    fn stream_error_wraps_sink_error() {
        let err: StreamError = SinkError::Closed.into();
        assert!(matches!(err, StreamError::Sink(SinkError::Closed)));
        assert_eq!(err.to_string(), "sink closed");
    }
}
