//! # Event envelope: the canonical unit flowing through every stream.
//!
//! An [`Envelope`] is transport-agnostic. It is stamped with an `id` and a
//! `timestamp` by the controller right before encoding (see [`Envelope::stamp`]),
//! so encoding the same stamped envelope twice is byte-identical.
//!
//! ## Event types
//! The wire vocabulary is closed (`start, progress, chunk, partial, complete, error,
//! heartbeat`) but consumers must pass unknown types through; [`EventType::Other`]
//! carries them verbatim. The multiplex manager also uses it for its own
//! `stream_start` / `stream_cancel` notifications.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use toolstream::{Envelope, EventType};
//!
//! let mut env = Envelope::new(EventType::Chunk, json!([1, 2, 3]));
//! env.stamp("s1", 0, 1_700_000_000_000);
//!
//! assert_eq!(env.id.as_deref(), Some("s1_0"));
//! assert_eq!(env.kind.as_str(), "chunk");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of envelopes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Stream began producing.
    Start,
    /// Progress percentage update.
    Progress,
    /// One slice of an array result.
    Chunk,
    /// Incremental or synthetic (resume/checkpoint) payload.
    Partial,
    /// Terminal success carrying the final result.
    Complete,
    /// Terminal failure carrying `{message, name}`.
    Error,
    /// Liveness ping.
    Heartbeat,
    /// Any type outside the vocabulary; passed through untouched.
    Other(String),
}

impl EventType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Start => "start",
            EventType::Progress => "progress",
            EventType::Chunk => "chunk",
            EventType::Partial => "partial",
            EventType::Complete => "complete",
            EventType::Error => "error",
            EventType::Heartbeat => "heartbeat",
            EventType::Other(s) => s,
        }
    }

    /// True for `complete` and `error`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::Complete | EventType::Error)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "start" => EventType::Start,
            "progress" => EventType::Progress,
            "chunk" => EventType::Chunk,
            "partial" => EventType::Partial,
            "complete" => EventType::Complete,
            "error" => EventType::Error,
            "heartbeat" => EventType::Heartbeat,
            _ => EventType::Other(s),
        }
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        match t {
            EventType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EventType::from(s.to_string()))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory envelope metadata. Never required for correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Tool that produced the envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Progress percent (nominally 0-100; not clamped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Zero-based chunk index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Total chunk count of the array being streamed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// Serialized bytes of array payload sent so far (including this chunk).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    /// Total serialized bytes of the array payload, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_total: Option<u64>,
}

/// Canonical typed unit of streamed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique within a logical stream; defaults to `{streamId}_{counter}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Event classification.
    #[serde(rename = "type")]
    pub kind: EventType,
    /// Milliseconds since epoch; defaults to emission time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Opaque payload.
    pub data: Value,
    /// Optional advisory metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Envelope {
    /// Creates an unstamped envelope.
    pub fn new(kind: EventType, data: Value) -> Self {
        Self {
            id: None,
            kind,
            timestamp: None,
            data,
            metadata: None,
        }
    }

    /// Sets an explicit id.
    #[inline]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets an explicit timestamp.
    #[inline]
    pub fn with_timestamp(mut self, ms: u64) -> Self {
        self.timestamp = Some(ms);
        self
    }

    /// Attaches metadata.
    #[inline]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Fills `id` and `timestamp` only if the producer left them unset.
    ///
    /// Metadata is never touched.
    pub fn stamp(&mut self, stream_id: &str, seq: u64, now_ms: u64) {
        if self.id.is_none() {
            self.id = Some(format!("{stream_id}_{seq}"));
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(now_ms);
        }
    }
}

/// Payload of the synthetic `partial` envelope emitted after a successful resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "resume", rename_all = "camelCase")]
pub struct ResumeNotice {
    pub resumed_from: String,
    pub position: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub message: String,
}

impl ResumeNotice {
    pub fn new(resumed_from: impl Into<String>, position: u64, cursor: Option<String>) -> Self {
        Self {
            resumed_from: resumed_from.into(),
            position,
            cursor,
            message: format!("Resumed from position {position}"),
        }
    }
}

/// Payload of the synthetic `partial` envelope emitted after a checkpoint was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "checkpoint", rename_all = "camelCase")]
pub struct CheckpointNotice {
    pub checkpoint_id: String,
    pub position: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub message: String,
}

impl CheckpointNotice {
    pub fn new(checkpoint_id: impl Into<String>, position: u64, cursor: Option<String>) -> Self {
        Self {
            checkpoint_id: checkpoint_id.into(),
            position,
            cursor,
            message: "Checkpoint created - can resume from here".to_string(),
        }
    }
}
