use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resumption marker of one logical stream.
///
/// Keyed by `stream_id`; never mutated in place by a store, only replaced
/// wholesale on `save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub stream_id: String,
    pub tool_name: String,
    /// Original invocation parameters, needed to resume semantically.
    pub args: Value,
    /// Envelopes sent when the checkpoint was taken.
    pub position: u64,
    /// Opaque producer cursor (e.g. a pagination token).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    /// Arbitrary producer snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Last write time (ms since epoch); stamped by the store on `save`.
    pub timestamp: u64,
    /// Time to live in milliseconds; `0` lets the store apply its default.
    #[serde(rename = "ttl")]
    pub ttl_ms: u64,
}

impl Checkpoint {
    /// Creates a checkpoint at position 0 with the store's default TTL.
    pub fn new(stream_id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            stream_id: stream_id.into(),
            tool_name: tool_name.into(),
            args,
            position: 0,
            cursor: None,
            data: None,
            timestamp: 0,
            ttl_ms: 0,
        }
    }

    #[inline]
    pub fn with_position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    #[inline]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    #[inline]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[inline]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }

    /// True once `now - timestamp > ttl`.
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > self.ttl_ms
    }

    /// Absolute expiry time in milliseconds since epoch.
    #[inline]
    pub fn expires_at(&self) -> u64 {
        self.timestamp.saturating_add(self.ttl_ms)
    }
}

/// Ranked result of [`CheckpointStore::search`](super::CheckpointStore::search).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub checkpoint: Checkpoint,
    /// Higher is better.
    pub score: f32,
}
