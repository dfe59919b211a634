//! # Checkpoint store contract.
//!
//! Any backend implementing [`CheckpointStore`] is a drop-in replacement for the
//! in-memory default. Streams and the multiplex manager only call
//! `save` / `get` / `delete`.
//!
//! ## Rules
//! - `get` never returns an expired checkpoint, whether or not a sweep ran.
//! - Operations are keyed strictly by `stream_id`; concurrent streams never observe
//!   each other's entries.
//! - Failures are reported, never panicked; callers degrade instead of aborting.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CheckpointError;

use super::model::{Checkpoint, SearchHit};

/// Keyed, TTL-bounded store of resumption markers.
#[async_trait]
pub trait CheckpointStore: Send + Sync + 'static {
    /// Upserts by `stream_id`, stamping `timestamp = now`. Last write wins.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Returns the live checkpoint for `stream_id`, or `None` if absent or expired.
    async fn get(&self, stream_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Removes the checkpoint; returns whether something was removed.
    async fn delete(&self, stream_id: &str) -> Result<bool, CheckpointError>;

    /// Returns every live checkpoint of `tool_name`, unordered.
    async fn get_by_tool(&self, tool_name: &str) -> Result<Vec<Checkpoint>, CheckpointError>;

    /// Deletes every expired entry; returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize, CheckpointError>;

    /// Extends a live checkpoint's TTL; returns `false` if it is absent or expired.
    async fn extend_ttl(
        &self,
        _stream_id: &str,
        _additional: Duration,
    ) -> Result<bool, CheckpointError> {
        Err(CheckpointError::Unsupported("extend_ttl"))
    }

    /// Ranked free-text search over live checkpoints, best first.
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, CheckpointError> {
        Err(CheckpointError::Unsupported("search"))
    }
}
