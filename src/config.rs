//! # Runtime configuration.
//!
//! Centralized settings for streams, resumption, the checkpoint store and the
//! multiplex manager. All fields are public; prefer the helper accessors to avoid
//! sprinkling sentinel checks across the codebase.
//!
//! ## Sentinel values
//! - `heartbeat_interval = 0s` → no per-stream heartbeat timer
//! - `sweep_interval = 0s` → no background TTL sweep (reads still enforce TTL)
//! - `checkpoint_interval = 0` → no automatic checkpoints (manual only)
//! - `max_concurrent_streams = 0` → every `create_stream` is rejected

use std::time::Duration;

use crate::transport::Transport;

/// Per-stream settings.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Items per `chunk` envelope when streaming an array result (min 1).
    pub chunk_size: usize,

    /// Soft cap on the serialized size of one chunk's payload.
    ///
    /// A chunk above the cap is split further; a single item above the cap is
    /// still sent on its own.
    pub max_chunk_bytes: usize,

    /// Interval of the self-timed `heartbeat` envelope (`0s` = disabled).
    pub heartbeat_interval: Duration,

    /// Whether `progress` envelopes are emitted for this stream.
    pub enable_progress: bool,

    /// Whether `error` envelopes carry the error's `source()` chain as `stack`.
    pub include_error_detail: bool,

    /// Wire encoding for the physical writer.
    pub transport: Transport,
}

impl StreamConfig {
    /// Returns the heartbeat interval as an `Option`.
    #[inline]
    pub fn heartbeat(&self) -> Option<Duration> {
        if self.heartbeat_interval == Duration::ZERO {
            None
        } else {
            Some(self.heartbeat_interval)
        }
    }

    /// Returns the chunk size clamped to a minimum of 1.
    #[inline]
    pub fn chunk_size_clamped(&self) -> usize {
        self.chunk_size.max(1)
    }
}

impl Default for StreamConfig {
    /// Default configuration:
    ///
    /// - `chunk_size = 10`
    /// - `max_chunk_bytes = 64 KiB`
    /// - `heartbeat_interval = 0s` (disabled)
    /// - `enable_progress = true`
    /// - `include_error_detail` = debug builds only
    /// - `transport = Sse`
    fn default() -> Self {
        Self {
            chunk_size: 10,
            max_chunk_bytes: 64 * 1024,
            heartbeat_interval: Duration::ZERO,
            enable_progress: true,
            include_error_detail: cfg!(debug_assertions),
            transport: Transport::Sse,
        }
    }
}

/// Checkpointing settings of a resumable stream.
#[derive(Clone, Debug)]
pub struct ResumeConfig {
    /// Sends between automatic checkpoints (`0` = manual checkpoints only).
    pub checkpoint_interval: u64,

    /// TTL stamped on every checkpoint this stream saves.
    pub checkpoint_ttl: Duration,
}

impl ResumeConfig {
    /// Returns the automatic checkpoint interval as an `Option`.
    #[inline]
    pub fn auto_interval(&self) -> Option<u64> {
        if self.checkpoint_interval == 0 {
            None
        } else {
            Some(self.checkpoint_interval)
        }
    }
}

impl Default for ResumeConfig {
    /// Default configuration: a checkpoint every 10 sends, kept for one hour.
    fn default() -> Self {
        Self {
            checkpoint_interval: 10,
            checkpoint_ttl: Duration::from_secs(3600),
        }
    }
}

/// Settings of the in-memory checkpoint store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// TTL applied on `save` to checkpoints carrying `ttl = 0`.
    pub default_ttl: Duration,

    /// Interval of the background expiry sweep (`0s` = no sweeper).
    pub sweep_interval: Duration,

    /// Capacity of the notice bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl StoreConfig {
    /// Returns the sweep interval as an `Option`.
    #[inline]
    pub fn sweep(&self) -> Option<Duration> {
        if self.sweep_interval == Duration::ZERO {
            None
        } else {
            Some(self.sweep_interval)
        }
    }
}

impl Default for StoreConfig {
    /// Default configuration: one hour TTL, sweep every minute, bus of 1024.
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            bus_capacity: 1024,
        }
    }
}

/// Settings of a multiplex manager.
#[derive(Clone, Debug)]
pub struct MultiplexConfig {
    /// Admission ceiling; further `create_stream` calls fail closed.
    pub max_concurrent_streams: usize,

    /// Capacity of the notice bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Settings applied to every stream the manager creates.
    pub stream: StreamConfig,

    /// Checkpointing settings applied to every stream the manager creates.
    pub resume: ResumeConfig,
}

impl Default for MultiplexConfig {
    /// Default configuration: up to 10 concurrent streams, bus of 1024.
    fn default() -> Self {
        Self {
            max_concurrent_streams: 10,
            bus_capacity: 1024,
            stream: StreamConfig::default(),
            resume: ResumeConfig::default(),
        }
    }
}
