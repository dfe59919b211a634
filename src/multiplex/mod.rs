//! # Multiplexing of logical streams onto one physical sink.
//!
//! [`MultiplexManager`] admits up to `max_concurrent_streams` resumable streams,
//! tags each of their physical writes with `id: {stream_id}` and keeps per-stream
//! [`StreamAnalytics`].

mod analytics;
mod manager;
mod slot;

pub use analytics::StreamAnalytics;
pub use manager::{CreateOptions, MultiplexManager};
