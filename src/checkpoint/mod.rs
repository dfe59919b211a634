//! Checkpoints: model, store contract and the in-memory backend.
//!
//! ## Contents
//! - [`Checkpoint`], [`SearchHit`] data model
//! - [`CheckpointStore`] the backend contract (`save` / `get` / `delete` / `get_by_tool` /
//!   `sweep_expired`, plus optional `extend_ttl` and `search`)
//! - [`MemoryCheckpointStore`] default TTL-bounded hash map with a background sweeper
//!
//! The store is the only component shared by reference across streams and the only one
//! that outlives an individual stream.

mod memory;
mod model;
mod store;

pub use memory::MemoryCheckpointStore;
pub use model::{Checkpoint, SearchHit};
pub use store::CheckpointStore;
