//! # toolstream
//!
//! **toolstream** turns long-running tool invocations (chain queries, market
//! scans, investigations) into incremental, resumable push streams.
//!
//! A producer writes typed [`Envelope`]s through a [`StreamController`]; the
//! controller encodes them for the configured [`Transport`] and hands each frame to
//! a caller-supplied [`Sink`]. A [`ResumableStream`] adds position tracking and
//! periodic checkpoints so a client that drops can reconnect and continue from the
//! last safe point. A [`MultiplexManager`] runs several such streams over one sink
//! under a shared admission ceiling.
//!
//! ## Architecture
//! ```text
//!   Tool::run ──(drive)──► ResumableStream ──► StreamController ──► Transport::encode
//!                              │    ▲                                     │
//!               save / delete  │    │ get (resume)                        ▼
//!                              ▼    │                          Sink (single stream)
//!                          CheckpointStore                            or
//!                              │                       TaggedSink ──► physical Sink
//!                              │                       (MultiplexManager, `id:` prefix)
//!                              ▼
//!       Notice ──► Bus ──► SubscriberSet ──► Subscribe impls (LogWriter, metrics, ...)
//! ```
//!
//! ### Stream lifecycle
//! ```text
//! open ──► [resume partial] ──► send / progress / chunks ──► (every N sends) checkpoint partial
//!      └─► complete: delete checkpoint, write `complete`, release
//!      └─► error:    keep checkpoint,   write `error`,    release
//!      └─► abort:    keep checkpoint,   write nothing,    release
//! ```
//!
//! ## Features
//! | Area            | Description                                                   | Key types / traits                          |
//! |-----------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Envelopes**   | Typed event unit and its wire encodings.                      | [`Envelope`], [`EventType`], [`Transport`]  |
//! | **Streams**     | Per-stream state machine, heartbeats, chunked arrays.         | [`StreamController`], [`ControllerBuilder`] |
//! | **Resumption**  | Position tracking, automatic and manual checkpoints.          | [`ResumableStream`], [`CheckpointStore`]    |
//! | **Multiplexing**| Many streams over one sink with admission and analytics.      | [`MultiplexManager`], [`StreamAnalytics`]   |
//! | **Tools**       | Producer trait and the executor boundary.                     | [`Tool`], [`ToolFn`], [`drive`]             |
//! | **Notices**     | Observability channel for store and manager activity.         | [`Bus`], [`Notice`], [`Subscribe`]          |
//! | **Errors**      | Typed errors for sinks, writes, backends and tools.           | [`StreamError`], [`CheckpointError`]        |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] subscriber, which renders notices through `tracing`.
//!
//! ## Example
//! ```rust
//! use serde_json::{Value, json};
//! use toolstream::{
//!     CreateOptions, EventType, MemoryCheckpointStore, MemorySink, MultiplexConfig,
//!     MultiplexManager, ResumableStream, StoreConfig, ToolError, ToolFn, ToolRef, drive,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let physical = MemorySink::new();
//!     let store = MemoryCheckpointStore::new(StoreConfig::default());
//!     let mux = MultiplexManager::new(physical.clone(), store, MultiplexConfig::default());
//!
//!     let scan: ToolRef = ToolFn::arc("block_scan", |stream: ResumableStream, args: Value| async move {
//!         for block in 0..3u64 {
//!             if stream.is_aborted() {
//!                 return Err(ToolError::Canceled);
//!             }
//!             stream
//!                 .send_data(EventType::Chunk, json!({ "block": block, "chain": args["chain"] }))
//!                 .await
//!                 .map_err(|e| ToolError::fail(e.to_string()))?;
//!         }
//!         Ok::<_, ToolError>(json!({ "scanned": 3 }))
//!     });
//!
//!     let stream = mux
//!         .create_stream("block_scan", json!({ "chain": "eth" }), CreateOptions::default())
//!         .await
//!         .ok_or_else(|| anyhow::anyhow!("admission rejected"))?;
//!     drive(scan, stream.clone(), json!({ "chain": "eth" })).await?;
//!
//!     assert_eq!(stream.position(), 3);
//!     assert_eq!(mux.get_stream_count(), 0);
//!     assert!(physical.frames().iter().any(|f| f.contains("event: complete\n")));
//!     Ok(())
//! }
//! ```
mod checkpoint;
mod clock;
mod config;
mod envelope;
mod error;
mod events;
mod multiplex;
mod sink;
mod stream;
mod subscribers;
mod tools;
pub mod transport;

// ---- Public re-exports ----

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SearchHit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MultiplexConfig, ResumeConfig, StoreConfig, StreamConfig};
pub use envelope::{CheckpointNotice, Envelope, EventType, Metadata, ResumeNotice};
pub use error::{CheckpointError, SinkError, StreamError, ToolError};
pub use events::{Bus, Notice, NoticeKind};
pub use multiplex::{CreateOptions, MultiplexManager, StreamAnalytics};
pub use sink::{ChannelSink, MemorySink, Sink};
pub use stream::{
    ControllerBuilder, Delivery, ResumableStream, ResumeOptions, StreamController, StreamState,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tools::{Tool, ToolFn, ToolRef, drive};
pub use transport::Transport;

// Optional: expose a built-in tracing subscriber for notices.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
