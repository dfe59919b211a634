//! # Tool abstraction.
//!
//! A [`Tool`] is the producer behind a stream: it receives the stream handle and the
//! invocation arguments, writes envelopes, and returns the final result. The common
//! handle type is [`ToolRef`], an `Arc<dyn Tool>`.
//!
//! Long-running tools check [`ResumableStream::is_aborted`] between steps and return
//! [`ToolError::Canceled`] once it is set.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::stream::ResumableStream;

/// Shared handle to a tool.
pub type ToolRef = Arc<dyn Tool>;

/// # Asynchronous stream producer.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use serde_json::{Value, json};
/// use toolstream::{EventType, ResumableStream, Tool, ToolError};
///
/// struct BlockScan;
///
/// #[async_trait]
/// impl Tool for BlockScan {
///     fn name(&self) -> &str { "block_scan" }
///
///     async fn run(&self, stream: ResumableStream, args: Value) -> Result<Value, ToolError> {
///         let from = stream.position();
///         for block in from..from + 3 {
///             if stream.is_aborted() {
///                 return Err(ToolError::Canceled);
///             }
///             stream
///                 .send_data(EventType::Chunk, json!({ "block": block, "chain": args["chain"] }))
///                 .await
///                 .map_err(|e| ToolError::fail(e.to_string()))?;
///         }
///         Ok(json!({ "scanned": 3 }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Returns a stable tool name.
    fn name(&self) -> &str;

    /// Produces the stream's envelopes and returns the final result.
    ///
    /// The result becomes the `complete` envelope's payload; an error becomes the
    /// `error` envelope. [`ToolError::Canceled`] ends the run without either.
    async fn run(&self, stream: ResumableStream, args: Value) -> Result<Value, ToolError>;
}
