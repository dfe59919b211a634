//! # Executor boundary.
//!
//! [`drive`] runs a tool on its own task and turns every way the tool can end into
//! at most one terminal envelope:
//!
//! ```text
//! Ok(value)              ──► stream.complete(Some(value))
//! Err(Canceled)          ──► nothing
//! Err(e)                 ──► stream.error(&e)
//! panic                  ──► stream.error(&ToolError::Fatal { "panic: ..." })
//! ```
//!
//! A stream that is already terminal when the tool returns stays as it is.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::{ToolError, panic_message};
use crate::stream::ResumableStream;

use super::tool::ToolRef;

/// Spawns `tool` against `stream` and finishes the stream with its outcome.
pub fn drive(tool: ToolRef, stream: ResumableStream, args: Value) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(tool.run(stream.clone(), args))
            .catch_unwind()
            .await;

        let res = match outcome {
            Ok(Ok(value)) => stream.complete(Some(value)).await,
            Ok(Err(ToolError::Canceled)) => {
                tracing::debug!(tool = tool.name(), stream = stream.stream_id(), "tool canceled");
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(tool = tool.name(), stream = stream.stream_id(), error = %e, "tool failed");
                stream.error(&e)
            }
            Err(panic) => {
                let msg = panic_message(&*panic);
                tracing::warn!(tool = tool.name(), stream = stream.stream_id(), panic = %msg, "tool panicked");
                stream.error(&ToolError::fatal(format!("panic: {msg}")))
            }
        };
        if let Err(e) = res {
            tracing::warn!(tool = tool.name(), stream = stream.stream_id(), error = %e, "terminal write failed");
        }
    })
}
