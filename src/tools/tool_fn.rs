//! # Function-backed tool (`ToolFn`)
//!
//! [`ToolFn`] wraps a closure `F: Fn(ResumableStream, Value) -> Fut`, producing a
//! fresh future per run.
//!
//! ## Example
//! ```rust
//! use serde_json::{Value, json};
//! use toolstream::{ResumableStream, ToolError, ToolFn, ToolRef};
//!
//! let t: ToolRef = ToolFn::arc("echo", |_stream: ResumableStream, args: Value| async move {
//!     Ok::<_, ToolError>(json!({ "echo": args }))
//! });
//!
//! assert_eq!(t.name(), "echo");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::stream::ResumableStream;

use super::tool::Tool;

/// Function-backed tool implementation.
#[derive(Debug)]
pub struct ToolFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ToolFn<F> {
    /// Creates a new function-backed tool.
    ///
    /// Prefer [`ToolFn::arc`] when you immediately need a [`ToolRef`](super::ToolRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the tool and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Tool for ToolFn<F>
where
    F: Fn(ResumableStream, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, stream: ResumableStream, args: Value) -> Result<Value, ToolError> {
        (self.f)(stream, args).await
    }
}
