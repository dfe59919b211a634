//! # Tool producers and the executor boundary.
//!
//! - [`Tool`] / [`ToolRef`]: the producer trait and its shared handle.
//! - [`ToolFn`]: closure-backed tool.
//! - [`drive`]: spawns a tool and funnels its outcome into the stream.

mod drive;
mod tool;
mod tool_fn;

pub use drive::drive;
pub use tool::{Tool, ToolRef};
pub use tool_fn::ToolFn;
