//! # Logical streams.
//!
//! - [`StreamController`] drives one stream's lifecycle and writes envelopes into a sink.
//! - [`ResumableStream`] decorates a controller with position tracking and checkpoints.
//! - [`ControllerBuilder`] assembles a controller with custom configuration, clock,
//!   tool name and release hook.

mod builder;
mod chunk;
mod controller;
mod resumable;

pub use builder::ControllerBuilder;
pub use controller::{Delivery, StreamController, StreamState};
pub use resumable::{ResumableStream, ResumeOptions};
