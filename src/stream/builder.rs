use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    config::StreamConfig,
    sink::Sink,
};

use super::controller::{ReleaseHook, StreamController, StreamState};

/// Builder for constructing a [`StreamController`] with optional collaborators.
pub struct ControllerBuilder {
    stream_id: String,
    sink: Arc<dyn Sink>,
    config: StreamConfig,
    clock: Arc<dyn Clock>,
    tool: Option<String>,
    release: Option<ReleaseHook>,
}

impl ControllerBuilder {
    /// Creates a builder for stream `stream_id` writing into `sink`.
    pub fn new(stream_id: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        Self {
            stream_id: stream_id.into(),
            sink,
            config: StreamConfig::default(),
            clock: Arc::new(SystemClock),
            tool: None,
            release: None,
        }
    }

    /// Sets the stream configuration.
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock used for envelope timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the tool name stamped into controller-generated metadata.
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Registers a callback run exactly once, after the terminal transition.
    pub fn on_release(mut self, hook: impl FnOnce(StreamState) + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Builds the controller.
    ///
    /// When the configured heartbeat interval is non-zero this spawns the heartbeat
    /// timer and must therefore run inside a tokio runtime.
    pub fn build(self) -> StreamController {
        StreamController::from_parts(
            self.stream_id,
            self.sink,
            self.config,
            self.clock,
            self.tool,
            self.release,
        )
    }
}
