use serde::{Deserialize, Serialize};

/// Per-stream counters kept by the multiplex manager.
///
/// Observational only; nothing in the runtime branches on these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamAnalytics {
    pub stream_id: String,
    pub tool_name: String,
    /// Admission time (ms since epoch).
    pub start_time: u64,
    /// Set once the stream finished, was cancelled or the manager closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    /// Physical writes that succeeded.
    pub events_emitted: u64,
    /// Bytes handed to the physical sink, tag prefix included.
    pub bytes_transferred: u64,
    /// Failed physical writes plus a terminal `error`.
    pub errors: u64,
    pub resume_count: u32,
}

impl StreamAnalytics {
    pub(crate) fn new(stream_id: &str, tool_name: &str, start_time: u64) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            tool_name: tool_name.to_string(),
            start_time,
            end_time: None,
            events_emitted: 0,
            bytes_transferred: 0,
            errors: 0,
            resume_count: 0,
        }
    }

    /// Stamps `end_time` unless already set.
    pub(crate) fn close(&mut self, now_ms: u64) {
        self.end_time.get_or_insert(now_ms);
    }

    /// Wall time between admission and end, if ended.
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time.map(|end| end.saturating_sub(self.start_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_keeps_first_end_time() {
        let mut a = StreamAnalytics::new("mux_1_abc", "scan", 1_000);
        assert_eq!(a.duration_ms(), None);
        a.close(1_500);
        a.close(9_000);
        assert_eq!(a.end_time, Some(1_500));
        assert_eq!(a.duration_ms(), Some(500));

        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["streamId"], "mux_1_abc");
        assert_eq!(v["bytesTransferred"], 0);
        assert_eq!(v["endTime"], 1_500);
    }
}
