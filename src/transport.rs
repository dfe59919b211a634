//! # Transport encoder.
//!
//! Serializes a stamped [`Envelope`] into the wire form of a transport.
//! Encoding is pure: it never mutates the envelope and never assigns defaults
//! (the controller stamps `id`/`timestamp` before calling it). CR and LF are
//! dropped from the SSE `id` and `event` values so a frame is always four lines.
//!
//! ## Wire forms
//! ```text
//! Sse (text/event-stream):          WebSocket (one JSON object per message):
//!   id: <event id>                    {"streamId":"..","id":"..","type":"..",
//!   event: <event type>                "timestamp":..,"data":..,"metadata":..}
//!   data: <json(data)>
//!   <blank line>
//! ```
//!
//! ## Multiplexing
//! A multiplexed physical write is the logical frame prefixed with one
//! `id: <streamId>` line ([`tag`]); [`split_tag`] reverses it on the client side.
//! The manager's own frames (`stream_start`, `stream_cancel`, `heartbeat`) carry
//! the reserved routing id [`MANAGER_ROUTE`], which no logical stream uses.

use std::borrow::Cow;

use serde::Serialize;

use crate::envelope::Envelope;
use crate::error::StreamError;

/// Routing id of frames written by the multiplex manager itself.
pub const MANAGER_ROUTE: &str = "mux";

/// Wire encoding selected for a physical connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transport {
    /// `text/event-stream` framing.
    #[default]
    Sse,
    /// JSON envelope per message for a bidirectional socket.
    WebSocket,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SocketFrame<'a> {
    stream_id: &'a str,
    #[serde(flatten)]
    envelope: &'a Envelope,
}

impl Transport {
    /// Encodes one envelope of `stream_id` into its wire form.
    pub fn encode(&self, stream_id: &str, envelope: &Envelope) -> Result<String, StreamError> {
        match self {
            Transport::Sse => {
                let data = serde_json::to_string(&envelope.data)?;
                let kind = envelope.kind.to_string();
                Ok(format!(
                    "id: {}\nevent: {}\ndata: {}\n\n",
                    single_line(envelope.id.as_deref().unwrap_or_default()),
                    single_line(&kind),
                    data
                ))
            }
            Transport::WebSocket => Ok(serde_json::to_string(&SocketFrame {
                stream_id,
                envelope,
            })?),
        }
    }

    /// Standard response headers for this transport (informational).
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Transport::Sse => &[
                ("Content-Type", "text/event-stream"),
                ("Cache-Control", "no-cache"),
                ("Connection", "keep-alive"),
            ],
            Transport::WebSocket => &[],
        }
    }
}

fn single_line(s: &str) -> Cow<'_, str> {
    if s.contains(['\r', '\n']) {
        Cow::Owned(s.replace(['\r', '\n'], ""))
    } else {
        Cow::Borrowed(s)
    }
}

/// Prefixes a logical frame with its multiplex routing line.
#[inline]
pub fn tag(stream_id: &str, frame: &str) -> String {
    format!("id: {stream_id}\n{frame}")
}

/// Splits a multiplexed physical write into `(stream_id, logical_frame)`.
///
/// Returns `None` when the write carries no routing line. A routing id equal to
/// [`MANAGER_ROUTE`] marks a manager frame rather than a logical stream.
///
/// ```
/// use toolstream::transport::split_tag;
///
/// let (id, inner) = split_tag("id: mux_1_abc\nid: e1\nevent: chunk\ndata: 1\n\n").unwrap();
/// assert_eq!(id, "mux_1_abc");
/// assert!(inner.starts_with("id: e1\n"));
/// ```
pub fn split_tag(write: &str) -> Option<(&str, &str)> {
    let rest = write.strip_prefix("id: ")?;
    let (id, inner) = rest.split_once('\n')?;
    Some((id, inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EventType, Metadata};
    use serde_json::{Value, json};

    fn stamped() -> Envelope {
        Envelope::new(EventType::Chunk, json!({"rows": [1, 2]}))
            .with_id("s1_3")
            .with_timestamp(1_700_000_000_000)
            .with_metadata(Metadata {
                chunk_index: Some(0),
                ..Metadata::default()
            })
    }

    #[test]
    fn sse_frame_is_byte_exact() {
        let out = Transport::Sse.encode("s1", &stamped()).unwrap();
        assert_eq!(out, "id: s1_3\nevent: chunk\ndata: {\"rows\":[1,2]}\n\n");
    }

    #[test]
    fn line_breaks_are_dropped_from_sse_header_lines() {
        let env = Envelope::new(EventType::Other("usage\nevent: complete".into()), json!(1))
            .with_id("s1_\r\n4");
        let out = Transport::Sse.encode("s1", &env).unwrap();
        assert_eq!(out, "id: s1_4\nevent: usageevent: complete\ndata: 1\n\n");
    }

    #[test]
    fn encode_is_idempotent() {
        let env = stamped();
        for t in [Transport::Sse, Transport::WebSocket] {
            assert_eq!(t.encode("s1", &env).unwrap(), t.encode("s1", &env).unwrap());
        }
    }

    #[test]
    fn socket_frame_merges_stream_id() {
        let out = Transport::WebSocket.encode("s1", &stamped()).unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["streamId"], "s1");
        assert_eq!(v["id"], "s1_3");
        assert_eq!(v["type"], "chunk");
        assert_eq!(v["timestamp"], 1_700_000_000_000u64);
        assert_eq!(v["metadata"]["chunkIndex"], 0);
    }

    #[test]
    fn tag_round_trips_through_split() {
        let frame = Transport::Sse.encode("s1", &stamped()).unwrap();
        let physical = tag("mux_9_x", &frame);
        assert_eq!(split_tag(&physical), Some(("mux_9_x", frame.as_str())));
        assert_eq!(split_tag("event: heartbeat\n\n"), None);
    }

    #[test]
    fn sse_headers() {
        assert!(
            Transport::Sse
                .headers()
                .contains(&("Content-Type", "text/event-stream"))
        );
        assert!(Transport::WebSocket.headers().is_empty());
    }
}
