//! Splitting of array results into `chunk` envelopes.
//!
//! Items are grouped greedily: a chunk closes when it holds `chunk_size` items or
//! when adding the next item would push its serialized size over
//! `max_chunk_bytes`. The byte cap is soft: an item larger than the cap still
//! travels, alone, in its own chunk.

use serde_json::Value;

use crate::config::StreamConfig;
use crate::envelope::{Envelope, EventType, Metadata};

/// Plans the `chunk` envelopes for `items`.
pub(crate) fn plan_chunks(
    items: Vec<Value>,
    config: &StreamConfig,
    tool: Option<&str>,
) -> Result<Vec<Envelope>, serde_json::Error> {
    let chunk_size = config.chunk_size_clamped();
    let max_bytes = config.max_chunk_bytes;

    let mut groups: Vec<(Vec<Value>, usize)> = Vec::new();
    let mut current: Vec<Value> = Vec::new();
    // "[]" brackets
    let mut current_bytes = 2usize;

    for item in items {
        let size = serde_json::to_string(&item)?.len();
        let separator = usize::from(!current.is_empty());

        let full = current.len() >= chunk_size;
        let too_big = current_bytes + separator + size > max_bytes;
        if !current.is_empty() && (full || too_big) {
            groups.push((std::mem::take(&mut current), current_bytes));
            current_bytes = 2;
        }

        current_bytes += usize::from(!current.is_empty()) + size;
        current.push(item);
    }
    if !current.is_empty() {
        groups.push((current, current_bytes));
    }

    let total_chunks = groups.len();
    let bytes_total: u64 = groups.iter().map(|(_, b)| *b as u64).sum();
    let mut bytes_sent = 0u64;

    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(index, (group, bytes))| {
            bytes_sent += bytes as u64;
            Envelope::new(EventType::Chunk, Value::Array(group)).with_metadata(Metadata {
                tool_name: tool.map(str::to_string),
                chunk_index: Some(index),
                total_chunks: Some(total_chunks),
                bytes_sent: Some(bytes_sent),
                bytes_total: Some(bytes_total),
                ..Metadata::default()
            })
        })
        .collect())
}
