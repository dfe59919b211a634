//! # In-memory checkpoint store (default backend).
//!
//! ## Architecture
//! ```text
//! save/get/delete ──► RwLock<HashMap<stream_id, Checkpoint>>
//!                          ▲
//! sweeper (tokio task) ────┘  every `sweep_interval`: drop entries past their TTL
//!
//! every mutation ──► Bus (CheckpointSaved / CheckpointDeleted / CheckpointExpired)
//! ```
//!
//! ## Rules
//! - `get` enforces the TTL itself and lazily removes what it finds expired;
//!   the sweeper only bounds memory.
//! - A store built inside a tokio runtime starts its own sweeper (unless
//!   `sweep_interval` is zero); dropping the store stops it.
//! - Sweepers hold a weak reference; dropping the store ends them even if
//!   their token is never cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, SystemClock},
    config::StoreConfig,
    error::CheckpointError,
    events::{Bus, Notice, NoticeKind},
};

use super::model::{Checkpoint, SearchHit};
use super::store::CheckpointStore;

/// Default [`CheckpointStore`]: a TTL-bounded hash map.
pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<String, Checkpoint>>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    bus: Bus,
    sweeper: CancellationToken,
}

impl MemoryCheckpointStore {
    /// Creates a store using the system clock.
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a store reading time from `clock`.
    ///
    /// Inside a tokio runtime the background sweep starts here.
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let bus = Bus::new(config.bus_capacity);
        let store = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
            bus,
            sweeper: CancellationToken::new(),
        });
        if Handle::try_current().is_ok() {
            store.spawn_sweeper(store.sweeper.child_token());
        }
        store
    }

    /// Bus carrying this store's notices.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawns an extra background sweep; returns `None` when `sweep_interval` is zero.
    ///
    /// The task ends when `token` is cancelled or the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.config.sweep()?;
        let weak: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = weak.upgrade() else { break };
                        let removed = store.sweep().await;
                        if removed > 0 {
                            tracing::debug!(removed, "checkpoint sweep");
                        }
                    }
                }
            }
        }))
    }

    async fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = {
            let mut entries = self.entries.write().await;
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, cp)| cp.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                entries.remove(id);
            }
            ids
        };
        for id in &expired {
            self.bus
                .publish(Notice::new(NoticeKind::CheckpointExpired).with_stream(id.as_str()));
        }
        expired.len()
    }

    fn resolve_ttl(&self, ttl_ms: u64) -> u64 {
        if ttl_ms == 0 {
            self.config.default_ttl.as_millis().min(u128::from(u64::MAX)) as u64
        } else {
            ttl_ms
        }
    }
}

impl Drop for MemoryCheckpointStore {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, mut checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        checkpoint.timestamp = self.clock.now_ms();
        checkpoint.ttl_ms = self.resolve_ttl(checkpoint.ttl_ms);

        let notice = Notice::new(NoticeKind::CheckpointSaved)
            .with_stream(checkpoint.stream_id.as_str())
            .with_tool(checkpoint.tool_name.as_str())
            .with_position(checkpoint.position);

        self.entries
            .write()
            .await
            .insert(checkpoint.stream_id.clone(), checkpoint);
        self.bus.publish(notice);
        Ok(())
    }

    async fn get(&self, stream_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let now = self.clock.now_ms();
        {
            let entries = self.entries.read().await;
            match entries.get(stream_id) {
                None => return Ok(None),
                Some(cp) if !cp.is_expired(now) => return Ok(Some(cp.clone())),
                Some(_) => {}
            }
        }

        // lazy GC; re-check under the write lock in case of a concurrent save
        let mut entries = self.entries.write().await;
        if entries.get(stream_id).is_some_and(|cp| cp.is_expired(now)) {
            entries.remove(stream_id);
            drop(entries);
            self.bus
                .publish(Notice::new(NoticeKind::CheckpointExpired).with_stream(stream_id));
        }
        Ok(None)
    }

    async fn delete(&self, stream_id: &str) -> Result<bool, CheckpointError> {
        let removed = self.entries.write().await.remove(stream_id).is_some();
        if removed {
            self.bus
                .publish(Notice::new(NoticeKind::CheckpointDeleted).with_stream(stream_id));
        }
        Ok(removed)
    }

    async fn get_by_tool(&self, tool_name: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|cp| cp.tool_name == tool_name && !cp.is_expired(now))
            .cloned()
            .collect())
    }

    async fn sweep_expired(&self) -> Result<usize, CheckpointError> {
        Ok(self.sweep().await)
    }

    async fn extend_ttl(&self, stream_id: &str, additional: Duration) -> Result<bool, CheckpointError> {
        let now = self.clock.now_ms();
        let extra = additional.as_millis().min(u128::from(u64::MAX)) as u64;
        let mut entries = self.entries.write().await;
        match entries.get_mut(stream_id) {
            Some(cp) if !cp.is_expired(now) => {
                cp.ttl_ms = cp.ttl_ms.saturating_add(extra);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Scores each live checkpoint by how many query terms occur in its tool name,
    /// cursor, args and data (case-insensitive); ties go to the most recent.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, CheckpointError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        let mut hits: Vec<SearchHit> = Vec::new();
        for cp in entries.values().filter(|cp| !cp.is_expired(now)) {
            let mut haystack = format!(
                "{} {} {}",
                cp.tool_name,
                cp.cursor.as_deref().unwrap_or_default(),
                serde_json::to_string(&cp.args)?
            );
            if let Some(data) = &cp.data {
                haystack.push(' ');
                haystack.push_str(&serde_json::to_string(data)?);
            }
            let haystack = haystack.to_lowercase();

            let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            if matched > 0 {
                hits.push(SearchHit {
                    checkpoint: cp.clone(),
                    score: matched as f32 / terms.len() as f32,
                });
            }
        }
        drop(entries);

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.checkpoint.timestamp.cmp(&a.checkpoint.timestamp))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
