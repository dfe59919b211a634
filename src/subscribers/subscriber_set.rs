//! # Non-blocking notice fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`], which distributes notices to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! Bus ──► listen() ──► emit(notice)
//!                         │
//!                         ├──► [queue 1] ──► worker 1 ──► subscriber1.on_notice()
//!                         │    (bounded)         └──────► panic → SubscriberPanicked
//!                         └──► [queue N] ──► worker N ──► subscriberN.on_notice()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process notice N while B processes N+5
//! - **Overflow**: notice dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Per-subscriber FIFO**: each subscriber sees notices in order

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::error::panic_message;
use crate::events::{Bus, Notice, NoticeKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Notice>>,
}

/// Fan-out coordinator for multiple notice subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// `bus` receives overflow/panic notices produced by the set itself.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Notice>>(cap);
            let s = Arc::clone(&sub);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(n) = rx.recv().await {
                    let fut = s.on_notice(n.as_ref());

                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        bus_for_worker
                            .publish(Notice::subscriber_panicked(s.name(), panic_message(&*panic_err)));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits a notice to all subscribers.
    ///
    /// On queue full/closed the notice is dropped for that subscriber and a
    /// `SubscriberOverflow` notice is published (never for an overflow notice itself).
    pub fn emit(&self, notice: Arc<Notice>) {
        let is_overflow = matches!(notice.kind, NoticeKind::SubscriberOverflow);

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&notice)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow {
                        self.bus
                            .publish(Notice::subscriber_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow {
                        self.bus
                            .publish(Notice::subscriber_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Relays every notice published on `bus` into this set until `token` is cancelled,
    /// then shuts the workers down.
    pub fn listen(self, bus: &Bus, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(n) => self.emit(Arc::new(n)),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notice listener lagged");
                        }
                    }
                }
            }
            self.shutdown().await;
        })
    }

    /// Gracefully shuts down all subscriber workers.
    ///
    /// 1. Drops all channel senders (workers see channel closed)
    /// 2. Awaits all worker tasks to finish
    pub async fn shutdown(self) {
        drop(self.channels);

        for h in self.workers {
            let _ = h.await;
        }
    }
}
