use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use reviewq_core::cache::{CacheKey, QueueKey};

use super::{Engine, EngineEvent};

/// A live polling loop for one key. Dropping it stops the loop.
#[derive(Debug)]
pub struct Subscription {
    key: CacheKey,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps the stats poll running and moves the queue poll along with the
/// active view and filter.
#[derive(Debug)]
pub struct Poller {
    task: JoinHandle<()>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Engine {
    pub fn subscribe_queue(&self, key: QueueKey) -> Subscription {
        self.subscribe(CacheKey::Queue(key), self.inner.queue_poll)
    }

    pub fn subscribe_stats(&self) -> Subscription {
        self.subscribe(CacheKey::Stats, self.inner.stats_poll)
    }

    /// Poll `key` every `every`. The first tick fires immediately. A tick
    /// that finds the key fresh, or held by a mutation, does nothing.
    pub fn subscribe(&self, key: CacheKey, every: Duration) -> Subscription {
        let engine = self.clone();
        let polled = key.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if engine.revalidate(&polled) {
                    tracing::trace!(key = %polled, "poll");
                }
            }
        });
        tracing::debug!(%key, every_secs = every.as_secs(), "subscribed");
        Subscription { key, task }
    }

    pub fn start_polling(&self) -> Poller {
        let engine = self.clone();
        let mut events = self.subscribe_events();
        let task = tokio::spawn(async move {
            let _stats = engine.subscribe_stats();
            let mut queue = engine.subscribe_queue(engine.selection().queue_key());
            loop {
                match events.recv().await {
                    Ok(EngineEvent::SelectionChanged { .. }) | Err(RecvError::Lagged(_)) => {
                        let key = engine.selection().queue_key();
                        if queue.key() != &CacheKey::Queue(key) {
                            queue = engine.subscribe_queue(key);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Poller { task }
    }
}
