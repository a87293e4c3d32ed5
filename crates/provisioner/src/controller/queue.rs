use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::Mutex;

use super::ObjectKey;

#[derive(Default)]
struct Pending {
    // Sent on the channel and not yet handed to the worker
    queued: HashSet<ObjectKey>,
    // Sleeping until their retry delay runs out
    waiting: HashSet<ObjectKey>,
}

/// Adds keys to a [`WorkQueue`]. A key that is already queued is not queued
/// twice.
#[derive(Clone)]
pub(crate) struct QueueHandle {
    tx: Sender<ObjectKey>,
    pending: Arc<Mutex<Pending>>,
}

impl QueueHandle {
    /// Queues `key` unless it is already waiting for the worker. Returns false
    /// once the queue is gone.
    pub(crate) async fn add(&self, key: ObjectKey) -> bool {
        {
            let mut pending = self.pending.lock().await;
            if !pending.queued.insert(key.clone()) {
                return true;
            }
        }
        self.tx.send(key).await.is_ok()
    }
}

/// Keys waiting to be reconciled, plus how many times in a row each failing
/// key has failed.
///
/// A key is held at most once in the channel and has at most one retry
/// scheduled, however many events arrive for it.
pub(crate) struct WorkQueue {
    handle: QueueHandle,
    rx: Receiver<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl WorkQueue {
    pub(crate) fn new(buffer: usize, base_delay: Duration, max_delay: Duration) -> Self {
        let (tx, rx) = channel(buffer);
        WorkQueue {
            handle: QueueHandle {
                tx,
                pending: Arc::new(Mutex::new(Pending::default())),
            },
            rx,
            failures: HashMap::new(),
            base_delay,
            max_delay,
        }
    }

    /// Handle for producers such as watchers.
    pub(crate) fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub(crate) async fn next(&mut self) -> Option<ObjectKey> {
        let key = self.rx.recv().await?;
        self.handle.pending.lock().await.queued.remove(&key);
        Some(key)
    }

    /// Schedules `key` to come back once its retry delay runs out and returns
    /// that delay.
    ///
    /// Returns `None` without scheduling anything when the key is already
    /// queued or already has a retry scheduled; that pass covers this failure.
    pub(crate) async fn requeue(&mut self, key: ObjectKey) -> Option<Duration> {
        {
            let mut pending = self.handle.pending.lock().await;
            if pending.queued.contains(&key) || !pending.waiting.insert(key.clone()) {
                return None;
            }
        }

        let failures = self.failures.entry(key.clone()).or_insert(0);
        let delay = retry_delay(self.base_delay, self.max_delay, *failures);
        *failures = failures.saturating_add(1);

        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.pending.lock().await.waiting.remove(&key);
            // The queue only goes away on shutdown
            let _ = handle.add(key).await;
        });
        Some(delay)
    }

    /// Drops the failure count of `key` after it reconciled or gave up.
    pub(crate) fn forget(&mut self, key: &ObjectKey) {
        self.failures.remove(key);
    }
}

/// The delay after `failures` earlier failures: `base` doubled once per
/// failure, never more than `max`.
fn retry_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    2u32.checked_pow(failures)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}
