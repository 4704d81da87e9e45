//! Deduplicating work queue of request keys
//!
//! A key is queued at most once. A key added while a worker is processing it
//! is marked dirty and queued again when that worker calls [`WorkQueue::done`],
//! so the same key is never processed by two workers at once.

use certapprover_types::RequestKey;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<RequestKey>,
    dirty: HashSet<RequestKey>,
    processing: HashSet<RequestKey>,
    failures: HashMap<RequestKey, u32>,
    shutting_down: bool,
}

/// Work queue shared by producers and workers
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // The state is plain bookkeeping; a panicked holder leaves it usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a key unless it is already waiting
    pub fn add(&self, key: RequestKey) {
        let mut state = self.state();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Queue a key after `delay`
    pub fn add_after(self: &Arc<Self>, key: RequestKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key. Returns `None` once the queue shuts down.
    pub async fn get(&self) -> Option<RequestKey> {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Mark a key as processed, re-queueing it if it was added meanwhile
    pub fn done(&self, key: &RequestKey) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Record a failure and return how many retries preceded it
    pub fn record_failure(&self, key: &RequestKey) -> u32 {
        let mut state = self.state();
        let failures = state.failures.entry(key.clone()).or_insert(0);
        let previous = *failures;
        *failures = failures.saturating_add(1);
        previous
    }

    /// Reset the failure count of a key
    pub fn forget(&self, key: &RequestKey) {
        self.state().failures.remove(key);
    }

    /// Failures recorded for a key since it last succeeded
    pub fn failures(&self, key: &RequestKey) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Number of keys waiting
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shutdown(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}
