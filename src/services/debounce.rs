//! Debounce Scheduler
//!
//! Per-key trailing-edge debouncing. Each key is either idle or has exactly
//! one pending timer; scheduling again replaces the timer, so a burst of
//! calls collapses into a single action carrying the last call's arguments.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

struct PendingTimer {
    token: u64,
    handle: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, PendingTimer>>>;

pub struct Debouncer<K> {
    pending: PendingMap<K>,
    next_token: AtomicU64,
}

impl<K> Default for Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
        }
    }

    /// Run `action` once `delay` passes without another call for `key`
    ///
    /// A pending timer for the same key is cancelled. Once the timer fires the
    /// key is idle again and the running action can no longer be cancelled.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let timer_key = key.clone();

        // Held across spawn so the timer cannot look itself up before insertion
        let mut timers = lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let fired = {
                let mut timers = lock(&pending);
                match timers.get(&timer_key) {
                    Some(timer) if timer.token == token => {
                        timers.remove(&timer_key);
                        true
                    }
                    _ => false,
                }
            };
            if fired {
                action().await;
            }
        });

        if let Some(previous) = timers.insert(key, PendingTimer { token, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the pending timer for `key`; returns whether one existed
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.pending).drain() {
            timer.handle.abort();
        }
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, timer) in lock(&self.pending).drain() {
            timer.handle.abort();
        }
    }
}

fn lock<K>(pending: &Mutex<HashMap<K, PendingTimer>>) -> MutexGuard<'_, HashMap<K, PendingTimer>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
