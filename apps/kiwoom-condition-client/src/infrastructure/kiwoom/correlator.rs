//! Response Correlator
//!
//! A keyed single-slot mailbox that hands responses from the dispatcher to
//! whichever caller is waiting on a given correlation key.
//!
//! Each key holds at most one entry, either:
//!
//! - a **filed** response nobody has claimed yet (a later `put` for the same
//!   key overwrites it), or
//! - a **waiter**: a oneshot sender registered by a caller. `put` resolves
//!   it directly instead of filing.
//!
//! Callers either poll at a fixed cadence ([`ResponseCorrelator::poll_until`])
//! or register a waiter and await it ([`ResponseCorrelator::register`],
//! [`ResponseCorrelator::wait_for`]). A waiter that times out or is dropped
//! removes itself, so a late response is filed rather than lost.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::codec::InboundFrame;

/// Shortest cadence `poll_until` will sleep between checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

enum Slot<V> {
    Filed(V),
    Waiting(oneshot::Sender<V>),
}

/// What `put` did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Handed straight to a registered waiter.
    Delivered,
    /// Filed for a later poll.
    Filed,
    /// Filed, replacing an unclaimed earlier response.
    Overwrote,
}

/// Keyed single-slot response mailbox.
pub struct ResponseCorrelator<K, V = InboundFrame> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for ResponseCorrelator<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Debug for ResponseCorrelator<K, V>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock();
        let mut map = f.debug_map();
        for (key, slot) in slots.iter() {
            let state = match slot {
                Slot::Filed(_) => "filed",
                Slot::Waiting(_) => "waiting",
            };
            map.entry(key, &state);
        }
        map.finish()
    }
}

impl<K, V> ResponseCorrelator<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create an empty correlator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File `value` under `key`, or hand it to the registered waiter.
    pub fn put(&self, key: K, value: V) -> PutOutcome {
        let mut slots = self.slots.lock();

        let value = match slots.remove(&key) {
            Some(Slot::Waiting(tx)) => match tx.send(value) {
                Ok(()) => return PutOutcome::Delivered,
                // Waiter gave up between timeout and cleanup.
                Err(value) => value,
            },
            Some(Slot::Filed(_)) => {
                slots.insert(key, Slot::Filed(value));
                return PutOutcome::Overwrote;
            }
            None => value,
        };

        slots.insert(key, Slot::Filed(value));
        PutOutcome::Filed
    }

    /// Remove and return the filed response under `key`, if any.
    ///
    /// A registered waiter is left in place.
    pub fn take(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Filed(_)) => match slots.remove(key) {
                Some(Slot::Filed(value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Drop whatever is held under `key`. Returns `true` if something was removed.
    pub fn clear(&self, key: &K) -> bool {
        self.slots.lock().remove(key).is_some()
    }

    /// Number of keys with a filed response or a waiter.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no key holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Check for a filed response every `interval` until one appears or
    /// `max_wait` elapses. The response is removed when returned.
    ///
    /// `interval` is raised to [`MIN_POLL_INTERVAL`] so a zero cadence
    /// cannot busy-loop.
    pub async fn poll_until(&self, key: &K, max_wait: Duration, interval: Duration) -> Option<V> {
        let deadline = Instant::now() + max_wait;
        let interval = interval.max(MIN_POLL_INTERVAL);

        loop {
            if let Some(value) = self.take(key) {
                return Some(value);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// Register a waiter for `key`.
    ///
    /// A response already filed under `key` resolves the waiter immediately.
    /// A previous waiter for the same key is displaced and resolves to `None`.
    pub fn register(&self, key: K) -> PendingResponse<'_, K, V> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock();

        match slots.remove(&key) {
            Some(Slot::Filed(value)) => {
                let _ = tx.send(value);
            }
            Some(Slot::Waiting(_)) => {
                tracing::warn!(key = ?key, "displacing an outstanding waiter for the same key");
                slots.insert(key.clone(), Slot::Waiting(tx));
            }
            None => {
                slots.insert(key.clone(), Slot::Waiting(tx));
            }
        }

        PendingResponse {
            correlator: self,
            key,
            rx,
        }
    }

    /// Register a waiter for `key` and await it for at most `max_wait`.
    pub async fn wait_for(&self, key: K, max_wait: Duration) -> Option<V> {
        self.register(key).wait(max_wait).await
    }

    fn remove_closed_waiter(&self, key: &K) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(Slot::Waiting(tx)) if tx.is_closed()) {
            slots.remove(key);
        }
    }
}

/// An outstanding waiter for one correlation key.
///
/// Dropping it (on timeout or cancellation) unregisters the waiter.
pub struct PendingResponse<'a, K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    correlator: &'a ResponseCorrelator<K, V>,
    key: K,
    rx: oneshot::Receiver<V>,
}

impl<K, V> PendingResponse<'_, K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Correlation key this waiter is registered under.
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Await the response for at most `max_wait`.
    ///
    /// Returns `None` on timeout or when the waiter was displaced.
    pub async fn wait(mut self, max_wait: Duration) -> Option<V> {
        match tokio::time::timeout(max_wait, &mut self.rx).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => None,
            Err(_elapsed) => {
                // A response that raced the deadline is still ours.
                self.rx.close();
                self.rx.try_recv().ok()
            }
        }
    }
}

impl<K, V> Drop for PendingResponse<'_, K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        self.rx.close();
        self.correlator.remove_closed_waiter(&self.key);
    }
}
