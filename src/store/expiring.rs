//! Expire-after-access keyed store with a removal listener.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ ExpiringStore<K, V: Expirable>                                   │
//! │                                                                  │
//! │   map: FxHashMap<K, V>           V carries its own access stamp  │
//! │   idle: u64 (nanos)              expire after this much idling   │
//! │   next_sweep: u64                lazy sweep schedule             │
//! │   listener: Fn(&K, &V, cause)    fired on every removal          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Operations
//!
//! - `get_or_try_insert_with`: lookup (touching the entry) or fallible
//!   creation. A failed creation leaves no entry behind.
//! - `invalidate`: explicit removal, reported as [`RemovalCause::Explicit`].
//! - `run_pending`: sweep idle entries if a sweep is due.
//! - `cleanup`: sweep idle entries now.
//!
//! An entry is idle once `now - last_access > idle`. Entries whose
//! [`Expirable::can_expire`] is `false` are never dropped for idleness;
//! their access stamp is refreshed instead.
//!
//! ## Thread Safety
//!
//! Single-owner structure; callers wrap it in a lock. Access stamps live in
//! the values (atomics) so holders of a value can touch it without the lock.

use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::time::Clock;

/// Why an entry left an [`ExpiringStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Idle for longer than the configured duration.
    Expired,
    /// Removed through [`ExpiringStore::invalidate`].
    Explicit,
}

/// Value with an access stamp readable and writable through `&self`.
pub trait Expirable {
    fn last_access(&self) -> u64;

    fn touch(&self, now: u64);

    fn can_expire(&self) -> bool {
        true
    }
}

impl<T: Expirable + ?Sized> Expirable for Arc<T> {
    fn last_access(&self) -> u64 {
        (**self).last_access()
    }

    fn touch(&self, now: u64) {
        (**self).touch(now)
    }

    fn can_expire(&self) -> bool {
        (**self).can_expire()
    }
}

pub type RemovalListener<K, V> = Box<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;

pub struct ExpiringStore<K, V> {
    map: FxHashMap<K, V>,
    idle_nanos: u64,
    clock: Arc<dyn Clock>,
    next_sweep: u64,
    listener: Option<RemovalListener<K, V>>,
}

impl<K, V> ExpiringStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Expirable,
{
    pub fn new(idle_nanos: u64, clock: Arc<dyn Clock>) -> Self {
        let next_sweep = clock.now_nanos().saturating_add(Self::sweep_period(idle_nanos));
        Self {
            map: FxHashMap::default(),
            idle_nanos,
            clock,
            next_sweep,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: RemovalListener<K, V>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[inline]
    fn sweep_period(idle_nanos: u64) -> u64 {
        (idle_nanos / 4).max(1)
    }

    #[inline]
    fn is_idle(&self, value: &V, now: u64) -> bool {
        now.saturating_sub(value.last_access()) > self.idle_nanos
    }

    fn notify(&self, key: &K, value: &V, cause: RemovalCause) {
        if let Some(listener) = &self.listener {
            listener(key, value, cause);
        }
    }

    /// Returns the value for `key` without touching it or checking idleness.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Returns the value for `key`, creating it with `create` if absent.
    pub fn get_or_try_insert_with<Err>(
        &mut self,
        key: &K,
        create: impl FnOnce(&K) -> Result<V, Err>,
    ) -> Result<&V, Err> {
        let now = self.clock.now_nanos();
        self.expire_if_idle(key, now);
        let value = match self.map.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(create(key)?),
        };
        value.touch(now);
        Ok(value)
    }

    fn expire_if_idle(&mut self, key: &K, now: u64) {
        let expired = match self.map.get(key) {
            Some(value) => value.can_expire() && self.is_idle(value, now),
            None => false,
        };
        if expired && let Some((key, value)) = self.map.remove_entry(key) {
            self.notify(&key, &value, RemovalCause::Expired);
        }
    }

    /// Removes `key`, notifying the listener.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        let (key, value) = self.map.remove_entry(key)?;
        self.notify(&key, &value, RemovalCause::Explicit);
        Some(value)
    }

    /// Sweeps idle entries if the sweep schedule says one is due.
    pub fn run_pending(&mut self) -> usize {
        let now = self.clock.now_nanos();
        if now < self.next_sweep {
            return 0;
        }
        self.sweep(now)
    }

    /// Sweeps idle entries now. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_nanos();
        self.sweep(now)
    }

    fn sweep(&mut self, now: u64) -> usize {
        self.next_sweep = now.saturating_add(Self::sweep_period(self.idle_nanos));

        let mut idle = Vec::new();
        for (key, value) in &self.map {
            if !self.is_idle(value, now) {
                continue;
            }
            if value.can_expire() {
                idle.push(key.clone());
            } else {
                value.touch(now);
            }
        }

        let mut removed = 0;
        for key in idle {
            if let Some((key, value)) = self.map.remove_entry(&key) {
                self.notify(&key, &value, RemovalCause::Expired);
                removed += 1;
            }
        }
        removed
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }
}

impl<K, V> std::fmt::Debug for ExpiringStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("len", &self.map.len())
            .field("idle_nanos", &self.idle_nanos)
            .field("next_sweep", &self.next_sweep)
            .finish()
    }
}
