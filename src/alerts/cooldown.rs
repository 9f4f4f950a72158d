use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::types::CooldownKey;

/// Last-fired timestamps per (user, symbol).
///
/// The lock is only held for a single map operation; callers never await
/// while holding it.
#[derive(Debug, Default)]
pub struct CooldownStore {
    entries: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl CooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff the key fired less than `window` before `now`.
    pub fn should_suppress(&self, key: &CooldownKey, now: DateTime<Utc>, window: TimeDelta) -> bool {
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(last_fired) => now.signed_duration_since(*last_fired) < window,
            None => false,
        }
    }

    /// Upsert `key -> now`.
    pub fn record_fired(&self, key: CooldownKey, now: DateTime<Utc>) {
        self.entries.lock().insert(key, now);
    }

    #[cfg(test)]
    pub(crate) fn last_fired(&self, key: &CooldownKey) -> Option<DateTime<Utc>> {
        self.entries.lock().get(key).copied()
    }

    /// Drop entries whose last fire is at least `max_age` old. Returns the
    /// number of evicted keys.
    ///
    /// Entries that old can no longer suppress anything as long as
    /// `max_age >= window`, so eviction never changes firing behaviour.
    pub fn sweep(&self, now: DateTime<Utc>, max_age: TimeDelta) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, last_fired| now.signed_duration_since(*last_fired) < max_age);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
