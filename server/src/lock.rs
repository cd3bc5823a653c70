//! In-process exclusion for draws being generated.
//!
//! The lock is only a fast path that turns concurrent triggers for the same key into an
//! immediate "in progress" answer. Exactly-once persistence is enforced by the store.

use lotto_types::DrawKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct LockEntry {
    acquired_at: Instant,
}

impl LockEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.acquired_at) >= ttl
    }
}

type Entries = Arc<Mutex<HashMap<DrawKey, LockEntry>>>;

fn lock_entries(entries: &Entries) -> MutexGuard<'_, HashMap<DrawKey, LockEntry>> {
    match entries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("draw lock map poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

/// Map of draws in flight, keyed by [`DrawKey`]. Entries expire after the TTL.
#[derive(Clone, Debug)]
pub struct DrawLock {
    entries: Entries,
    ttl: Duration,
}

impl DrawLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns `None` while another unexpired holder exists.
    pub fn try_acquire(&self, key: DrawKey) -> Option<DrawLockGuard> {
        self.try_acquire_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: DrawKey, now: Instant) -> Option<DrawLockGuard> {
        let mut entries = lock_entries(&self.entries);
        if let Some(entry) = entries.get(&key) {
            if !entry.is_expired(now, self.ttl) {
                return None;
            }
            tracing::warn!(draw = %key, "reclaiming expired draw lock");
        }
        entries.insert(key, LockEntry { acquired_at: now });
        Some(DrawLockGuard {
            key,
            acquired_at: now,
            entries: self.entries.clone(),
        })
    }

    pub fn is_held(&self, key: &DrawKey) -> bool {
        let now = Instant::now();
        lock_entries(&self.entries)
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now, self.ttl))
    }
}

/// Releases the lock entry when dropped, whatever way the generation ended.
#[derive(Debug)]
pub struct DrawLockGuard {
    key: DrawKey,
    acquired_at: Instant,
    entries: Entries,
}

impl DrawLockGuard {
    pub fn key(&self) -> DrawKey {
        self.key
    }
}

impl Drop for DrawLockGuard {
    fn drop(&mut self) {
        let mut entries = lock_entries(&self.entries);
        // an expired guard must not release a newer holder
        if entries
            .get(&self.key)
            .is_some_and(|entry| entry.acquired_at == self.acquired_at)
        {
            entries.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotto_types::parse_draw_date;

    fn key(slot: &str) -> DrawKey {
        DrawKey::new(
            parse_draw_date("2025-01-10").expect("date"),
            slot.parse().expect("slot"),
        )
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let lock = DrawLock::new(Duration::from_secs(60));
        let guard = lock.try_acquire(key("02:00 PM")).expect("first acquire");
        assert!(lock.try_acquire(key("02:00 PM")).is_none());
        assert!(lock.try_acquire(key("02:15 PM")).is_some());
        assert!(lock.is_held(&key("02:00 PM")));

        drop(guard);
        assert!(!lock.is_held(&key("02:00 PM")));
        assert!(lock.try_acquire(key("02:00 PM")).is_some());
    }

    #[test]
    fn expired_entries_are_reclaimed() {
        let lock = DrawLock::new(Duration::from_secs(60));
        let start = Instant::now();
        let stale = lock.try_acquire_at(key("09:00 AM"), start).expect("acquire");
        let later = start + Duration::from_secs(61);
        let fresh = lock
            .try_acquire_at(key("09:00 AM"), later)
            .expect("expired entry is reclaimed");

        // the stale guard leaves the fresh holder in place
        drop(stale);
        assert!(lock.try_acquire_at(key("09:00 AM"), later).is_none());
        drop(fresh);
        assert!(lock.try_acquire_at(key("09:00 AM"), later).is_some());
    }

    #[test]
    fn released_on_panic() {
        let lock = DrawLock::new(Duration::from_secs(60));
        let cloned = lock.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.try_acquire(key("11:45 PM")).expect("acquire");
            panic!("generation failed");
        });
        assert!(result.is_err());
        assert!(!lock.is_held(&key("11:45 PM")));
    }
}
