//! Per-identity in-flight accounting
//!
//! One atomic counter per identity key. Counters are created on first use
//! and never removed, so the key set only grows with the number of distinct
//! callers. The map lock is only held to find or insert a counter, never
//! while an execution runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::Identity;

/// Live count of admitted-but-unfinished executions per identity
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    counters: Mutex<HashMap<String, Arc<AtomicUsize>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, identity: &Identity) -> Arc<AtomicUsize> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(counters.entry(identity.key()).or_default())
    }

    /// Admit one more execution for `identity` unless it already has `limit`
    ///
    /// The check and the increment are a single compare-and-swap, so
    /// concurrent callers can never push the count past `limit`. The slot is
    /// released when the returned guard drops.
    pub fn try_acquire(&self, identity: &Identity, limit: usize) -> Option<InFlightGuard> {
        let counter = self.counter(identity);
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()?;
        Some(InFlightGuard { counter })
    }

    /// Current in-flight count for `identity`
    pub fn in_flight(&self, identity: &Identity) -> usize {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .get(&identity.key())
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    /// Number of identities seen so far
    pub fn identities(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Holds one in-flight slot; releases it on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn user(id: &str) -> Identity {
        Identity::User(id.to_owned())
    }

    #[test]
    fn acquire_up_to_limit() {
        let registry = InFlightRegistry::new();
        let a = registry.try_acquire(&user("1"), 2);
        let b = registry.try_acquire(&user("1"), 2);
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(registry.try_acquire(&user("1"), 2).is_none());
        assert_eq!(registry.in_flight(&user("1")), 2);
    }

    #[test]
    fn rejected_acquire_does_not_increment() {
        let registry = InFlightRegistry::new();
        let _a = registry.try_acquire(&user("1"), 1).unwrap();
        assert!(registry.try_acquire(&user("1"), 1).is_none());
        assert!(registry.try_acquire(&user("1"), 1).is_none());
        assert_eq!(registry.in_flight(&user("1")), 1);
    }

    #[test]
    fn guard_drop_releases_slot() {
        let registry = InFlightRegistry::new();
        let guard = registry.try_acquire(&user("1"), 1).unwrap();
        assert!(registry.try_acquire(&user("1"), 1).is_none());
        drop(guard);
        assert_eq!(registry.in_flight(&user("1")), 0);
        assert!(registry.try_acquire(&user("1"), 1).is_some());
    }

    #[test]
    fn identities_are_independent() {
        let registry = InFlightRegistry::new();
        let _a = registry.try_acquire(&user("1"), 1).unwrap();
        assert!(registry.try_acquire(&user("2"), 1).is_some());
        assert!(registry.try_acquire(&Identity::Anonymous, 1).is_some());
    }

    #[test]
    fn anonymous_callers_share_one_counter() {
        let registry = InFlightRegistry::new();
        let _a = registry.try_acquire(&Identity::Anonymous, 1).unwrap();
        assert!(registry.try_acquire(&Identity::Anonymous, 1).is_none());
    }

    #[test]
    fn entries_are_kept_after_release() {
        let registry = InFlightRegistry::new();
        drop(registry.try_acquire(&user("1"), 1));
        drop(registry.try_acquire(&user("2"), 1));
        assert_eq!(registry.identities(), 2);
        assert_eq!(registry.in_flight(&user("1")), 0);
    }

    #[test]
    fn unknown_identity_has_zero_in_flight() {
        let registry = InFlightRegistry::new();
        assert_eq!(registry.in_flight(&user("nobody")), 0);
        assert_eq!(registry.identities(), 0);
    }

    #[test]
    fn concurrent_acquire_never_exceeds_limit() {
        let registry = Arc::new(InFlightRegistry::new());
        let limit = 3;
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.try_acquire(&user("race"), limit))
            })
            .collect();

        let guards: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(guards.len(), limit);
        assert_eq!(registry.in_flight(&user("race")), limit);
    }
}
