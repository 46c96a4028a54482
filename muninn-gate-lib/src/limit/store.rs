use ahash::AHashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::key::KeyHash;
use crate::limit::bucket::Bucket;
use crate::limit::queue::ArrivalQueue;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was consumed; `remaining` whole tokens are left.
    Granted { remaining: u32 },
    /// The key is out of tokens.
    Rejected,
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Admission::Rejected)
    }
}

struct StoreState {
    buckets: AHashMap<KeyHash, Bucket>,
    arrivals: ArrivalQueue,
}

/// Bounded token-bucket state, one bucket per client key.
///
/// Buckets are created lazily on first sight and refilled from elapsed
/// time during each check; nothing runs in the background. When a new key
/// would push the map past `max_keys`, the oldest tenth of the tracked
/// keys (by first arrival, not by last use) is evicted first. Checks for
/// keys the map already holds never evict.
pub struct BucketStore {
    state: Mutex<StoreState>,
    refill_every: Duration,
    burst: f64,
    max_keys: usize,
}

impl BucketStore {
    /// Create a store. `burst` and `max_keys` are raised to at least 1.
    ///
    /// # Panics
    /// Panics if `refill_every` is zero.
    pub fn new(refill_every: Duration, burst: u32, max_keys: usize) -> Self {
        assert!(!refill_every.is_zero(), "refill interval must be non-zero");
        let burst = burst.max(1);
        let max_keys = max_keys.max(1);
        Self {
            state: Mutex::new(StoreState {
                buckets: AHashMap::new(),
                arrivals: ArrivalQueue::with_capacity(max_keys),
            }),
            refill_every,
            burst: f64::from(burst),
            max_keys,
        }
    }

    /// Run one admission check for `key` now.
    pub fn check(&self, key: KeyHash) -> Admission {
        self.check_at(key, Instant::now())
    }

    /// Clock-injected variant backing [`check`](Self::check); tests drive
    /// it with synthetic instants.
    pub(crate) fn check_at(&self, key: KeyHash, now: Instant) -> Admission {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("bucket store lock poisoned");
                return Admission::Granted { remaining: 0 };
            }
        };

        if let Some(bucket) = state.buckets.get_mut(&key) {
            return Self::settle(bucket, now, self.refill_every, self.burst);
        }

        if state.buckets.len() >= self.max_keys {
            self.evict_oldest(&mut state);
        }

        state.arrivals.push(key);
        let bucket = state.buckets.entry(key).or_insert_with(|| Bucket::prefilled(self.burst));
        Self::settle(bucket, now, self.refill_every, self.burst)
    }

    fn settle(bucket: &mut Bucket, now: Instant, refill_every: Duration, burst: f64) -> Admission {
        bucket.refill(now, refill_every, burst);
        match bucket.try_take(now) {
            Some(remaining) => Admission::Granted { remaining },
            None => Admission::Rejected,
        }
    }

    /// Drop the oldest tenth of tracked keys (at least one) to make room
    /// for a new arrival.
    fn evict_oldest(&self, state: &mut StoreState) {
        let started = Instant::now();
        let sweep = (self.max_keys / 10).max(1);
        for _ in 0..sweep {
            let oldest = state.arrivals.pop();
            if state.buckets.remove(&oldest).is_none() {
                tracing::error!(key = oldest, "arrival queue and bucket map out of sync");
                panic!("evicted key missing from bucket map");
            }
        }
        debug_assert_eq!(state.arrivals.len(), state.buckets.len());
        debug!(evicted = sweep, elapsed = ?started.elapsed(), "eviction sweep completed");
    }

    /// Number of client keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        match self.state.lock() {
            Ok(guard) => guard.buckets.len(),
            Err(_) => 0,
        }
    }

    pub fn burst(&self) -> u32 {
        self.burst as u32
    }

    pub fn refill_every(&self) -> Duration {
        self.refill_every
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVERY: Duration = Duration::from_secs(1);

    fn store(burst: u32, max_keys: usize) -> BucketStore {
        BucketStore::new(EVERY, burst, max_keys)
    }

    #[test]
    fn grants_exactly_burst_then_rejects() {
        let store = store(3, 100);
        let now = Instant::now();

        assert_eq!(store.check_at(7, now), Admission::Granted { remaining: 2 });
        assert_eq!(store.check_at(7, now), Admission::Granted { remaining: 1 });
        assert_eq!(store.check_at(7, now), Admission::Granted { remaining: 0 });
        assert_eq!(store.check_at(7, now), Admission::Rejected);
    }

    #[test]
    fn fresh_key_is_always_granted() {
        let store = store(1, 100);
        assert!(store.check(42).is_granted());
    }

    #[test]
    fn zero_elapsed_adds_no_credit() {
        let store = store(1, 100);
        let now = Instant::now();

        assert!(store.check_at(7, now).is_granted());
        assert!(store.check_at(7, now).is_rejected());
        assert!(store.check_at(7, now).is_rejected());
    }

    #[test]
    fn refills_one_token_per_interval() {
        let store = store(1, 100);
        let base = Instant::now();

        assert!(store.check_at(7, base).is_granted());
        assert!(store.check_at(7, base + EVERY / 2).is_rejected());
        // Half an interval after the rejected probe: its half-token plus
        // this half-token make one.
        assert!(store.check_at(7, base + EVERY).is_granted());
    }

    #[test]
    fn rejected_probe_advances_the_stamp() {
        let store = store(1, 100);
        let base = Instant::now();

        assert!(store.check_at(7, base).is_granted());
        // 500 ms buys half a token.
        assert!(store.check_at(7, base + EVERY / 2).is_rejected());
        // Were the stamp not advanced above, the 750 ms since `base`
        // would be double-counted here as 0.5 + 0.75 and wrongly admit.
        assert!(store.check_at(7, base + EVERY * 3 / 4).is_rejected());
        assert!(store.check_at(7, base + EVERY * 5 / 4).is_granted());
    }

    #[test]
    fn idle_credit_clamps_at_burst() {
        let store = store(2, 100);
        let base = Instant::now();

        assert!(store.check_at(7, base).is_granted());
        assert!(store.check_at(7, base).is_granted());

        let later = base + EVERY * 50;
        assert!(store.check_at(7, later).is_granted());
        assert!(store.check_at(7, later).is_granted());
        assert!(store.check_at(7, later).is_rejected());
    }

    #[test]
    fn keys_do_not_share_tokens() {
        let store = store(1, 100);
        let now = Instant::now();

        assert!(store.check_at(1, now).is_granted());
        assert!(store.check_at(1, now).is_rejected());
        assert!(store.check_at(2, now).is_granted());
        assert!(store.check_at(1, now).is_rejected());
    }

    #[test]
    fn tracked_keys_never_exceed_capacity() {
        let store = store(1, 10);
        let now = Instant::now();

        for key in 1..=200 {
            store.check_at(key, now);
            assert!(store.tracked_keys() <= 10);
        }
    }

    #[test]
    fn evicts_first_arrival_first() {
        let store = store(1, 10);
        let now = Instant::now();

        for key in 1..=10 {
            assert!(store.check_at(key, now).is_granted());
        }
        assert_eq!(store.tracked_keys(), 10);

        // Key 11 displaces exactly the oldest key (capacity 10 sweeps one).
        assert!(store.check_at(11, now).is_granted());
        assert_eq!(store.tracked_keys(), 10);

        // Key 1 comes back with a fresh prefilled bucket: it was evicted.
        assert!(store.check_at(1, now).is_granted());
        // Key 11 kept its drained bucket: it was not.
        assert!(store.check_at(11, now).is_rejected());
        // Key 1's return displaced key 2, the next-oldest arrival.
        assert!(store.check_at(2, now).is_granted());
        assert_eq!(store.tracked_keys(), 10);
    }

    #[test]
    fn sweep_removes_a_tenth_of_capacity() {
        let store = store(1, 30);
        let now = Instant::now();

        for key in 1..=30 {
            store.check_at(key, now);
        }
        store.check_at(31, now);

        // 30 tracked - 3 swept + 1 inserted.
        assert_eq!(store.tracked_keys(), 28);
        for key in 1..=3 {
            // The three oldest arrivals are gone and re-enter prefilled.
            assert!(store.check_at(key, now).is_granted());
        }
        // Key 3's return filled the map again and swept keys 4..=6;
        // key 7 survived everything with a drained bucket.
        assert!(store.check_at(7, now).is_rejected());
        assert_eq!(store.tracked_keys(), 28);
    }

    #[test]
    fn existing_key_checks_never_evict() {
        let store = store(2, 5);
        let now = Instant::now();

        for key in 1..=5 {
            store.check_at(key, now);
        }
        // Hammering a tracked key at capacity must not disturb others.
        for _ in 0..10 {
            store.check_at(3, now);
        }
        assert_eq!(store.tracked_keys(), 5);
        assert!(store.check_at(1, now).is_granted());
    }

    #[test]
    fn burst_and_capacity_clamp_to_one() {
        let store = BucketStore::new(EVERY, 0, 0);
        assert_eq!(store.burst(), 1);
        assert_eq!(store.max_keys(), 1);

        assert!(store.check(1).is_granted());
        assert!(store.check(1).is_rejected());
    }

    #[test]
    #[should_panic(expected = "refill interval must be non-zero")]
    fn zero_interval_panics() {
        let _ = BucketStore::new(Duration::ZERO, 1, 1);
    }
}
