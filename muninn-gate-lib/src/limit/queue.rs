use crate::key::KeyHash;

/// Fixed-capacity FIFO of key arrivals.
///
/// Every tracked key occupies exactly one slot, so while the store's
/// accounting holds the ring can neither overflow nor run dry mid-sweep.
/// Either condition is an internal bug and panics.
#[derive(Debug)]
pub(crate) struct ArrivalQueue {
    slots: Box<[KeyHash]>,
    head: usize,
    len: usize,
}

impl ArrivalQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { slots: vec![0; capacity].into_boxed_slice(), head: 0, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Record a newly tracked key behind all earlier arrivals.
    pub(crate) fn push(&mut self, key: KeyHash) {
        if self.len == self.slots.len() {
            tracing::error!(capacity = self.slots.len(), "arrival queue overflow");
            panic!("arrival queue overflow: more tracked keys than capacity");
        }
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = key;
        self.len += 1;
    }

    /// Remove and return the oldest arrival.
    pub(crate) fn pop(&mut self) -> KeyHash {
        if self.len == 0 {
            tracing::error!("arrival queue underflow");
            panic!("arrival queue underflow: eviction requested with no tracked keys");
        }
        let key = self.slots[self.head];
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        key
    }
}
