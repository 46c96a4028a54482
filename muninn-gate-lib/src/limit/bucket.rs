use std::time::{Duration, Instant};

/// Per-key token state.
///
/// A bucket starts full so a newly seen client gets its whole burst;
/// `last_refill` stays empty until the first check stamps it.
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    tokens: f64,
    last_refill: Option<Instant>,
}

impl Bucket {
    pub(crate) fn prefilled(burst: f64) -> Self {
        Self { tokens: burst, last_refill: None }
    }

    /// Credit tokens for the time elapsed since the previous check,
    /// capped at `burst`. A bucket that has never been checked gains
    /// nothing: its prefill already holds the whole burst.
    pub(crate) fn refill(&mut self, now: Instant, refill_every: Duration, burst: f64) {
        if let Some(prev) = self.last_refill {
            let elapsed = now.saturating_duration_since(prev);
            self.tokens = (self.tokens + elapsed.div_duration_f64(refill_every)).min(burst);
        }
    }

    /// Take one token if at least one is available, returning the whole
    /// tokens left. The timestamp advances either way so a client that
    /// keeps hammering while rejected cannot bank the elapsed time.
    pub(crate) fn try_take(&mut self, now: Instant) -> Option<u32> {
        self.last_refill = Some(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Some(self.tokens as u32)
        } else {
            None
        }
    }
}
