use std::time::Duration;
use tokio::time::Instant;

/// Per-identity token state.
///
/// Holds at most `capacity` tokens. Tokens come back in whole cycles: every
/// full `interval` since the last observation restores `capacity` tokens.
/// The refill clock restarts on every observation, so traffic arriving faster
/// than one request per `interval` never completes a cycle.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket for a first-time caller. The first request is free, so the
    /// bucket starts one below capacity.
    pub fn seeded(capacity: u32, now: Instant) -> Self {
        Self {
            tokens: capacity.saturating_sub(1),
            last_refill: now,
        }
    }

    /// Refill, then take one token if any is left.
    pub fn try_consume(&mut self, capacity: u32, interval: Duration, now: Instant) -> bool {
        self.refill(capacity, interval, now);

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Time since the bucket was last touched. Zero if `now` is earlier.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_refill)
    }

    fn refill(&mut self, capacity: u32, interval: Duration, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let cycles = elapsed.as_nanos() / interval.as_nanos().max(1);

        if cycles > 0 {
            let added = cycles.saturating_mul(u128::from(capacity));
            let refilled = u128::from(self.tokens).saturating_add(added);
            // Clamp before narrowing; capacity always fits in u32
            self.tokens = refilled.min(u128::from(capacity)) as u32;
        }

        self.last_refill = now;
    }
}
