//! Request Pacer (Token Bucket Algorithm)
//!
//! Keeps outgoing generator calls under the upstream's per-minute quota.
//! Uses atomic operations so concurrent chapter attempts never contend on a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Milli-tokens consumed by one request
const TOKEN_COST: u64 = 1000;

/// Token bucket pacing requests per minute
pub struct RequestPacer {
    // Upper 32 bits: milli-tokens (fixed-point)
    // Lower 32 bits: last_refill timestamp (milliseconds since creation)
    packed: AtomicU64,
    creation_time: Instant,
    max_tokens: u32,
    per_minute: u32,
}

impl RequestPacer {
    /// Create a new pacer
    ///
    /// # Arguments
    /// * `max_tokens` - Maximum burst size
    /// * `per_minute` - Requests admitted per minute once the burst is spent
    ///
    /// # Example
    /// Allow 60 requests/min with a burst of 10:
    /// `RequestPacer::new(10, 60)`
    pub fn new(max_tokens: u32, per_minute: u32) -> Self {
        let max_tokens = max_tokens.max(1);
        let tokens_fixed = (max_tokens as u64 * TOKEN_COST) << 32;
        Self {
            packed: AtomicU64::new(tokens_fixed),
            creation_time: Instant::now(),
            max_tokens,
            per_minute,
        }
    }

    /// Take one token if available (non-blocking)
    pub fn try_acquire(&self) -> bool {
        let capacity = self.max_tokens as u64 * TOKEN_COST;
        loop {
            let packed = self.packed.load(Ordering::Acquire);
            let milli_tokens = packed >> 32;
            let last_refill_ms = (packed & 0xFFFF_FFFF) as u32;

            let elapsed_ms = self.creation_time.elapsed().as_millis() as u32;
            let delta_ms = elapsed_ms.saturating_sub(last_refill_ms);

            // per_minute tokens per 60_000ms == per_minute / 60 milli-tokens per ms
            let refill = (delta_ms as u64 * self.per_minute as u64) / 60;
            let available = (milli_tokens + refill).min(capacity);

            if available < TOKEN_COST {
                let new_packed = (available << 32) | elapsed_ms as u64;
                let _ = self.packed.compare_exchange(
                    packed,
                    new_packed,
                    Ordering::Release,
                    Ordering::Acquire,
                );
                return false;
            }

            let new_packed = ((available - TOKEN_COST) << 32) | elapsed_ms as u64;
            if self
                .packed
                .compare_exchange(packed, new_packed, Ordering::Release, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Wait until a token is available, then take it
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(self.refill_interval()).await;
        }
    }

    /// Time for one token to refill
    pub fn refill_interval(&self) -> Duration {
        if self.per_minute == 0 {
            return Duration::from_secs(60);
        }
        Duration::from_millis((60_000 / self.per_minute as u64).max(1))
    }

    /// Whole tokens currently stored (ignores pending refill)
    pub fn remaining(&self) -> u32 {
        ((self.packed.load(Ordering::Acquire) >> 32) / TOKEN_COST) as u32
    }
}
