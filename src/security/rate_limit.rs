//! Per-client token bucket rate limiting with a hard memory ceiling.
//!
//! Every client gets a bucket holding up to `burst_size` tokens that refills
//! at `requests_per_minute / 60` tokens per second. Buckets live in one map
//! behind a single mutex; each `admit` is one short critical section, eviction
//! included, and never spans I/O.
//!
//! The map is capped at `max_clients`. Inserting a new client into a full map
//! first evicts the least recently seen fifth of the entries. The janitor's
//! idle sweep only shrinks memory further during calm periods.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::net::ClientIdentity;
use crate::observability::metrics;

/// Fraction of the map evicted when the ceiling is hit.
const EVICTION_DIVISOR: usize = 5;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        // Instants are monotonic, but a caller-supplied `now` may still be older.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
            self.last_refill = now;
        }
        if now > self.last_seen {
            self.last_seen = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Bounded per-client rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<ClientIdentity, TokenBucket>>,
    refill_per_sec: f64,
    capacity: f64,
    max_clients: usize,
}

impl RateLimiter {
    /// Build a limiter from `requests_per_minute`, `burst_size` and `max_clients`.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_limits(
            config.requests_per_minute,
            config.burst_size,
            config.max_clients,
        )
    }

    pub fn with_limits(requests_per_minute: u32, burst_size: u32, max_clients: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            refill_per_sec: f64::from(requests_per_minute) / 60.0,
            capacity: f64::from(burst_size),
            max_clients: max_clients.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientIdentity, TokenBucket>> {
        // Buckets are plain numbers; a panic elsewhere cannot leave them torn.
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or reject one request from `client`.
    pub fn admit(&self, client: &ClientIdentity) -> bool {
        self.admit_at(client, Instant::now())
    }

    pub(crate) fn admit_at(&self, client: &ClientIdentity, now: Instant) -> bool {
        let mut buckets = self.lock();

        if !buckets.contains_key(client) && buckets.len() >= self.max_clients {
            let evicted = evict_oldest(&mut buckets, self.max_clients);
            tracing::debug!(
                evicted,
                remaining = buckets.len(),
                "Rate limiter at capacity, evicted least recently seen clients"
            );
        }

        let capacity = self.capacity;
        let bucket = buckets
            .entry(client.clone())
            .or_insert_with(|| TokenBucket::new(capacity, now));
        let admitted = bucket.try_acquire(capacity, self.refill_per_sec, now);

        metrics::record_rate_limiter_clients(buckets.len());
        admitted
    }

    /// Drop buckets not seen for `idle_ttl`. Returns how many were removed.
    pub fn sweep_idle(&self, idle_ttl: Duration) -> usize {
        self.sweep_idle_at(idle_ttl, Instant::now())
    }

    pub(crate) fn sweep_idle_at(&self, idle_ttl: Duration, now: Instant) -> usize {
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) < idle_ttl);
        metrics::record_rate_limiter_clients(buckets.len());
        before - buckets.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remove the least recently seen ~20% of entries (at least one).
fn evict_oldest(buckets: &mut HashMap<ClientIdentity, TokenBucket>, ceiling: usize) -> usize {
    let count = (ceiling / EVICTION_DIVISOR).max(1).min(buckets.len());
    if count == 0 {
        return 0;
    }

    let mut by_age: Vec<(Instant, ClientIdentity)> = buckets
        .iter()
        .map(|(id, bucket)| (bucket.last_seen, id.clone()))
        .collect();
    if count < by_age.len() {
        by_age.select_nth_unstable_by_key(count - 1, |(seen, _)| *seen);
    }
    for (_, id) in by_age.into_iter().take(count) {
        buckets.remove(&id);
    }
    count
}
