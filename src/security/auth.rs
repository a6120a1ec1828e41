//! Shared-secret authentication with brute-force blocking.
//!
//! # Responsibilities
//! - Pull credential candidates from `X-Proxy-Password` and `Authorization: Bearer`
//! - Compare candidates against the secret in constant time
//! - Count consecutive failures per client and block at `max_attempts`
//!
//! # Design Decisions
//! - Any matching candidate authenticates the request
//! - Blocks only end by expiry; a correct credential does not lift them
//! - Expired blocks are cleared lazily on the next check and by the janitor
//! - The table is capped at `max_clients`; unblocked entries are evicted
//!   before blocked ones

use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

use crate::config::AuthConfig;
use crate::net::ClientIdentity;
use crate::observability::metrics;

/// Dedicated password header, checked before `Authorization`.
pub const PROXY_PASSWORD_HEADER: &str = "x-proxy-password";

const BEARER_PREFIX: &str = "Bearer ";

/// At the ceiling, this fraction of the table is evicted at once.
const EVICTION_DIVISOR: usize = 5;

#[derive(Debug, Clone)]
struct AuthState {
    failures: u32,
    blocked_until: Option<Instant>,
    last_failure: Instant,
}

impl AuthState {
    fn block_expired(&self, now: Instant) -> bool {
        matches!(self.blocked_until, Some(until) if now >= until)
    }
}

/// Credential checker and per-client failure tracker.
#[derive(Debug)]
pub struct AuthGuard {
    secret_digest: Option<[u8; 32]>,
    max_attempts: u32,
    block_duration: Duration,
    max_clients: usize,
    states: DashMap<ClientIdentity, AuthState>,
}

impl AuthGuard {
    pub fn new(config: &AuthConfig) -> Self {
        let secret_digest = config.enabled().then(|| digest(&config.token));
        Self {
            secret_digest,
            max_attempts: config.max_attempts.max(1),
            block_duration: Duration::from_secs(config.block_duration_secs),
            max_clients: config.max_clients.max(1),
            states: DashMap::new(),
        }
    }

    /// Whether a secret is configured at all.
    pub fn enabled(&self) -> bool {
        self.secret_digest.is_some()
    }

    /// True while `client` is serving a block.
    pub fn check_blocked(&self, client: &ClientIdentity) -> bool {
        self.check_blocked_at(client, Instant::now())
    }

    pub(crate) fn check_blocked_at(&self, client: &ClientIdentity, now: Instant) -> bool {
        if self
            .states
            .remove_if(client, |_, state| state.block_expired(now))
            .is_some()
        {
            tracing::info!(client = %client, "Block expired, failure count reset");
            return false;
        }

        self.states
            .get(client)
            .map(|state| state.blocked_until.is_some())
            .unwrap_or(false)
    }

    /// Check `candidates` against the secret and update the failure counter.
    pub fn authenticate(&self, client: &ClientIdentity, candidates: &[&str]) -> bool {
        self.authenticate_at(client, candidates, Instant::now())
    }

    pub(crate) fn authenticate_at(
        &self,
        client: &ClientIdentity,
        candidates: &[&str],
        now: Instant,
    ) -> bool {
        let Some(expected) = self.secret_digest.as_ref() else {
            return true;
        };

        if matches_any(expected, candidates) {
            if let Some(mut state) = self.states.get_mut(client) {
                // A live block is never lifted by a success.
                if state.blocked_until.is_none() {
                    state.failures = 0;
                }
            }
            return true;
        }

        // Concurrent first failures may overshoot the ceiling by a few entries
        // until the next insertion evicts.
        if !self.states.contains_key(client) && self.states.len() >= self.max_clients {
            let evicted = self.evict_oldest();
            tracing::debug!(
                evicted,
                remaining = self.states.len(),
                "Auth table at capacity, evicted oldest entries"
            );
        }

        let mut state = self
            .states
            .entry(client.clone())
            .or_insert_with(|| AuthState {
                failures: 0,
                blocked_until: None,
                last_failure: now,
            });
        state.failures = state.failures.saturating_add(1);
        state.last_failure = now;

        if state.failures >= self.max_attempts && state.blocked_until.is_none() {
            state.blocked_until = Some(now + self.block_duration);
            metrics::record_client_blocked();
            tracing::warn!(
                client = %client,
                failures = state.failures,
                block_secs = self.block_duration.as_secs(),
                "Client blocked after repeated authentication failures"
            );
        } else {
            tracing::debug!(client = %client, failures = state.failures, "Authentication failed");
        }
        false
    }

    /// Drop expired blocks and failure counters idle longer than the block
    /// duration. Returns how many entries were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.states.len();
        let idle = self.block_duration;
        self.states.retain(|_, state| match state.blocked_until {
            Some(until) => now < until,
            None => now.saturating_duration_since(state.last_failure) < idle,
        });
        before.saturating_sub(self.states.len())
    }

    /// Remove the oldest fifth of the table. Unblocked entries go first, oldest
    /// failure first; blocked entries only then, soonest expiry first.
    fn evict_oldest(&self) -> usize {
        let mut by_age: Vec<((bool, Instant), ClientIdentity)> = self
            .states
            .iter()
            .map(|entry| {
                let state = entry.value();
                let rank = match state.blocked_until {
                    Some(until) => (true, until),
                    None => (false, state.last_failure),
                };
                (rank, entry.key().clone())
            })
            .collect();

        let count = (self.max_clients / EVICTION_DIVISOR)
            .max(1)
            .min(by_age.len());
        if count == 0 {
            return 0;
        }
        if count < by_age.len() {
            by_age.select_nth_unstable_by_key(count - 1, |(rank, _)| *rank);
        }

        by_age
            .into_iter()
            .take(count)
            .filter(|(_, id)| self.states.remove(id).is_some())
            .count()
    }

    /// Current consecutive failure count for `client`.
    pub fn failures(&self, client: &ClientIdentity) -> u32 {
        self.states.get(client).map(|s| s.failures).unwrap_or(0)
    }

    pub fn tracked_clients(&self) -> usize {
        self.states.len()
    }
}

/// Credential candidates in priority order: the password header, then the
/// bearer token.
pub fn credential_candidates(headers: &HeaderMap) -> Vec<&str> {
    let mut candidates = Vec::with_capacity(2);

    if let Some(password) = headers
        .get(PROXY_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        candidates.push(password);
    }

    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .filter(|v| !v.is_empty())
    {
        candidates.push(token);
    }

    candidates
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Compare every candidate so the timing does not depend on which one matched.
fn matches_any(expected: &[u8; 32], candidates: &[&str]) -> bool {
    let mut matched = Choice::from(0);
    for candidate in candidates {
        matched |= digest(candidate)[..].ct_eq(&expected[..]);
    }
    matched.into()
}
