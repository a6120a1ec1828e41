//! Background sweeping of idle per-client state.
//!
//! # Responsibilities
//! - Periodically drop rate buckets idle past their TTL
//! - Periodically drop expired blocks and stale failure counters
//!
//! The rate limiter's ceiling holds without this task; the janitor only
//! returns memory during quiet periods.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use super::auth::AuthGuard;
use super::rate_limit::RateLimiter;

pub struct Janitor {
    limiter: Option<Arc<RateLimiter>>,
    auth: Arc<AuthGuard>,
    interval: Duration,
    idle_ttl: Duration,
}

impl Janitor {
    pub fn new(
        limiter: Option<Arc<RateLimiter>>,
        auth: Arc<AuthGuard>,
        interval: Duration,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            limiter,
            auth,
            interval,
            idle_ttl,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            idle_ttl_secs = self.idle_ttl.as_secs(),
            "Janitor starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; there is nothing to sweep yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Janitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One sweep pass over both stores.
    pub fn sweep(&self) {
        let buckets = self
            .limiter
            .as_ref()
            .map(|limiter| limiter.sweep_idle(self.idle_ttl))
            .unwrap_or(0);
        let auth_entries = self.auth.sweep_expired();

        if buckets > 0 || auth_entries > 0 {
            tracing::debug!(buckets, auth_entries, "Janitor swept idle client state");
        }
    }
}
