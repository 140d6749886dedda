use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};
use validator::Validate;

use crate::config::LimiterConfig;
use crate::error::{ProxyError, Result};
use crate::token_bucket::TokenBucket;

/// In-memory, per-identity token bucket limiter.
///
/// Cloning is cheap; every clone shares the same bucket map.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<LimiterConfig>,
    buckets: Arc<RwLock<HashMap<String, TokenBucket>>>,
}

/// Outcome of a single [`RateLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Tokens left for this identity after the call
    pub remaining: u32,
    pub limit: u32,
}

impl RateLimiter {
    /// Create a limiter without a background sweep.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        config.validate()?;

        Ok(RateLimiter {
            config: Arc::new(config),
            buckets: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create a limiter and spawn its sweep task on the current tokio runtime.
    pub fn start(config: LimiterConfig) -> Result<(Self, SweepHandle)> {
        let limiter = Self::new(config)?;
        let handle = limiter.spawn_sweeper();
        Ok((limiter, handle))
    }

    /// Spawn a task that drops idle buckets every `sweep_period`.
    pub fn spawn_sweeper(&self) -> SweepHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_sweeper(self.clone(), shutdown_rx));

        SweepHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Admit or deny one request for `key`.
    pub fn allow(&self, key: &str) -> Result<bool> {
        Ok(self.check(key)?.allowed)
    }

    pub fn check(&self, key: &str) -> Result<RateLimitDecision> {
        self.check_at(key, Instant::now())
    }

    /// Refill and consume under one write lock so concurrent callers for the
    /// same key can never both spend the last token.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<RateLimitDecision> {
        let capacity = self.config.capacity;
        let interval = self.config.interval;

        let mut buckets = self.buckets.write()
            .map_err(|_| ProxyError::InternalFailure("Failed to acquire write lock on buckets".to_string()))?;

        let (allowed, remaining) = match buckets.get_mut(key) {
            Some(bucket) => {
                let allowed = bucket.try_consume(capacity, interval, now);
                (allowed, bucket.tokens())
            }
            None => {
                let bucket = TokenBucket::seeded(capacity, now);
                let remaining = bucket.tokens();
                buckets.insert(key.to_string(), bucket);
                (true, remaining)
            }
        };

        Ok(RateLimitDecision {
            allowed,
            remaining,
            limit: capacity,
        })
    }

    /// Tokens currently held by `key`, without refilling. Unknown keys report
    /// full capacity.
    pub fn remaining(&self, key: &str) -> Result<u32> {
        let buckets = self.buckets.read()
            .map_err(|_| ProxyError::InternalFailure("Failed to acquire read lock on buckets".to_string()))?;

        Ok(buckets
            .get(key)
            .map(TokenBucket::tokens)
            .unwrap_or(self.config.capacity))
    }

    /// Forget `key`; its next request is treated as first-ever.
    pub fn reset(&self, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write()
            .map_err(|_| ProxyError::InternalFailure("Failed to acquire write lock on buckets".to_string()))?;
        buckets.remove(key);

        Ok(())
    }

    /// Number of identities currently tracked
    pub fn len(&self) -> Result<usize> {
        let buckets = self.buckets.read()
            .map_err(|_| ProxyError::InternalFailure("Failed to acquire read lock on buckets".to_string()))?;

        Ok(buckets.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn sweep(&self) -> Result<usize> {
        self.sweep_at(Instant::now())
    }

    /// Drop buckets idle for longer than `idle_ttl`. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> Result<usize> {
        let idle_ttl = self.config.idle_ttl;

        let mut buckets = self.buckets.write()
            .map_err(|_| ProxyError::InternalFailure("Failed to acquire write lock on buckets".to_string()))?;

        let initial_count = buckets.len();
        buckets.retain(|_, bucket| bucket.idle_for(now) <= idle_ttl);

        Ok(initial_count - buckets.len())
    }
}

/// Owns the background sweep task.
///
/// Call [`SweepHandle::stop`] to end the task and wait for it. Dropping the
/// handle also ends the task, at its next wakeup.
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Rate limiter sweep task did not exit cleanly");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run_sweeper(limiter: RateLimiter, mut shutdown: oneshot::Receiver<()>) {
    let period = limiter.config.sweep_period;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => match limiter.sweep() {
                Ok(removed) => {
                    let remaining = limiter.len().unwrap_or_default();
                    debug!(removed, remaining, "Swept idle rate limit buckets");
                }
                Err(e) => warn!(error = %e, "Rate limit sweep failed"),
            },
            // Fires on an explicit stop and when the handle is dropped
            _ = &mut shutdown => {
                debug!("Rate limiter sweep task stopping");
                break;
            }
        }
    }
}
