//! Bounded retry with a process-wide error-rate circuit breaker.
//!
//! A burst of failures across independent lanes usually means a shared
//! dependency is struggling (rate limiting, RPC outage), so once the
//! shared tally hits its threshold every lane sits out one cooldown
//! instead of retrying independently and amplifying the load.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::utils::credentials::{key_suffix, FailedKeys};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_pause: Duration,
    /// Consecutive-failure count that trips the breaker.
    pub tally_threshold: u32,
    /// Failures further apart than this start a new streak.
    pub idle_window: Duration,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            attempt_pause: Duration::from_secs(5),
            tally_threshold: 7,
            idle_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Process-wide failure streak shared by every lane.
///
/// All read-modify-write sequences happen under the owning mutex; the
/// cooldown deadline lives here too so lanes can observe it before
/// their next attempt without anyone sleeping while holding the lock.
#[derive(Debug, Default)]
pub struct ErrorTally {
    count: u32,
    last_failure: Option<Instant>,
    cooldown_until: Option<Instant>,
}

impl ErrorTally {
    /// Reset-or-increment rule: a failure more than `idle_window` after
    /// the previous one starts a new streak at 1. Returns the new count.
    pub fn record(&mut self, now: Instant, idle_window: Duration) -> u32 {
        match self.last_failure {
            Some(prev) if now.duration_since(prev) <= idle_window => self.count += 1,
            _ => self.count = 1,
        }
        self.last_failure = Some(now);
        self.count
    }

    pub fn trip(&mut self, now: Instant, cooldown: Duration) {
        self.count = 0;
        self.cooldown_until = Some(now + cooldown);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }
}

pub type SharedTally = Arc<Mutex<ErrorTally>>;

/// Wraps fallible per-key operations with the retry/breaker policy.
///
/// Exhaustion is terminal for the key, not for the run: the key goes to
/// the failed-keys file and the caller gets `None`.
pub struct RetryGovernor {
    policy: RetryPolicy,
    tally: SharedTally,
    failed_keys: Arc<FailedKeys>,
}

impl RetryGovernor {
    pub fn new(policy: RetryPolicy, failed_keys: Arc<FailedKeys>) -> Self {
        Self {
            policy,
            tally: Arc::new(Mutex::new(ErrorTally::default())),
            failed_keys,
        }
    }

    pub fn tally(&self) -> SharedTally {
        Arc::clone(&self.tally)
    }

    pub async fn run<T, F, Fut>(
        &self,
        lane: usize,
        key: &str,
        op_name: &str,
        mut operation: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        for attempt in 1..=self.policy.max_attempts {
            self.pause_if_cooling(lane).await;

            match operation().await {
                Ok(value) => return Some(value),
                Err(e) => {
                    error!(
                        "Lane {} | {} failed (attempt {}/{}): {:#}",
                        lane, op_name, attempt, self.policy.max_attempts, e
                    );

                    let tripped = {
                        let mut tally = self.tally.lock().await;
                        let now = Instant::now();
                        let count = tally.record(now, self.policy.idle_window);
                        if count >= self.policy.tally_threshold {
                            tally.trip(now, self.policy.cooldown);
                            true
                        } else {
                            false
                        }
                    };

                    if tripped {
                        warn!(
                            "Lane {} | {} consecutive failures across all lanes. Global pause for {:?}.",
                            lane, self.policy.tally_threshold, self.policy.cooldown
                        );
                    }

                    if attempt < self.policy.max_attempts {
                        sleep(self.policy.attempt_pause).await;
                    }
                }
            }
        }

        match self.failed_keys.append(key) {
            Ok(()) => info!(
                "Lane {} | key ...{} recorded to the failed-keys file",
                lane,
                key_suffix(key)
            ),
            Err(e) => error!("Lane {} | could not record failed key: {:#}", lane, e),
        }
        None
    }

    /// Every lane passes through here before each attempt, so a tripped
    /// breaker is observed uniformly.
    async fn pause_if_cooling(&self, lane: usize) {
        let remaining = {
            let tally = self.tally.lock().await;
            tally.cooldown_remaining(Instant::now())
        };
        if let Some(remaining) = remaining {
            warn!(
                "Lane {} | circuit breaker open, waiting {:.0?} before next attempt",
                lane, remaining
            );
            sleep(remaining).await;
        }
    }
}
