// Rate-limited fetching with exponential backoff

use crate::pacing::{SleepReason, Sleeper};
use instagrab_extractor::{Classified, FailureKind};
use std::fmt::Display;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Called before every backoff sleep with the attempt that failed.
pub type BackoffCallback = Arc<dyn Fn(&FetchAttempt) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Jitter in whole seconds added to every wait.
    pub jitter_secs: RangeInclusive<u64>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
            jitter_secs: 30..=90,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter_secs: RangeInclusive<u64>) -> Self {
        self.jitter_secs = jitter_secs;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the failed `attempt` (1-based), before the next one.
    pub fn wait_for(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).saturating_add(jitter)
    }

    pub fn sample_jitter(&self) -> Duration {
        let (min, max) = (*self.jitter_secs.start(), *self.jitter_secs.end());
        if max <= min {
            return Duration::from_secs(min);
        }
        Duration::from_secs(rand::random_range(min..=max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Rate limited; retried unless it was the last attempt.
    TransientFailure,
    FatalFailure,
}

/// One attempt of a fetch. `wait` is the sleep that followed it, zero when
/// none did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
    pub number: u32,
    pub wait: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Ready(T),
    /// Every attempt was rate limited.
    Unavailable,
}

impl<T> Fetched<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Fetched::Ready(value) => Some(value),
            Fetched::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Fetched::Unavailable)
    }
}

pub struct RateLimitedFetcher<S> {
    policy: BackoffPolicy,
    sleeper: S,
    callback: Option<BackoffCallback>,
    attempts: Vec<FetchAttempt>,
}

impl<S: Sleeper> RateLimitedFetcher<S> {
    pub fn new(policy: BackoffPolicy, sleeper: S) -> Self {
        Self {
            policy,
            sleeper,
            callback: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: BackoffCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Attempts made by the most recent [`fetch`](Self::fetch).
    pub fn attempts(&self) -> &[FetchAttempt] {
        &self.attempts
    }

    pub fn rate_limited_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::TransientFailure)
            .count()
    }

    /// Run `operation` until it succeeds, fails for a reason other than rate
    /// limiting, or runs out of attempts. The operation receives the 1-based
    /// attempt number. Rate-limit failures wait `base * 2^(attempt-1) + jitter`
    /// first; when every attempt was throttled the result is
    /// [`Fetched::Unavailable`] rather than an error.
    pub async fn fetch<T, E, F, Fut>(&mut self, mut operation: F) -> Result<Fetched<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classified + Display,
    {
        self.attempts.clear();
        let max_attempts = self.policy.attempts();
        let mut previous_wait = Duration::ZERO;

        for number in 1..=max_attempts {
            debug!("Fetch attempt {}/{}", number, max_attempts);

            let error = match operation(number).await {
                Ok(value) => {
                    self.record(number, Duration::ZERO, AttemptOutcome::Success);
                    if number > 1 {
                        info!("Fetch succeeded on attempt {}", number);
                    }
                    return Ok(Fetched::Ready(value));
                }
                Err(error) => error,
            };

            if error.failure_kind() != FailureKind::RateLimit {
                self.record(number, Duration::ZERO, AttemptOutcome::FatalFailure);
                warn!("Attempt {} failed ({}): {}", number, error.failure_kind(), error);
                return Err(error);
            }

            if number == max_attempts {
                self.record(number, Duration::ZERO, AttemptOutcome::TransientFailure);
                warn!(
                    "Rate limited on attempt {}: {}. Reached maximum of {} attempts",
                    number, error, max_attempts
                );
                break;
            }

            // Exponential growth normally dominates the jitter; never let a
            // small draw shrink the wait below the previous one.
            let wait = self
                .policy
                .wait_for(number, self.policy.sample_jitter())
                .max(previous_wait);
            previous_wait = wait;

            let attempt = self.record(number, wait, AttemptOutcome::TransientFailure);
            warn!(
                "Rate limited on attempt {}: {}. Waiting {}s before attempt {}",
                number,
                error,
                wait.as_secs(),
                number + 1
            );
            if let Some(ref callback) = self.callback {
                callback(&attempt);
            }
            self.sleeper
                .sleep(wait, SleepReason::Backoff { attempt: number })
                .await;
        }

        Ok(Fetched::Unavailable)
    }

    fn record(&mut self, number: u32, wait: Duration, outcome: AttemptOutcome) -> FetchAttempt {
        let attempt = FetchAttempt {
            number,
            wait,
            outcome,
        };
        self.attempts.push(attempt);
        attempt
    }
}
