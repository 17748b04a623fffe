// Request pacing: fixed randomized delays and the sleep seam

use indicatif::{ProgressBar, ProgressStyle};
use instagrab_extractor::FailureKind;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Why the run is sleeping. Shown to the operator and recorded in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    Startup,
    PreCollection,
    Backoff { attempt: u32 },
    ItemPacing,
    LongBreak,
    ItemCooldown,
    ItemError,
}

impl fmt::Display for SleepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepReason::Startup => write!(f, "Waiting before starting"),
            SleepReason::PreCollection => write!(f, "Waiting before fetching posts"),
            SleepReason::Backoff { attempt } => {
                write!(f, "Rate limited on attempt {}, backing off", attempt)
            }
            SleepReason::ItemPacing => write!(f, "Pausing between posts"),
            SleepReason::LongBreak => write!(f, "Taking a longer break"),
            SleepReason::ItemCooldown => write!(f, "Rate limited on a post, cooling down"),
            SleepReason::ItemError => write!(f, "Pausing after an error"),
        }
    }
}

/// Blocking-style wait used by the fetch and collection loops.
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration, reason: SleepReason);
}

impl<S: Sleeper> Sleeper for &S {
    async fn sleep(&self, duration: Duration, reason: SleepReason) {
        (**self).sleep(duration, reason).await
    }
}

/// Sleeps on the tokio timer, optionally behind a spinner.
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper {
    show_progress: bool,
}

impl TokioSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration, reason: SleepReason) {
        if duration.is_zero() {
            return;
        }
        info!("{}: {:.1}s", reason, duration.as_secs_f64());

        if !self.show_progress {
            tokio::time::sleep(duration).await;
            return;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("{} ({}s)", reason, duration.as_secs()));
        spinner.enable_steady_tick(Duration::from_millis(100));
        tokio::time::sleep(duration).await;
        spinner.finish_and_clear();
    }
}

/// Records every requested sleep instead of waiting.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<(Duration, SleepReason)>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<(Duration, SleepReason)> {
        self.sleeps
            .lock()
            .map(|sleeps| sleeps.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, matches: impl Fn(&SleepReason) -> bool) -> usize {
        self.sleeps().iter().filter(|(_, reason)| matches(reason)).count()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, reason: SleepReason) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push((duration, reason));
        }
    }
}

/// Closed range of delays, sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange::fixed(Duration::ZERO);

    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub const fn secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }

    pub const fn millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let millis = rand::random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Fixed pacing policy. Not adaptive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pacing {
    pub startup: DelayRange,
    pub pre_collection: DelayRange,
    pub per_item: DelayRange,
    pub long_break: DelayRange,
    /// Every Nth processed post also takes `long_break`.
    pub long_break_every: usize,
    pub item_cooldown: DelayRange,
    pub transport_pause: DelayRange,
    pub error_pause: DelayRange,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            startup: DelayRange::secs(5, 15),
            pre_collection: DelayRange::secs(10, 20),
            per_item: DelayRange::millis(2_000, 5_000),
            long_break: DelayRange::secs(10, 20),
            long_break_every: 5,
            item_cooldown: DelayRange::secs(120, 300),
            transport_pause: DelayRange::fixed(Duration::from_secs(30)),
            error_pause: DelayRange::fixed(Duration::from_secs(5)),
        }
    }
}

impl Pacing {
    /// No pacing delays at all. Backoff is configured separately.
    pub fn none() -> Self {
        Self {
            startup: DelayRange::ZERO,
            pre_collection: DelayRange::ZERO,
            per_item: DelayRange::ZERO,
            long_break: DelayRange::ZERO,
            long_break_every: 5,
            item_cooldown: DelayRange::ZERO,
            transport_pause: DelayRange::ZERO,
            error_pause: DelayRange::ZERO,
        }
    }

    /// Delay after the `processed`-th post (1-based).
    pub fn after_item(&self, processed: usize) -> (Duration, SleepReason) {
        let base = self.per_item.sample();
        if self.long_break_every > 0 && processed > 0 && processed % self.long_break_every == 0 {
            (base + self.long_break.sample(), SleepReason::LongBreak)
        } else {
            (base, SleepReason::ItemPacing)
        }
    }

    /// Pause after a failed post, `None` for failures that end the run.
    pub fn after_failure(&self, kind: FailureKind) -> Option<(Duration, SleepReason)> {
        match kind {
            FailureKind::Authentication => None,
            FailureKind::RateLimit => Some((self.item_cooldown.sample(), SleepReason::ItemCooldown)),
            FailureKind::Transport => Some((self.transport_pause.sample(), SleepReason::ItemError)),
            FailureKind::MalformedRecord | FailureKind::Other => {
                Some((self.error_pause.sample(), SleepReason::ItemError))
            }
        }
    }
}
