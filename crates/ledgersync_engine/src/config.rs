//! Configuration for the sync engine.

use chrono::{DateTime, TimeZone, Utc};
use ledgersync_protocol::DEFAULT_MAX_RETRIES;
use std::time::Duration;

/// Default cache key of the durable queue.
pub const DEFAULT_QUEUE_KEY: &str = "ledgersync.queue";
/// Default cache key of the status record.
pub const DEFAULT_STATUS_KEY: &str = "ledgersync.status";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the background sync timer.
    pub sync_interval: Duration,
    /// Period of the background connectivity check used to detect reconnects.
    pub probe_interval: Duration,
    /// How long a completed operation stays visible before removal.
    pub completion_grace: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Cache key holding the serialized queue.
    pub queue_key: String,
    /// Cache key holding the `{ last_sync_at }` record.
    pub status_key: String,
    /// Whether `enqueue` fires a background pass when online.
    pub sync_on_enqueue: bool,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            probe_interval: Duration::from_secs(5),
            completion_grace: Duration::from_secs(2),
            retry: RetryConfig::default(),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
            status_key: DEFAULT_STATUS_KEY.to_string(),
            sync_on_enqueue: true,
        }
    }

    /// Sets the background sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the connectivity check interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the grace delay before completed operations are removed.
    pub fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets both cache keys.
    pub fn with_keys(mut self, queue_key: impl Into<String>, status_key: impl Into<String>) -> Self {
        self.queue_key = queue_key.into();
        self.status_key = status_key.into();
        self
    }

    /// Enables or disables the pass fired by `enqueue`.
    pub fn with_sync_on_enqueue(mut self, enabled: bool) -> Self {
        self.sync_on_enqueue = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Delay policy between attempts of one operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry on the very next pass.
    None,
    /// Exponential delay between attempts.
    Exponential {
        /// Delay after the first failure.
        initial: Duration,
        /// Upper bound for any delay.
        max: Duration,
        /// Growth factor per failure.
        multiplier: f64,
    },
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed attempts allowed before an operation is marked failed.
    pub max_retries: u32,
    /// Delay policy.
    pub backoff: Backoff,
}

impl RetryConfig {
    /// Creates a configuration retrying on the next pass.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::None,
        }
    }

    /// Uses exponential backoff starting at `initial`.
    pub fn with_exponential_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff = Backoff::Exponential {
            initial,
            max,
            multiplier: 2.0,
        };
        self
    }

    /// Sets the backoff policy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Calculates the delay after the `failures`-th failure.
    ///
    /// Multipliers below 1.0 (or NaN) are treated as 1.0, so delays never
    /// shrink between attempts. The result never exceeds `max`.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { .. } if failures == 0 => Duration::ZERO,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = i32::try_from(failures.saturating_sub(1)).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * multiplier.max(1.0).powi(exponent);
                Duration::try_from_secs_f64(secs)
                    .map_or(max, |delay| delay.min(max))
            }
        }
    }

    /// Earliest next attempt after the `failures`-th failure at `now`.
    ///
    /// Returns `None` when retries are immediate. Delays too large to
    /// represent are capped at the end of year 9999, the last instant that
    /// survives the RFC 3339 encoding of the persisted queue.
    pub fn next_attempt_at(&self, failures: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let delay = self.delay_for_attempt(failures);
        if delay.is_zero() {
            return None;
        }
        let latest = latest_attempt_at();
        let at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .map_or(latest, |at| at.min(latest));
        Some(at)
    }
}

fn latest_attempt_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_sync_interval(Duration::from_secs(60))
            .with_completion_grace(Duration::ZERO)
            .with_keys("q", "s")
            .with_sync_on_enqueue(false);

        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.completion_grace, Duration::ZERO);
        assert_eq!(config.queue_key, "q");
        assert_eq!(config.status_key, "s");
        assert!(!config.sync_on_enqueue);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn no_backoff_is_immediate() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(retry.next_attempt_at(2, Utc::now()), None);
    }

    #[test]
    fn exponential_delay_calculation() {
        let retry = RetryConfig::new(5)
            .with_exponential_backoff(Duration::from_millis(100), Duration::from_secs(30));

        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn exponential_delay_respects_max() {
        let retry = RetryConfig::new(10).with_backoff(Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
            multiplier: 10.0,
        });
        assert_eq!(retry.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn shrinking_multiplier_is_treated_as_constant() {
        for multiplier in [-2.0, 0.5, f64::NAN] {
            let retry = RetryConfig::new(5).with_backoff(Backoff::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(60),
                multiplier,
            });
            assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(1));
            assert_eq!(retry.delay_for_attempt(6), Duration::from_secs(1));
        }
    }

    #[test]
    fn unbounded_growth_is_capped_at_max() {
        let retry = RetryConfig::new(300).with_backoff(Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: f64::INFINITY,
        });
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(60));
        assert_eq!(retry.delay_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn huge_delay_still_defers_attempt() {
        let now = Utc::now();
        let retry = RetryConfig::new(300)
            .with_exponential_backoff(Duration::from_secs(1), Duration::from_secs(u64::MAX / 4));

        let at = retry.next_attempt_at(200, now).unwrap();
        assert!(at > now);
        assert_eq!(at, latest_attempt_at());
    }
}
