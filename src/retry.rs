//! Retry strategies and predicates.
//!
//! A [`RetryStrategy`] decides how long to back off before a given retry
//! attempt and when the budget is spent; a [`RetryPredicate`] decides whether
//! an error is worth retrying at all. The first attempt of a call never
//! consults either — only failures do.

use crate::Error;
use rand::Rng;
use std::time::Duration;

/// Default backoff base for [`RetryStrategy::standard`].
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
/// Default backoff cap for [`RetryStrategy::standard`].
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(20);
/// Default retry budget (attempts beyond the first) for
/// [`RetryStrategy::standard`].
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Defines when and how long to wait between attempts.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Do not retry failed calls.
    None,

    /// Exponentially increasing delays: `min(max_delay, base * 2^(attempt-1))`,
    /// scaled by a random factor in `0.5..=1.0` when `jitter` is on.
    ExponentialBackoff {
        /// Base delay before the first retry.
        base: Duration,
        /// Cap on the computed delay.
        max_delay: Duration,
        /// Retry budget: attempts allowed beyond the first.
        max_retries: usize,
        /// Whether to randomize delays (recommended; prevents thundering herd).
        jitter: bool,
    },

    /// A fixed delay between attempts.
    Linear {
        /// The delay before every retry.
        delay: Duration,
        /// Retry budget: attempts allowed beyond the first.
        max_retries: usize,
    },

    /// Custom policy: maps a retry attempt number (1-indexed) to a delay, or
    /// `None` to stop retrying.
    Custom {
        /// The delay function.
        delay_fn: fn(attempt: usize) -> Option<Duration>,
    },
}

impl RetryStrategy {
    /// The default policy: exponential backoff with jitter, 100ms base,
    /// 20s cap, 3 retries.
    pub fn standard() -> Self {
        RetryStrategy::ExponentialBackoff {
            base: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            jitter: true,
        }
    }

    /// Returns the delay before retry number `attempt` (1-indexed), or `None`
    /// once the budget is spent.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                base,
                max_delay,
                max_retries,
                jitter,
            } => {
                if attempt > *max_retries {
                    return None;
                }

                let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1) as u32);
                let computed = base.saturating_mul(multiplier.try_into().unwrap_or(u32::MAX));
                let delay = computed.min(*max_delay);

                if *jitter {
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(factor))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Linear { delay, max_retries } => {
                if attempt > *max_retries {
                    None
                } else {
                    Some(*delay)
                }
            }
            RetryStrategy::Custom { delay_fn } => delay_fn(attempt),
        }
    }

    /// The retry budget, when the strategy has a fixed one.
    pub fn max_retries(&self) -> Option<usize> {
        match self {
            RetryStrategy::None => Some(0),
            RetryStrategy::ExponentialBackoff { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Linear { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Custom { .. } => None,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::standard()
    }
}

/// Decides whether a failed attempt should be retried.
///
/// The attempt number passed in is 1-indexed and counts the attempt that just
/// failed.
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the call should be retried after this error.
    fn should_retry(&self, error: &Error, attempt: usize) -> bool;
}

/// Retries every error classified as retryable: transport failures,
/// 5xx responses, and throttling. The default predicate.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        error.is_retryable()
    }
}

/// Retries only throttling errors; transport and server errors fail fast.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnThrottling;

impl RetryPredicate for RetryOnThrottling {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        matches!(error, Error::Throttling { .. })
    }
}
