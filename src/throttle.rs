//! Server-provided throttle hints.
//!
//! Throttling responses often say how long to wait, via `Retry-After`
//! (delta-seconds or an HTTP date) or a reset-timestamp header. When present
//! and enabled, that wait takes precedence over the retry strategy's computed
//! backoff — the server knows its own limits better than our exponential
//! curve does.

use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wait hints parsed from a throttling response's headers.
#[derive(Debug, Clone)]
pub struct ThrottleHint {
    /// Explicit wait from the `Retry-After` header.
    pub retry_after: Option<Duration>,
    /// Absolute reset time from `x-ratelimit-reset` style headers.
    pub reset_at: Option<SystemTime>,
}

impl ThrottleHint {
    /// Extracts hints from response headers; `None` when the response carries
    /// no usable hint.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let retry_after = parse_retry_after(headers);
        let reset_at = parse_reset(headers);
        if retry_after.is_none() && reset_at.is_none() {
            return None;
        }
        Some(Self {
            retry_after,
            reset_at,
        })
    }

    /// The recommended wait, capped by `max_wait`.
    ///
    /// Prefers the explicit `Retry-After` value, falling back to the time
    /// remaining until `reset_at`.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }
        if let Some(reset_at) = self.reset_at {
            if let Ok(until_reset) = reset_at.duration_since(SystemTime::now()) {
                return Some(until_reset.min(max_wait));
            }
        }
        None
    }
}

/// Configuration for honoring throttle hints.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Whether server wait hints override the computed backoff.
    pub enabled: bool,
    /// Cap on any server-requested wait. Defaults to 5 minutes.
    pub max_wait: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl ThrottleConfig {
    /// A configuration that ignores server hints entirely; throttling errors
    /// then back off like any other retryable error.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Sets the cap on server-requested waits.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Parses `Retry-After`, accepting both delta-seconds and HTTP-date forms.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get("retry-after")?.to_str().ok()?;

    if let Ok(seconds) = header.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date_time) = httpdate::parse_http_date(header) {
        if let Ok(duration) = date_time.duration_since(SystemTime::now()) {
            return Some(duration);
        }
    }

    None
}

/// Parses `x-ratelimit-reset` / `ratelimit-reset` (Unix timestamps).
fn parse_reset(headers: &HeaderMap) -> Option<SystemTime> {
    for name in ["x-ratelimit-reset", "ratelimit-reset"] {
        if let Some(header) = headers.get(name) {
            if let Some(timestamp) = header.to_str().ok().and_then(|s| s.parse::<u64>().ok()) {
                return Some(UNIX_EPOCH + Duration::from_secs(timestamp));
            }
        }
    }
    None
}
