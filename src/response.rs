//! Response wrapper preserving parsed data and raw transaction details.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful call outcome: the typed result plus transaction metadata.
///
/// Besides the parsed `data`, the wrapper keeps the raw body bytes, status,
/// headers, total latency across all attempts, and the attempt count — the
/// things you want in logs when a call behaves strangely in production.
///
/// # Examples
///
/// ```
/// # use sigcall::Response;
/// # use http::{HeaderMap, StatusCode};
/// # use std::time::Duration;
/// let response = Response::new(
///     42,
///     b"42".to_vec(),
///     StatusCode::OK,
///     HeaderMap::new(),
///     Duration::from_millis(100),
///     1,
/// );
/// assert_eq!(response.data, 42);
/// assert!(!response.was_retried());
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The parsed result.
    pub data: T,

    /// The raw response body.
    pub raw_body: Vec<u8>,

    /// The HTTP status code.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Total latency of the call, including backoff sleeps and retries.
    pub latency: Duration,

    /// Attempts made: `1` for a first-try success.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a `Response`; called by the executor after a successful parse.
    pub fn new(
        data: T,
        raw_body: Vec<u8>,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the result to a different type, preserving the metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Looks up a header value by name, as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(attempts: usize) -> Response<u32> {
        Response::new(
            7,
            b"7".to_vec(),
            StatusCode::OK,
            HeaderMap::new(),
            Duration::from_millis(10),
            attempts,
        )
    }

    #[test]
    fn test_map_preserves_metadata() {
        let mapped = response(3).map(|n| n.to_string());
        assert_eq!(mapped.data, "7");
        assert_eq!(mapped.attempts, 3);
        assert!(mapped.was_retried());
    }

    #[test]
    fn test_deref_reaches_data() {
        let r = response(1);
        assert_eq!(*r, 7);
    }
}
