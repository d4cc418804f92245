//! Error taxonomy for signed service calls.
//!
//! Every expected failure mode — transport trouble, throttling, server errors,
//! rejected input, signing problems — is represented as a value of [`Error`] and
//! delivered inside an [`Outcome`](crate::Outcome). Nothing here panics; only
//! construction-time contract violations surface before a call starts.

use crate::throttle::ThrottleHint;
use crate::transport::TransportError;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// Error codes the service may use to signal throttling on a 4xx status.
///
/// Matched against the code extracted from the `x-amzn-errortype` header or the
/// error body.
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "SlowDown",
    "LimitExceededException",
];

/// Broad classification of an [`Error`], mirroring the service error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected as invalid (4xx other than auth/throttling).
    Validation,
    /// Signing or credential failure, or an HTTP 401/403.
    Auth,
    /// The service asked us to slow down (429 or a throttling error code).
    Throttling,
    /// The service failed internally (5xx).
    Server,
    /// Connection-level failure before a response was received.
    Transport,
    /// An async submission was rejected because the dispatch queue was full.
    QueueFull,
    /// The call was dropped before it started executing.
    Canceled,
    /// Anything that does not fit the categories above.
    Unknown,
}

/// The error type for signed service calls.
///
/// Errors carry enough context to debug a failure in production: the HTTP
/// status, the service's error code when one was sent, and the raw response
/// body. [`Error::is_retryable`] drives the executor's retry loop.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A connection-level failure: timeout, reset, DNS, etc.
    ///
    /// These occur before (or instead of) an HTTP response and are retryable.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credentials were missing or malformed, signing failed, or the service
    /// returned 401/403. Never retried.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The service signalled throttling (HTTP 429 or a throttling error code).
    ///
    /// Retryable; when the response carried a `Retry-After` style hint it is
    /// preserved so the executor can honor the server's requested wait.
    #[error("Throttled by service (status {status}): {raw_response}")]
    Throttling {
        /// The HTTP status code (429, or a 4xx with a throttling code).
        status: StatusCode,
        /// The service error code, when one could be extracted.
        code: Option<String>,
        /// The raw response body.
        raw_response: String,
        /// Server-provided wait hint parsed from the response headers.
        hint: Option<ThrottleHint>,
    },

    /// The service failed internally (5xx). Retryable.
    #[error("Server error {status}: {raw_response}")]
    Server {
        /// The HTTP status code.
        status: StatusCode,
        /// The service error code, when one could be extracted.
        code: Option<String>,
        /// The raw response body.
        raw_response: String,
    },

    /// The request was rejected as invalid (4xx other than auth/throttling).
    /// Never retried.
    #[error("Validation error {status}: {raw_response}")]
    Validation {
        /// The HTTP status code.
        status: StatusCode,
        /// The service error code, when one could be extracted.
        code: Option<String>,
        /// The raw response body.
        raw_response: String,
    },

    /// A 2xx response body could not be parsed into the expected result type.
    #[error("Failed to parse response (status {status}): {message}")]
    ResponseParse {
        /// The raw response body that failed to parse.
        raw_response: String,
        /// The parser's error message.
        message: String,
        /// The HTTP status code of the response.
        status: StatusCode,
    },

    /// The request payload could not be serialized.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// Invalid client or request configuration (bad endpoint, bad header,
    /// zero-width pool, ...). Reported at construction, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An async submission was rejected because the dispatch queue was full.
    ///
    /// Only produced under [`QueuePolicy::Reject`](crate::dispatch::QueuePolicy).
    #[error("Dispatch queue is full")]
    QueueFull,

    /// The call was dropped before execution (dispatcher shut down while the
    /// job was still queued, or the handle's producer went away).
    #[error("Call was canceled before execution")]
    Canceled,

    /// The retry budget was spent without a successful attempt.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Total attempts made, including the first.
        attempts: usize,
        /// The error from the final attempt.
        last_error: Box<Error>,
    },

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns the broad classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Throttling { .. } => ErrorKind::Throttling,
            Error::Server { .. } => ErrorKind::Server,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::QueueFull => ErrorKind::QueueFull,
            Error::Canceled => ErrorKind::Canceled,
            Error::RetriesExhausted { last_error, .. } => last_error.kind(),
            _ => ErrorKind::Unknown,
        }
    }

    /// Returns `true` if this error is worth retrying.
    ///
    /// Transport errors, 5xx responses, and throttling are retryable. Auth,
    /// validation, and parse failures are not — repeating the same request
    /// would produce the same rejection.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            Error::Throttling { .. } => true,
            Error::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns the HTTP status code if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Throttling { status, .. }
            | Error::Server { status, .. }
            | Error::Validation { status, .. }
            | Error::ResponseParse { status, .. } => Some(*status),
            Error::RetriesExhausted { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// Returns the service error code if one was extracted from the response.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Throttling { code, .. }
            | Error::Server { code, .. }
            | Error::Validation { code, .. } => code.as_deref(),
            Error::RetriesExhausted { last_error, .. } => last_error.code(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error carries one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Throttling { raw_response, .. }
            | Error::Server { raw_response, .. }
            | Error::Validation { raw_response, .. }
            | Error::ResponseParse { raw_response, .. } => Some(raw_response),
            Error::RetriesExhausted { last_error, .. } => last_error.raw_response(),
            _ => None,
        }
    }

    /// Returns the server-provided wait before retrying, capped by `max_wait`.
    ///
    /// Only throttling errors carry such a hint.
    pub fn throttle_delay(&self, max_wait: Duration) -> Option<Duration> {
        match self {
            Error::Throttling { hint, .. } => hint.as_ref()?.delay(max_wait),
            _ => None,
        }
    }
}

/// Classifies a non-2xx response into an [`Error`].
///
/// Classification rules:
/// - 429, or any 4xx whose error code is a known throttling code, is
///   [`Error::Throttling`] (retryable);
/// - 401/403 is [`Error::Auth`];
/// - any other 4xx is [`Error::Validation`];
/// - everything else is [`Error::Server`] (retryable).
pub(crate) fn classify_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Error {
    let code = extract_error_code(headers, body);
    let raw_response = String::from_utf8_lossy(body).into_owned();
    let is_throttle_code = code
        .as_deref()
        .map(|c| THROTTLING_CODES.contains(&c))
        .unwrap_or(false);

    if status.as_u16() == 429 || (status.is_client_error() && is_throttle_code) {
        return Error::Throttling {
            status,
            code,
            raw_response,
            hint: ThrottleHint::from_headers(headers),
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::Auth(format!("service returned {status}: {raw_response}"));
    }

    if status.is_client_error() {
        return Error::Validation {
            status,
            code,
            raw_response,
        };
    }

    Error::Server {
        status,
        code,
        raw_response,
    }
}

/// Extracts the service error code from a response.
///
/// Checks the `x-amzn-errortype` header first, then a JSON body's `__type` or
/// `code` field, then an XML body's `<Code>` element. Namespace prefixes
/// (`namespace#Code`) and header suffixes (`Code:extra`) are stripped.
fn extract_error_code(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    if let Some(value) = headers.get("x-amzn-errortype") {
        if let Ok(raw) = value.to_str() {
            return Some(trim_error_code(raw));
        }
    }

    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        for field in ["__type", "code", "Code"] {
            if let Some(raw) = json.get(field).and_then(|v| v.as_str()) {
                return Some(trim_error_code(raw));
            }
        }
    }

    // XML error bodies carry <Code>...</Code>.
    let text = std::str::from_utf8(body).ok()?;
    let start = text.find("<Code>")? + "<Code>".len();
    let end = text[start..].find("</Code>")? + start;
    Some(trim_error_code(&text[start..end]))
}

fn trim_error_code(raw: &str) -> String {
    let raw = raw.split(':').next().unwrap_or(raw);
    let raw = raw.rsplit('#').next().unwrap_or(raw);
    raw.trim().to_string()
}

/// A specialized `Result` type for signed service calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_server_error_is_retryable() {
        let err = classify_response(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new(), b"boom");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.raw_response(), Some("boom"));
    }

    #[test]
    fn test_plain_400_is_validation() {
        let err = classify_response(StatusCode::BAD_REQUEST, &HeaderMap::new(), b"bad input");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_429_is_throttling() {
        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), b"");
        assert_eq!(err.kind(), ErrorKind::Throttling);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_400_with_throttling_code_is_throttling() {
        let body = br#"{"__type":"com.amazonaws#ThrottlingException","message":"slow down"}"#;
        let err = classify_response(StatusCode::BAD_REQUEST, &HeaderMap::new(), body);
        assert_eq!(err.kind(), ErrorKind::Throttling);
        assert_eq!(err.code(), Some("ThrottlingException"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_code_from_header_with_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-amzn-errortype",
            HeaderValue::from_static("Throttling:http://internal.amazon.com/coral/"),
        );
        let err = classify_response(StatusCode::BAD_REQUEST, &headers, b"{}");
        assert_eq!(err.code(), Some("Throttling"));
        assert_eq!(err.kind(), ErrorKind::Throttling);
    }

    #[test]
    fn test_error_code_from_xml_body() {
        let body = b"<ErrorResponse><Error><Code>MalformedInput</Code></Error></ErrorResponse>";
        let err = classify_response(StatusCode::BAD_REQUEST, &HeaderMap::new(), body);
        assert_eq!(err.code(), Some("MalformedInput"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_403_is_auth() {
        let err = classify_response(StatusCode::FORBIDDEN, &HeaderMap::new(), b"denied");
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retries_exhausted_delegates_to_last_error() {
        let last = classify_response(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new(), b"down");
        let err = Error::RetriesExhausted {
            attempts: 4,
            last_error: Box::new(last),
        };
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_throttle_delay_only_on_throttling() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2"));
        let err = classify_response(StatusCode::TOO_MANY_REQUESTS, &headers, b"");
        assert_eq!(
            err.throttle_delay(Duration::from_secs(300)),
            Some(Duration::from_secs(2))
        );

        let err = classify_response(StatusCode::INTERNAL_SERVER_ERROR, &headers, b"");
        assert_eq!(err.throttle_delay(Duration::from_secs(300)), None);
    }
}
