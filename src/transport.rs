//! HTTP transport: the seam between the executor and the wire.
//!
//! The executor hands a fully signed request to a [`Transport`] and gets back
//! either a [`RawResponse`] or a [`TransportError`]. The default implementation
//! is [`HttpTransport`], a thin wrapper over a pooled `reqwest` client; tests
//! swap in scripted transports through the same trait.

use crate::Result;
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// A request that has been serialized and signed, ready to send.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// The HTTP method.
    pub method: Method,
    /// The fully resolved URL (endpoint + path + query).
    pub url: Url,
    /// All headers, including the signature headers.
    pub headers: HeaderMap,
    /// The serialized payload.
    pub body: Vec<u8>,
}

/// The untyped response from one transport attempt.
///
/// The executor classifies this by status; parsing the body into a typed
/// result is the caller-supplied parser's job.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body.
    pub body: Vec<u8>,
}

/// What went wrong at the connection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// A connection could not be established in time.
    ConnectTimeout,
    /// The connection was established but the response did not arrive in time.
    ReadTimeout,
    /// The peer closed the connection mid-exchange.
    ConnectionReset,
    /// Host name resolution failed.
    Dns,
    /// Any other connection-level failure.
    Other,
}

/// A connection-level failure; no HTTP response was received.
///
/// All kinds are retryable by default: the failure happened before the
/// service could evaluate the request, so repeating it is safe.
#[derive(thiserror::Error, Debug)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    /// The failure category.
    pub kind: TransportErrorKind,
    /// Human-readable detail from the underlying client.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transport failures are retryable by default.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            if e.is_connect() {
                TransportErrorKind::ConnectTimeout
            } else {
                TransportErrorKind::ReadTimeout
            }
        } else {
            classify_source(&e).unwrap_or(if e.is_connect() {
                TransportErrorKind::ConnectTimeout
            } else {
                TransportErrorKind::Other
            })
        };
        TransportError::new(kind, e.to_string())
    }
}

/// Walks the error source chain looking for a classifiable cause: an
/// `io::Error` with a recognized kind, or the resolver-failure wrapper
/// (which has no public type to downcast to, only its `"dns error"` text).
fn classify_source(error: &(dyn std::error::Error + 'static)) -> Option<TransportErrorKind> {
    let mut source = error.source();
    while let Some(current) = source {
        if current.to_string().contains("dns error") {
            return Some(TransportErrorKind::Dns);
        }
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe => {
                    return Some(TransportErrorKind::ConnectionReset)
                }
                std::io::ErrorKind::TimedOut => return Some(TransportErrorKind::ReadTimeout),
                std::io::ErrorKind::ConnectionRefused => {
                    return Some(TransportErrorKind::ConnectTimeout)
                }
                _ => {}
            }
        }
        source = current.source();
    }
    None
}

/// Executes signed requests over the wire.
///
/// One transport instance is shared across all calls of a client; its
/// connection pool serializes acquisition internally. A connection is held
/// only for the duration of one attempt and returns to the pool on completion
/// or error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and collects the full response.
    ///
    /// Blocks the executing task until the response body is read or a
    /// connection-level timeout elapses.
    async fn execute(&self, request: SignedRequest) -> std::result::Result<RawResponse, TransportError>;
}

/// The default [`Transport`], backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport with a fresh connection pool.
    pub fn new(connect_timeout: Option<Duration>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        let http_client = builder.build().map_err(|e| {
            crate::Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Wraps an existing `reqwest::Client` (shared pool, custom TLS, ...).
    pub fn with_client(http_client: reqwest::Client, timeout: Option<Duration>) -> Self {
        Self {
            http_client,
            timeout,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: SignedRequest) -> std::result::Result<RawResponse, TransportError> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_retryable() {
        for kind in [
            TransportErrorKind::ConnectTimeout,
            TransportErrorKind::ReadTimeout,
            TransportErrorKind::ConnectionReset,
            TransportErrorKind::Dns,
            TransportErrorKind::Other,
        ] {
            assert!(TransportError::new(kind, "x").is_retryable());
        }
    }

    #[test]
    fn test_error_display_includes_kind() {
        let err = TransportError::new(TransportErrorKind::Dns, "lookup failed");
        let text = err.to_string();
        assert!(text.contains("Dns"));
        assert!(text.contains("lookup failed"));
    }

    /// One link of a synthetic error chain, standing in for the layers a
    /// client error wraps its causes in.
    #[derive(Debug)]
    struct Layer {
        message: &'static str,
        source: Option<Box<dyn std::error::Error + 'static>>,
    }

    impl std::fmt::Display for Layer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for Layer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.source.as_deref()
        }
    }

    fn chain(message: &'static str, cause: impl std::error::Error + 'static) -> Layer {
        Layer {
            message: "request failed",
            source: Some(Box::new(Layer {
                message,
                source: Some(Box::new(cause)),
            })),
        }
    }

    #[test]
    fn test_source_chain_classifies_connection_reset() {
        let top = chain(
            "connection closed",
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer"),
        );
        assert_eq!(
            classify_source(&top),
            Some(TransportErrorKind::ConnectionReset)
        );
    }

    #[test]
    fn test_source_chain_classifies_dns_failure() {
        let top = chain(
            "dns error",
            std::io::Error::new(
                std::io::ErrorKind::Other,
                "failed to lookup address information",
            ),
        );
        assert_eq!(classify_source(&top), Some(TransportErrorKind::Dns));
    }

    #[test]
    fn test_unrecognized_source_chain_is_unclassified() {
        let top = chain(
            "body error",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(classify_source(&top), None);
    }
}
