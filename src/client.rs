//! The request executor.
//!
//! [`Client`] runs one logical call through its full lifecycle: serialize the
//! request, resolve the URI, fetch credentials, sign, send over the transport,
//! classify the result, and loop through backoff-paced retries until success,
//! a non-retryable failure, or an exhausted budget. Every attempt is re-signed
//! with a fresh timestamp because signatures are time-sensitive.
//!
//! A client is cheap to clone and safe to share: configuration, the signer
//! inputs, and the transport pool live behind one `Arc` and are reused by
//! every call.

use crate::{
    credentials::{EnvCredentials, ProvideCredentials},
    endpoint::{self, Scheme},
    error::classify_response,
    request::{Json, ParseResponse, ServiceRequest},
    retry::{RetryOnRetryable, RetryPredicate, RetryStrategy},
    signer::{self, SigningParams},
    throttle::ThrottleConfig,
    transport::{HttpTransport, SignedRequest, Transport},
    Credentials, Error, Outcome, Response, Result, StaticCredentials,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use url::Url;

/// A client for executing signed service calls with retries.
///
/// # Examples
///
/// ```no_run
/// use sigcall::{Client, Credentials, RetryStrategy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), sigcall::Error> {
/// let client = Client::builder()
///     .service("mediaconnect")
///     .region("us-west-2")
///     .credentials(Credentials::new("AKID", "secret"))
///     .retry_strategy(RetryStrategy::ExponentialBackoff {
///         base: Duration::from_millis(100),
///         max_delay: Duration::from_secs(20),
///         max_retries: 3,
///         jitter: true,
///     })
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn ProvideCredentials>,
    endpoint: Url,
    service: String,
    region: String,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_predicate: Box<dyn RetryPredicate>,
    throttle: ThrottleConfig,
    time_source: fn() -> SystemTime,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint)
            .field("service", &self.inner.service)
            .field("region", &self.inner.region)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Executes one logical call to a terminal outcome.
    ///
    /// Runs on the caller's task; suspends only for I/O and backoff sleeps.
    /// Expected failures (throttling, server errors, transport trouble) are
    /// retried within the configured budget and, if they persist, returned
    /// inside the `Outcome` — this method never panics for them.
    pub async fn call<R, P>(&self, request: &R, parser: &P) -> Outcome<P::Output>
    where
        R: ServiceRequest + ?Sized,
        P: ParseResponse,
    {
        let start = Instant::now();

        // Building: one serialization, reused verbatim by every attempt.
        let payload = request.serialize_payload()?;
        let url = self.resolve_url(request)?;
        let headers = self.request_headers(request)?;

        let mut attempt = 0usize;

        loop {
            attempt += 1;

            match self
                .execute_attempt(request, &url, &headers, &payload, parser, attempt, start)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        operation = request.operation_name(),
                        "Attempt failed"
                    );

                    if !self.inner.retry_predicate.should_retry(&e, attempt) {
                        return Err(e);
                    }

                    let computed = match self.inner.retry_strategy.delay_for_attempt(attempt) {
                        Some(computed) => computed,
                        None => {
                            return Err(Error::RetriesExhausted {
                                attempts: attempt,
                                last_error: Box::new(e),
                            })
                        }
                    };

                    // A throttling response may carry the server's own wait
                    // request; within the budget, that wins over our curve.
                    let delay = if self.inner.throttle.enabled {
                        e.throttle_delay(self.inner.throttle.max_wait)
                            .unwrap_or(computed)
                    } else {
                        computed
                    };

                    tracing::info!(
                        delay_ms = delay.as_millis(),
                        attempt = attempt,
                        operation = request.operation_name(),
                        "Retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Convenience for JSON-bodied operations: parses the 2xx body into `T`.
    pub async fn call_json<R, T>(&self, request: &R) -> Outcome<T>
    where
        R: ServiceRequest + ?Sized,
        T: DeserializeOwned + Send + Sync,
    {
        self.call(request, &Json::<T>::new()).await
    }

    /// One signed attempt: sign, send, classify.
    #[allow(clippy::too_many_arguments)]
    async fn execute_attempt<R, P>(
        &self,
        request: &R,
        url: &Url,
        headers: &HeaderMap,
        payload: &[u8],
        parser: &P,
        attempt: usize,
        start: Instant,
    ) -> Outcome<P::Output>
    where
        R: ServiceRequest + ?Sized,
        P: ParseResponse,
    {
        // Signing: credential failures are terminal, the predicate never
        // retries them.
        let credentials = self.inner.credentials.provide_credentials()?;
        let mut signed = SignedRequest {
            method: request.method(),
            url: url.clone(),
            headers: headers.clone(),
            body: payload.to_vec(),
        };
        signer::sign(
            &mut signed,
            &SigningParams {
                credentials: &credentials,
                service: &self.inner.service,
                region: &self.inner.region,
                time: (self.inner.time_source)(),
            },
        )?;

        tracing::debug!(
            method = %signed.method,
            url = %signed.url,
            attempt = attempt,
            operation = request.operation_name(),
            "Sending signed request"
        );

        let raw = self.inner.transport.execute(signed).await.map_err(Error::from)?;
        let latency = start.elapsed();

        tracing::info!(
            status = raw.status.as_u16(),
            latency_ms = latency.as_millis(),
            attempt = attempt,
            operation = request.operation_name(),
            "Received response"
        );

        if raw.status.is_success() {
            let data = parser.parse(&raw)?;
            return Ok(Response::new(
                data, raw.body, raw.status, raw.headers, latency, attempt,
            ));
        }

        let error = classify_response(raw.status, &raw.headers, &raw.body);
        if !error.is_retryable() {
            tracing::error!(
                status = raw.status.as_u16(),
                operation = request.operation_name(),
                "Terminal service error"
            );
        }
        Err(error)
    }

    /// Resolves the full URL: endpoint + operation path + query parameters.
    fn resolve_url<R>(&self, request: &R) -> Result<Url>
    where
        R: ServiceRequest + ?Sized,
    {
        let mut url = self.inner.endpoint.clone();
        // An endpoint override may carry a path prefix; the operation path is
        // appended to it, not substituted for it.
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}{}", prefix, request.uri_path()));
        for (key, value) in request.query_params() {
            url.query_pairs_mut().append_pair(&key, &value);
        }
        Ok(url)
    }

    /// Default headers overlaid with the request's own.
    fn request_headers<R>(&self, request: &R) -> Result<HeaderMap>
    where
        R: ServiceRequest + ?Sized,
    {
        let mut headers = self.inner.default_headers.clone();
        for (name, value) in request.headers()?.iter() {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// The signing service name.
    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// The signing region.
    pub fn region(&self) -> &str {
        &self.inner.region
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    service: Option<String>,
    region: Option<String>,
    scheme: Scheme,
    endpoint_override: Option<String>,
    credentials: Option<Arc<dyn ProvideCredentials>>,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
    throttle: ThrottleConfig,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    time_source: fn() -> SystemTime,
}

impl ClientBuilder {
    /// Creates a builder with default settings: HTTPS, standard retry
    /// strategy, throttle hints honored, environment credentials.
    pub fn new() -> Self {
        Self {
            service: None,
            region: None,
            scheme: Scheme::default(),
            endpoint_override: None,
            credentials: None,
            default_headers: HeaderMap::new(),
            retry_strategy: RetryStrategy::standard(),
            retry_predicate: None,
            throttle: ThrottleConfig::default(),
            connect_timeout: None,
            timeout: None,
            transport: None,
            time_source: SystemTime::now,
        }
    }

    /// Sets the service name used for signing and endpoint computation.
    /// Required.
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the signing region. Required.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the scheme for computed endpoints (and scheme-less overrides).
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Replaces the computed regional endpoint. A bare `host[:port]` inherits
    /// the configured scheme.
    pub fn endpoint_override(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    /// Uses fixed credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(Arc::new(StaticCredentials::new(credentials)));
        self
    }

    /// Uses a custom credentials provider.
    pub fn credentials_provider(mut self, provider: impl ProvideCredentials + 'static) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the retry strategy.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Sets a custom retry predicate. Defaults to retrying everything
    /// [`Error::is_retryable`] reports as retryable.
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Configures how server throttle hints are honored.
    pub fn throttle_config(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the connection-establishment timeout of the default transport.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the per-attempt response timeout of the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the transport entirely (tests, custom pooling).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the signing clock; signatures become deterministic under a
    /// fixed time source.
    pub fn time_source(mut self, time_source: fn() -> SystemTime) -> Self {
        self.time_source = time_source;
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the service name is missing, or
    /// when neither a region nor an endpoint override is available to resolve
    /// an endpoint.
    pub fn build(self) -> Result<Client> {
        let service = self
            .service
            .ok_or_else(|| Error::Configuration("Service name is required".to_string()))?;
        let region = self
            .region
            .ok_or_else(|| Error::Configuration("Region is required".to_string()))?;

        let endpoint = match &self.endpoint_override {
            Some(raw) => endpoint::normalize_override(self.scheme, raw)?,
            None => endpoint::for_region(self.scheme, &service, &region)?,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.connect_timeout, self.timeout)?),
        };

        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(EnvCredentials));

        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(RetryOnRetryable));

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                credentials,
                endpoint,
                service,
                region,
                default_headers: self.default_headers,
                retry_strategy: self.retry_strategy,
                retry_predicate,
                throttle: self.throttle,
                time_source: self.time_source,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
