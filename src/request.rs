//! The request and response-parsing seams of the executor.
//!
//! A request is anything that can name its operation, pick a method and path,
//! and serialize itself to bytes plus headers — there is no base-class
//! hierarchy. Concrete per-operation payloads are plain data types
//! implementing [`ServiceRequest`]. Symmetrically, [`ParseResponse`] turns the
//! raw bytes of a 2xx response into a typed result, keeping the wire format
//! (JSON, XML, whatever the operation uses) opaque to the executor.

use crate::transport::RawResponse;
use crate::{Error, Result};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// A logical service operation, ready to be serialized and dispatched.
///
/// Implementations must be deterministic: calling [`serialize_payload`]
/// twice on an unchanged value must produce byte-identical output, because
/// the executor re-sends the same bytes on every retry attempt.
///
/// [`serialize_payload`]: ServiceRequest::serialize_payload
pub trait ServiceRequest: Send + Sync {
    /// The operation identifier, used for logging and diagnostics.
    fn operation_name(&self) -> &'static str;

    /// The HTTP method for this operation.
    fn method(&self) -> Method;

    /// The URI path relative to the endpoint, e.g. `/v1/flows/{arn}/outputs`
    /// with parameters already substituted.
    fn uri_path(&self) -> String;

    /// Query string parameters.
    fn query_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Request-specific headers (content type, target headers, ...).
    fn headers(&self) -> Result<HeaderMap> {
        Ok(HeaderMap::new())
    }

    /// Serializes the payload to bytes. An empty vec means no body.
    fn serialize_payload(&self) -> Result<Vec<u8>>;
}

/// Parses the raw bytes of a successful (2xx) response into a typed result.
///
/// The executor never interprets response bodies itself; it hands the whole
/// [`RawResponse`] to a parser chosen by the caller.
pub trait ParseResponse: Send + Sync {
    /// The typed result of the operation.
    type Output;

    /// Parses the response. A failure here is terminal and non-retryable:
    /// the service accepted the request, we just could not read its answer.
    fn parse(&self, response: &RawResponse) -> Result<Self::Output>;
}

/// A [`ParseResponse`] for JSON bodies, deserializing into `T` with serde.
pub struct Json<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Json<T> {
    /// Creates a JSON parser for `T`.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ParseResponse for Json<T>
where
    T: DeserializeOwned + Send + Sync,
{
    type Output = T;

    fn parse(&self, response: &RawResponse) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| Error::ResponseParse {
            raw_response: String::from_utf8_lossy(&response.body).into_owned(),
            message: e.to_string(),
            status: response.status,
        })
    }
}

/// A [`ParseResponse`] that ignores the body entirely.
///
/// For operations whose success is fully conveyed by the status code
/// (deletes, 204 responses).
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreBody;

impl ParseResponse for IgnoreBody {
    type Output = ();

    fn parse(&self, _response: &RawResponse) -> Result<()> {
        Ok(())
    }
}
