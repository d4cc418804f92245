//! # sigcall - a signed-request execution core
//!
//! `sigcall` is the shared runtime a generated service SDK sits on: it signs
//! requests (SigV4 style), executes them over a pooled HTTP transport, retries
//! transient failures with capped exponential backoff, classifies errors, and
//! dispatches asynchronous calls through a bounded worker pool.
//!
//! Generated per-operation request/result types stay out of this crate; a
//! request is anything implementing [`ServiceRequest`] (a name, a method, a
//! path, bytes, headers) and a result is whatever a [`ParseResponse`]
//! implementation makes of the raw response. The executor only moves bytes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sigcall::{Client, Credentials, RetryStrategy, ServiceRequest};
//! use http::Method;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! struct DescribeFlow {
//!     flow_arn: String,
//! }
//!
//! impl ServiceRequest for DescribeFlow {
//!     fn operation_name(&self) -> &'static str {
//!         "DescribeFlow"
//!     }
//!     fn method(&self) -> Method {
//!         Method::GET
//!     }
//!     fn uri_path(&self) -> String {
//!         format!("/v1/flows/{}", self.flow_arn)
//!     }
//!     fn serialize_payload(&self) -> sigcall::Result<Vec<u8>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[derive(Deserialize)]
//! struct Flow {
//!     status: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sigcall::Error> {
//!     let client = Client::builder()
//!         .service("mediaconnect")
//!         .region("us-west-2")
//!         .credentials(Credentials::new("AKID", "secret"))
//!         .retry_strategy(RetryStrategy::ExponentialBackoff {
//!             base: Duration::from_millis(100),
//!             max_delay: Duration::from_secs(20),
//!             max_retries: 3,
//!             jitter: true,
//!         })
//!         .build()?;
//!
//!     let request = DescribeFlow {
//!         flow_arn: "arn:flow:1".to_string(),
//!     };
//!     let response = client.call_json::<_, Flow>(&request).await?;
//!     println!("flow is {} after {} attempt(s)", response.data.status, response.attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Outcomes, not exceptions
//!
//! Every expected failure — throttling, 5xx, connection trouble, rejected
//! input — ends up as an [`Error`] inside the returned [`Outcome`], already
//! classified and flagged retryable or not. Retryable failures are retried
//! internally up to the configured budget before surfacing. Only
//! configuration mistakes abort construction.
//!
//! ## Async dispatch
//!
//! ```no_run
//! # use sigcall::{Client, Credentials, Dispatcher, ServiceRequest, request::IgnoreBody};
//! # use http::Method;
//! # struct StopFlow;
//! # impl ServiceRequest for StopFlow {
//! #     fn operation_name(&self) -> &'static str { "StopFlow" }
//! #     fn method(&self) -> Method { Method::POST }
//! #     fn uri_path(&self) -> String { "/v1/flows/stop".to_string() }
//! #     fn serialize_payload(&self) -> sigcall::Result<Vec<u8>> { Ok(Vec::new()) }
//! # }
//! # async fn example(client: Client) -> Result<(), sigcall::Error> {
//! let dispatcher = Dispatcher::new(4)?;
//! let handle = dispatcher.submit(client, StopFlow, IgnoreBody).await?;
//! let outcome = handle.join().await?;
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! The pool is fixed-size and its queue is bounded; whether a full queue
//! blocks the submitter or rejects the submission is an explicit
//! [`QueuePolicy`] choice.

mod client;
pub mod credentials;
pub mod dispatch;
pub mod endpoint;
mod error;
pub mod request;
mod response;
pub mod retry;
pub mod signer;
pub mod throttle;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use credentials::{Credentials, EnvCredentials, ProvideCredentials, StaticCredentials};
pub use dispatch::{AsyncHandle, Dispatcher, QueuePolicy};
pub use endpoint::Scheme;
pub use error::{Error, ErrorKind, Result};
pub use request::{ParseResponse, ServiceRequest};
pub use response::Response;
pub use retry::{RetryPredicate, RetryStrategy};
pub use transport::{HttpTransport, RawResponse, SignedRequest, Transport};

/// The terminal result of one logical call: a typed [`Response`] or a
/// classified [`Error`]. Constructed exactly once per call and delivered to
/// exactly one consumer.
pub type Outcome<T> = Result<Response<T>>;
