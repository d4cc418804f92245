//! Worker-pool async dispatch.
//!
//! A [`Dispatcher`] owns a fixed number of worker tasks pulling submitted
//! calls from one bounded FIFO queue. Each submission resolves exactly one
//! [`AsyncHandle`] (or invokes its callback) with the same `Outcome` the
//! synchronous [`Client::call`] would have produced. Independent calls have
//! no ordering guarantee relative to each other; the attempts inside one call
//! stay strictly sequential because the whole call runs on a single worker.

use crate::request::{ParseResponse, ServiceRequest};
use crate::{Client, Error, Outcome, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Default bound on the submission queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// What `submit` does when the queue is at capacity.
///
/// The queue is always bounded; the policy only chooses how the bound is
/// felt by submitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Wait until a slot frees up. The default.
    #[default]
    Block,
    /// Fail immediately with [`Error::QueueFull`].
    Reject,
}

/// A bounded worker pool executing submitted calls FIFO.
///
/// Construction spawns the workers on the current tokio runtime. Call
/// [`shutdown`](Dispatcher::shutdown) to stop: in-flight calls finish,
/// queued-but-not-started calls resolve their handles with
/// [`Error::Canceled`], and all workers are joined.
#[derive(Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    accepting: Arc<AtomicBool>,
    policy: QueuePolicy,
}

impl Dispatcher {
    /// Creates a pool of `pool_size` workers over a queue of
    /// [`DEFAULT_QUEUE_DEPTH`], blocking submitters when full.
    pub fn new(pool_size: usize) -> Result<Self> {
        Self::with_queue(pool_size, DEFAULT_QUEUE_DEPTH, QueuePolicy::default())
    }

    /// Creates a pool with an explicit queue depth and full-queue policy.
    pub fn with_queue(pool_size: usize, queue_depth: usize, policy: QueuePolicy) -> Result<Self> {
        if pool_size == 0 {
            return Err(Error::Configuration(
                "Dispatcher pool size must be at least 1".to_string(),
            ));
        }
        if queue_depth == 0 {
            return Err(Error::Configuration(
                "Dispatcher queue depth must be at least 1".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel::<Job>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));
        let accepting = Arc::new(AtomicBool::new(true));

        let workers = (0..pool_size)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let accepting = Arc::clone(&accepting);
                tokio::spawn(async move {
                    loop {
                        // Take the lock only to pull the next job; release it
                        // before executing so siblings keep draining the queue.
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };

                        // Jobs still queued at shutdown are dropped, which
                        // resolves their handles with `Canceled`.
                        if !accepting.load(Ordering::Acquire) {
                            drop(job);
                            continue;
                        }

                        tracing::debug!(worker = worker, "Executing dispatched call");
                        job.await;
                    }
                    tracing::debug!(worker = worker, "Worker exiting");
                })
            })
            .collect();

        Ok(Self {
            tx,
            workers,
            accepting,
            policy,
        })
    }

    /// Enqueues a call; the returned handle resolves once a worker has run it.
    ///
    /// Under [`QueuePolicy::Block`] this waits for queue capacity; under
    /// [`QueuePolicy::Reject`] a full queue fails with [`Error::QueueFull`].
    pub async fn submit<R, P>(
        &self,
        client: Client,
        request: R,
        parser: P,
    ) -> Result<AsyncHandle<P::Output>>
    where
        R: ServiceRequest + 'static,
        P: ParseResponse + 'static,
        P::Output: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = client.call(&request, &parser).await;
            // The consumer may have abandoned the handle; that only means
            // nobody is listening.
            let _ = result_tx.send(outcome);
        });

        self.enqueue(job).await?;
        Ok(AsyncHandle { rx: result_rx })
    }

    /// Enqueues a call and delivers the outcome to `callback` on the worker,
    /// instead of through a handle.
    pub async fn submit_with_callback<R, P, F>(
        &self,
        client: Client,
        request: R,
        parser: P,
        callback: F,
    ) -> Result<()>
    where
        R: ServiceRequest + 'static,
        P: ParseResponse + 'static,
        P::Output: Send + 'static,
        F: FnOnce(Outcome<P::Output>) + Send + 'static,
    {
        let job: Job = Box::pin(async move {
            let outcome = client.call(&request, &parser).await;
            callback(outcome);
        });
        self.enqueue(job).await
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        match self.policy {
            QueuePolicy::Block => self.tx.send(job).await.map_err(|_| Error::Canceled),
            QueuePolicy::Reject => self.tx.try_send(job).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::QueueFull,
                mpsc::error::TrySendError::Closed(_) => Error::Canceled,
            }),
        }
    }

    /// The configured full-queue policy.
    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Stops the pool: closes the queue, lets in-flight calls finish, cancels
    /// queued-but-not-started calls, and joins every worker.
    pub async fn shutdown(self) {
        self.accepting.store(false, Ordering::Release);
        drop(self.tx);
        for worker in self.workers {
            // A worker that panicked already tore its call down; nothing
            // useful left to do with the join error here.
            let _ = worker.await;
        }
    }
}

/// A single-consumer handle to a pending outcome.
///
/// Resolved exactly once by the worker that runs the call. Dropping (or
/// [`abandon`](AsyncHandle::abandon)-ing) the handle suppresses delivery but
/// does not interrupt the call's I/O.
#[derive(Debug)]
pub struct AsyncHandle<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> AsyncHandle<T> {
    /// Waits for the outcome, consuming the handle.
    ///
    /// Resolves with [`Error::Canceled`] if the call was dropped before
    /// execution (dispatcher shutdown).
    pub async fn join(self) -> Outcome<T> {
        self.rx.await.unwrap_or(Err(Error::Canceled))
    }

    /// Polls for the outcome without waiting: `None` while still pending.
    pub fn try_join(&mut self) -> Option<Outcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Canceled)),
        }
    }

    /// Explicitly gives up on the outcome. The call itself is unaffected.
    pub fn abandon(self) {
        drop(self.rx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::IgnoreBody;
    use crate::transport::{RawResponse, SignedRequest, Transport, TransportError};
    use crate::{Credentials, ErrorKind};
    use async_trait::async_trait;
    use http::{HeaderMap, Method, StatusCode};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct StartExecution;

    impl ServiceRequest for StartExecution {
        fn operation_name(&self) -> &'static str {
            "StartExecution"
        }

        fn method(&self) -> Method {
            Method::POST
        }

        fn uri_path(&self) -> String {
            "/".to_string()
        }

        fn serialize_payload(&self) -> crate::Result<Vec<u8>> {
            Ok(b"{}".to_vec())
        }
    }

    /// Always answers 200 after a fixed delay; counts in-flight executions so
    /// tests can observe pool width.
    struct SlowTransport {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowTransport {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn execute(
            &self,
            _request: SignedRequest,
        ) -> std::result::Result<RawResponse, TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RawResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: b"{}".to_vec(),
            })
        }
    }

    fn client(transport: Arc<SlowTransport>) -> Client {
        Client::builder()
            .service("states")
            .region("us-east-1")
            .credentials(Credentials::new("AKID", "secret"))
            .transport(transport)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_join() {
        let client = client(SlowTransport::new(Duration::from_millis(5)));
        let dispatcher = Dispatcher::new(2).unwrap();

        let handle = dispatcher
            .submit(client, StartExecution, IgnoreBody)
            .await
            .unwrap();
        let response = handle.join().await.unwrap();
        assert_eq!(response.attempts, 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_pool_width_bounds_concurrency() {
        let transport = SlowTransport::new(Duration::from_millis(30));
        let client = client(transport.clone());
        let dispatcher = Dispatcher::with_queue(2, 16, QueuePolicy::Block).unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            handles.push(
                dispatcher
                    .submit(client.clone(), StartExecution, IgnoreBody)
                    .await
                    .unwrap(),
            );
        }
        for handle in handles {
            handle.join().await.unwrap();
        }

        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_reject_policy_fails_fast_when_full() {
        let client = client(SlowTransport::new(Duration::from_millis(100)));
        let dispatcher = Dispatcher::with_queue(1, 1, QueuePolicy::Reject).unwrap();

        let first = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();
        // Let the worker pick up the first call before filling the queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();

        let err = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QueueFull);

        first.join().await.unwrap();
        second.join().await.unwrap();
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_capacity() {
        let client = client(SlowTransport::new(Duration::from_millis(100)));
        let dispatcher = Dispatcher::with_queue(1, 1, QueuePolicy::Block).unwrap();

        let first = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();
        // Let the worker pick up the first call, then occupy the single slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();

        // The queue is full: this submit must wait until the worker finishes
        // the first call and pulls the second, freeing the slot.
        let start = std::time::Instant::now();
        let third = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));

        first.join().await.unwrap();
        second.join().await.unwrap();
        third.join().await.unwrap();
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_queued_calls() {
        let client = client(SlowTransport::new(Duration::from_millis(100)));
        let dispatcher = Dispatcher::with_queue(1, 8, QueuePolicy::Block).unwrap();

        let running = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let queued = dispatcher
            .submit(client.clone(), StartExecution, IgnoreBody)
            .await
            .unwrap();

        dispatcher.shutdown().await;

        // The in-flight call ran to completion; the queued one never started.
        running.join().await.unwrap();
        let err = queued.join().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }

    #[tokio::test]
    async fn test_callback_delivery() {
        let client = client(SlowTransport::new(Duration::from_millis(5)));
        let dispatcher = Dispatcher::new(1).unwrap();
        let (done_tx, done_rx) = oneshot::channel();

        dispatcher
            .submit_with_callback(client, StartExecution, IgnoreBody, move |outcome| {
                let _ = done_tx.send(outcome.map(|r| r.attempts));
            })
            .await
            .unwrap();

        assert_eq!(done_rx.await.unwrap().unwrap(), 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_abandoned_handle_does_not_disturb_the_call() {
        let client = client(SlowTransport::new(Duration::from_millis(5)));
        let dispatcher = Dispatcher::new(1).unwrap();

        let handle = dispatcher
            .submit(client, StartExecution, IgnoreBody)
            .await
            .unwrap();
        handle.abandon();

        // The call still runs; shutdown waits for it without panicking.
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.shutdown().await;
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let err = Dispatcher::new(0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
