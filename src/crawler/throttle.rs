//! Throttled request queue
//!
//! This module serializes every outbound request of a run:
//! - One drain task services the queue, so at most one request is in flight
//!   no matter how many callers are waiting
//! - Urgent requests are serviced before normal ones, FIFO within each class
//! - Each request is preceded by a random delay to stay polite
//! - Failed requests are retried a bounded number of times, and a run-wide
//!   failure counter stops all retrying when the site looks down
//! - Optionally, every final response body is dumped to disk

use crate::config::{validate_throttle, ThrottleConfig};
use crate::crawler::fetcher::{Fetch, TransportError};
use crate::site::dump_file_name;
use crate::storage::ContentStore;
use crate::{ConfigError, FetchError};
use rand::Rng;
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

/// Queue position of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Appended behind every other waiting request
    Normal,
    /// Serviced before any normal request, after earlier urgent ones
    Urgent,
}

/// A pending fetch and the caller waiting on it
struct QueueTask {
    url: String,
    reply: oneshot::Sender<Result<String, FetchError>>,
}

#[derive(Default)]
struct Queue {
    urgent: VecDeque<QueueTask>,
    normal: VecDeque<QueueTask>,
}

impl Queue {
    fn push(&mut self, task: QueueTask, priority: Priority) {
        match priority {
            Priority::Urgent => self.urgent.push_back(task),
            Priority::Normal => self.normal.push_back(task),
        }
    }

    fn pop(&mut self) -> Option<QueueTask> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.urgent.len() + self.normal.len()
    }
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Where raw response bodies are written when dumping is enabled
#[derive(Debug, Clone)]
pub struct RawDump {
    store: ContentStore,
    dir: PathBuf,
}

impl RawDump {
    /// Dumps into `dir`, creating it through the store's directory memo
    pub fn new(store: ContentStore, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
        }
    }

    async fn write(&self, url: &str, body: &str) {
        let file = self.dir.join(dump_file_name(url));
        tracing::debug!("Dumping response to file. (file={})", file.display());
        if let Err(e) = self.store.write_raw(&file, body.as_bytes()).await {
            tracing::warn!("Failed to dump response for {}: {}", url, e);
        }
    }
}

/// Single-flight, randomly delayed, retrying request queue
///
/// Dropping the throttler stops its drain task; callers still waiting get
/// [`TransportError::Closed`].
pub struct RequestThrottler {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl RequestThrottler {
    /// Creates the queue and spawns its drain task on the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns a validation error when the delay range is inverted or the
    /// retry limits are zero; no request is ever made in that case.
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        config: &ThrottleConfig,
        dump: Option<RawDump>,
    ) -> Result<Self, ConfigError> {
        validate_throttle(config)?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            notify: Notify::new(),
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            fetcher,
            min_delay: config.min_delay_ms(),
            max_delay: config.max_delay_ms(),
            max_attempts: config.max_attempts,
            failure_ceiling: config.failure_ceiling,
            run_attempt: 1,
            tripped: None,
            dump,
        };
        let worker = tokio::spawn(worker.drain());

        Ok(Self { shared, worker })
    }

    /// Queues a GET of `url` and returns a future resolving to its body
    ///
    /// The request is queued when this is called, not when the future is
    /// first polled, so queue order follows call order.
    pub fn fetch(
        &self,
        url: impl Into<String>,
        priority: Priority,
    ) -> impl Future<Output = Result<String, FetchError>> + Send + 'static {
        let url = url.into();
        let (reply, response) = oneshot::channel();

        let pending = {
            let mut queue = self.shared.queue();
            queue.push(
                QueueTask {
                    url: url.clone(),
                    reply,
                },
                priority,
            );
            queue.len()
        };
        tracing::trace!("Adding request. (queue={} url={})", pending, url);
        self.shared.notify.notify_one();

        async move {
            response.await.unwrap_or_else(|_| {
                Err(FetchError {
                    url,
                    cause: TransportError::Closed,
                })
            })
        }
    }

    /// Number of requests waiting behind the one in flight
    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }
}

impl Drop for RequestThrottler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// State owned by the drain task
struct Worker {
    shared: Arc<Shared>,
    fetcher: Arc<dyn Fetch>,
    min_delay: u64,
    max_delay: u64,
    max_attempts: u32,
    failure_ceiling: u32,
    /// Run-wide attempt number; grows with every failure, back to 1 on success
    run_attempt: u32,
    /// Set once the failure ceiling is hit; every later request fails with it
    tripped: Option<TransportError>,
    dump: Option<RawDump>,
}

impl Worker {
    async fn drain(mut self) {
        loop {
            let task = self.next_task().await;

            if task.reply.is_closed() {
                tracing::trace!("Skipping abandoned request. (url={})", task.url);
                continue;
            }

            let result = self.process(&task.url).await;
            // The caller may have given up while we were fetching
            let _ = task.reply.send(result);
        }
    }

    async fn next_task(&self) -> QueueTask {
        loop {
            if let Some(task) = self.shared.queue().pop() {
                return task;
            }
            self.shared.notify.notified().await;
        }
    }

    async fn process(&mut self, url: &str) -> Result<String, FetchError> {
        if let Some(cause) = &self.tripped {
            tracing::debug!("Failing request without retry. (url={})", url);
            return Err(FetchError {
                url: url.to_string(),
                cause: cause.clone(),
            });
        }

        let mut attempt = 1;
        let outcome = loop {
            self.delay().await;
            tracing::debug!(
                "Request begun. (queue={} url={} attempt={})",
                self.shared.queue().len(),
                url,
                attempt
            );

            match self.fetcher.get(url).await {
                Ok(body) => {
                    self.run_attempt = 1;
                    tracing::debug!("Request finished. (url={} length={})", url, body.len());
                    break Ok(body);
                }
                Err(cause) => {
                    tracing::warn!(
                        "Request failed. (url={} attempt={} run_attempt={} error={})",
                        url,
                        attempt,
                        self.run_attempt,
                        cause
                    );

                    self.run_attempt += 1;
                    if self.run_attempt >= self.failure_ceiling {
                        tracing::error!(
                            "Run failure ceiling reached, giving up on all remaining requests. (run_attempt={})",
                            self.run_attempt
                        );
                        self.tripped = Some(cause.clone());
                        break Err(cause);
                    }

                    if attempt >= self.max_attempts {
                        break Err(cause);
                    }
                    attempt += 1;
                }
            }
        };

        if let Some(dump) = &self.dump {
            match &outcome {
                Ok(body) => dump.write(url, body).await,
                Err(cause) => dump.write(url, &cause.dump_body()).await,
            }
        }

        outcome.map_err(|cause| FetchError {
            url: url.to_string(),
            cause,
        })
    }

    async fn delay(&self) {
        let millis = rand::thread_rng().gen_range(self.min_delay..=self.max_delay);
        if millis > 0 {
            tracing::trace!("Beginning delay. ({}s)", millis as f64 / 1000.0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` calls, then echoes the URL back
    #[derive(Default)]
    struct FlakyFetch {
        failures: usize,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl FlakyFetch {
        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for FlakyFetch {
        async fn get(&self, url: &str) -> Result<String, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(url.to_string());

            tokio::time::sleep(Duration::from_millis(5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if call < self.failures {
                Err(TransportError::Status {
                    status: 503,
                    body: "busy".to_string(),
                })
            } else {
                Ok(format!("body of {}", url))
            }
        }
    }

    /// Blocks on URL "a" until released, recording the order of calls
    #[derive(Default)]
    struct GatedFetch {
        started: Notify,
        gate: Notify,
        order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetch for GatedFetch {
        async fn get(&self, url: &str) -> Result<String, TransportError> {
            self.order.lock().unwrap().push(url.to_string());
            if url == "a" {
                self.started.notify_one();
                self.gate.notified().await;
            }
            Ok(url.to_string())
        }
    }

    fn throttle(max_attempts: u32, failure_ceiling: u32) -> ThrottleConfig {
        ThrottleConfig {
            max_attempts,
            failure_ceiling,
            ..ThrottleConfig::immediate()
        }
    }

    #[tokio::test]
    async fn test_inverted_delay_is_rejected() {
        let config = ThrottleConfig {
            min_delay: Some(5000),
            max_delay: Some(2500),
            ..ThrottleConfig::default()
        };
        let fetch = FlakyFetch::failing(0);
        let result = RequestThrottler::new(fetch.clone(), &config, None);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
        assert_eq!(fetch.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_request_in_flight() {
        let fetch = FlakyFetch::failing(0);
        let throttler = RequestThrottler::new(fetch.clone(), &throttle(3, 10), None).unwrap();

        let requests: Vec<_> = (0..12)
            .map(|i| throttler.fetch(format!("https://example.com/{}", i), Priority::Normal))
            .collect();
        let results = join_all(requests).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(fetch.calls(), 12);
        assert_eq!(fetch.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let fetch = FlakyFetch::failing(2);
        let throttler = RequestThrottler::new(fetch.clone(), &throttle(3, 10), None).unwrap();

        let body = throttler
            .fetch("https://example.com/s/1/1", Priority::Normal)
            .await
            .unwrap();

        assert_eq!(body, "body of https://example.com/s/1/1");
        assert_eq!(fetch.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let fetch = FlakyFetch::failing(3);
        let throttler = RequestThrottler::new(fetch.clone(), &throttle(3, 10), None).unwrap();

        let err = throttler
            .fetch("https://example.com/s/1/1", Priority::Normal)
            .await
            .unwrap_err();
        assert_eq!(err.url, "https://example.com/s/1/1");
        assert!(matches!(err.cause, TransportError::Status { status: 503, .. }));
        assert_eq!(fetch.calls(), 3);

        // The run counter is not at the ceiling yet, so the next request runs
        let body = throttler
            .fetch("https://example.com/s/1/2", Priority::Normal)
            .await
            .unwrap();
        assert_eq!(body, "body of https://example.com/s/1/2");
        assert_eq!(fetch.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_ceiling_fails_fast() {
        let fetch = FlakyFetch::failing(usize::MAX);
        let config = ThrottleConfig {
            min_delay: Some(1000),
            max_delay: Some(1000),
            max_attempts: 3,
            failure_ceiling: 2,
            ..ThrottleConfig::default()
        };
        let throttler = RequestThrottler::new(fetch.clone(), &config, None).unwrap();

        // Counter goes 1 -> 2 on the first failure, which is the ceiling
        let first = throttler.fetch("https://example.com/1", Priority::Normal).await;
        assert!(first.is_err());
        assert_eq!(fetch.calls(), 1);

        let started = tokio::time::Instant::now();
        let second = throttler
            .fetch("https://example.com/2", Priority::Normal)
            .await
            .unwrap_err();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(second.url, "https://example.com/2");
        assert!(matches!(second.cause, TransportError::Status { status: 503, .. }));
        assert_eq!(fetch.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_run_counter() {
        // Two failures take the counter to 3, under a ceiling of 4
        let fetch = FlakyFetch::failing(2);
        let throttler = RequestThrottler::new(fetch.clone(), &throttle(3, 4), None).unwrap();
        assert!(throttler.fetch("u1", Priority::Normal).await.is_ok());
        assert_eq!(fetch.calls(), 3);

        let flaky_again = FlakyFetch::failing(2);
        let throttler = RequestThrottler::new(flaky_again.clone(), &throttle(1, 4), None).unwrap();
        assert!(throttler.fetch("u1", Priority::Normal).await.is_err());
        assert!(throttler.fetch("u2", Priority::Normal).await.is_err());
        assert!(throttler.fetch("u3", Priority::Normal).await.is_ok());
        assert!(throttler.fetch("u4", Priority::Normal).await.is_ok());
        assert_eq!(flaky_again.calls(), 4);
    }

    #[tokio::test]
    async fn test_urgent_requests_jump_the_queue_in_order() {
        let fetch = Arc::new(GatedFetch::default());
        let throttler =
            RequestThrottler::new(fetch.clone(), &ThrottleConfig::immediate(), None).unwrap();

        let a = throttler.fetch("a", Priority::Normal);
        fetch.started.notified().await;

        let b = throttler.fetch("b", Priority::Normal);
        let c = throttler.fetch("c", Priority::Urgent);
        let d = throttler.fetch("d", Priority::Urgent);
        let e = throttler.fetch("e", Priority::Normal);
        assert_eq!(throttler.pending(), 4);
        fetch.gate.notify_one();

        let (a, b, c, d, e) = tokio::join!(a, b, c, d, e);
        for result in [a, b, c, d, e] {
            assert!(result.is_ok());
        }
        assert_eq!(*fetch.order.lock().unwrap(), vec!["a", "c", "d", "b", "e"]);
    }

    #[tokio::test]
    async fn test_abandoned_requests_are_skipped() {
        let fetch = Arc::new(GatedFetch::default());
        let throttler =
            RequestThrottler::new(fetch.clone(), &ThrottleConfig::immediate(), None).unwrap();

        let a = throttler.fetch("a", Priority::Normal);
        fetch.started.notified().await;
        drop(throttler.fetch("b", Priority::Normal));
        let c = throttler.fetch("c", Priority::Normal);
        fetch.gate.notify_one();

        assert!(a.await.is_ok());
        assert!(c.await.is_ok());
        assert_eq!(*fetch.order.lock().unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_dropping_throttler_closes_waiters() {
        let fetch = Arc::new(GatedFetch::default());
        let throttler =
            RequestThrottler::new(fetch.clone(), &ThrottleConfig::immediate(), None).unwrap();

        let a = throttler.fetch("a", Priority::Normal);
        fetch.started.notified().await;
        let b = throttler.fetch("b", Priority::Normal);
        drop(throttler);

        assert!(matches!(a.await.unwrap_err().cause, TransportError::Closed));
        assert!(matches!(b.await.unwrap_err().cause, TransportError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dump_keeps_success_and_error_bodies() {
        let temp = TempDir::new().unwrap();
        let store = ContentStore::new(temp.path());
        let dump_dir = temp.path().join("dump");
        let dump = RawDump::new(store, &dump_dir);

        let fetch = FlakyFetch::failing(1);
        let throttler = RequestThrottler::new(fetch, &throttle(1, 10), Some(dump)).unwrap();

        let err = throttler
            .fetch("https://example.com/s/1/1", Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err.cause, TransportError::Status { status: 503, .. }));
        let dumped = std::fs::read_to_string(dump_dir.join("example.com-s-1-1.html")).unwrap();
        assert_eq!(dumped, "busy");

        throttler
            .fetch("https://example.com/s/1/2", Priority::Normal)
            .await
            .unwrap();
        let dumped = std::fs::read_to_string(dump_dir.join("example.com-s-1-2.html")).unwrap();
        assert_eq!(dumped, "body of https://example.com/s/1/2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dump_failure_does_not_hide_the_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("dump");
        std::fs::write(&blocker, "not a directory").unwrap();
        let dump = RawDump::new(ContentStore::new(temp.path()), &blocker);

        let fetch = FlakyFetch::failing(1);
        let throttler = RequestThrottler::new(fetch, &throttle(1, 10), Some(dump)).unwrap();

        let err = throttler
            .fetch("https://example.com/x", Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err.cause, TransportError::Status { status: 503, .. }));

        let body = throttler
            .fetch("https://example.com/y", Priority::Normal)
            .await
            .unwrap();
        assert_eq!(body, "body of https://example.com/y");
    }
}
