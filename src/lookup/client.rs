use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use super::retry::RetryState;
use super::{Candidate, LookupError, MetadataService, RetryPolicy, SearchRequest, Throttle};

/// Default time limit for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lookup client tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupSettings {
    /// Minimum time between two requests across all callers.
    pub request_interval: Duration,
    pub retry: RetryPolicy,
    /// Time limit for one attempt.
    pub timeout: Duration,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self {
            request_interval: super::DEFAULT_REQUEST_INTERVAL,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Cooperative stop request shared with a signal handler.
///
/// Checked before every request. Requests already sent finish normally.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for handlers that only accept an `AtomicBool`.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Metadata lookups with a shared request throttle and bounded retries.
#[derive(Debug)]
pub struct LookupClient<S> {
    service: S,
    throttle: Arc<Throttle>,
    retry: RetryPolicy,
    timeout: Duration,
    requests: AtomicU64,
    stop: StopSignal,
}

impl<S: MetadataService> LookupClient<S> {
    #[must_use]
    pub fn new(service: S, settings: LookupSettings) -> Self {
        Self::with_throttle(service, Arc::new(Throttle::new(settings.request_interval)), settings)
    }

    /// Create a client that shares `throttle` with other clients.
    #[must_use]
    pub fn with_throttle(service: S, throttle: Arc<Throttle>, settings: LookupSettings) -> Self {
        Self {
            service,
            throttle,
            retry: settings.retry,
            timeout: settings.timeout,
            requests: AtomicU64::new(0),
            stop: StopSignal::new(),
        }
    }

    /// No request or retry is sent once `stop` is set.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Number of requests sent so far, including retries.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Search for `term`, optionally scoped to `platform_ids`.
    ///
    /// Transient failures are retried with exponential backoff.
    /// Unauthorized fails on the first attempt.
    /// Returns [`LookupError::Cancelled`] if a stop is requested before an attempt is sent.
    pub async fn query(&self, term: &str, platform_ids: &[u32]) -> Result<Vec<Candidate>, LookupError> {
        let request = SearchRequest {
            term: term.to_string(),
            platform_ids: platform_ids.to_vec(),
        };
        let start = Instant::now();
        let mut attempts = 0;
        let mut state = RetryState::Attempting(1);
        loop {
            state = match state {
                RetryState::Attempting(attempt) => {
                    self.throttle.acquire().await;
                    if self.stop.is_stopped() {
                        RetryState::Failed(LookupError::Cancelled)
                    } else {
                        attempts = attempt;
                        self.requests.fetch_add(1, Ordering::Relaxed);
                        let outcome = tokio::time::timeout(self.timeout, self.service.search(&request))
                            .await
                            .unwrap_or(Err(LookupError::Timeout));
                        self.retry.next(attempt, outcome)
                    }
                }
                RetryState::Backoff { attempt, delay } => {
                    tracing::debug!(
                        service = self.service.name(),
                        term,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    RetryPolicy::resume(attempt)
                }
                RetryState::Failed(LookupError::Cancelled) => {
                    tracing::debug!(service = self.service.name(), term, attempts, "Lookup cancelled");
                    return Err(LookupError::Cancelled);
                }
                RetryState::Failed(error) => {
                    tracing::warn!(
                        service = self.service.name(),
                        term,
                        platforms = ?platform_ids,
                        attempts,
                        outcome = error.kind(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Lookup failed: {error}"
                    );
                    return Err(error);
                }
                RetryState::Succeeded(candidates) => {
                    tracing::debug!(
                        service = self.service.name(),
                        term,
                        platforms = ?platform_ids,
                        attempts,
                        outcome = "ok",
                        candidates = candidates.len(),
                        latency_ms = start.elapsed().as_millis() as u64,
                        "Lookup finished"
                    );
                    return Ok(candidates);
                }
            };
        }
    }
}
