//! Admission-controlled, retrying HTTP call primitive.
//!
//! Every API call goes through [`Scheduler::call`] (or [`Scheduler::call_url`]
//! for absolute continuation URLs). A call first waits for admission: while
//! the scheduler already has `concurrency` requests in flight it sleeps for
//! the poll interval and checks again. Once admitted it holds its slot until
//! the call completes, including any 429 backoff sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use gobracket_shared::{GoBracketError, Result, SchedulerConfig};

use crate::request::Request;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("gobracket/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// In-flight request counter owned by one scheduler.
#[derive(Debug)]
struct Admission {
    cap: usize,
    active: AtomicUsize,
    high_water: AtomicUsize,
}

impl Admission {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            active: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Take a slot if one is free. Never pushes `active` past `cap`.
    fn try_admit(&self) -> Option<Permit<'_>> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.cap {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.high_water.fetch_max(current + 1, Ordering::AcqRel);
                    return Some(Permit { admission: self });
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Releases its admission slot exactly once, on drop.
struct Permit<'a> {
    admission: &'a Admission,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.admission.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Delay before reissuing a request after its `attempt`-th throttled response.
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(attempt)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Concurrency-capped JSON API client with linear backoff on HTTP 429.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    base_url: Url,
    client: Client,
    admission: Admission,
}

impl Scheduler {
    /// Create a scheduler rooted at `config.base_url`.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            GoBracketError::config(format!("invalid base_url '{}': {e}", config.base_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GoBracketError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            admission: Admission::new(config.concurrency.max(1)),
            config,
            base_url,
            client,
        })
    }

    /// API root every [`Request`] path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Requests currently admitted and not yet completed.
    pub fn active(&self) -> usize {
        self.admission.active.load(Ordering::Acquire)
    }

    /// Highest value `active` has reached since the scheduler was created.
    pub fn high_water(&self) -> usize {
        self.admission.high_water.load(Ordering::Acquire)
    }

    /// Admission cap.
    pub fn capacity(&self) -> usize {
        self.admission.cap
    }

    /// Issue `request` and return its parsed JSON body.
    ///
    /// Non-2xx statuses other than 429 are returned as the parsed body,
    /// not as errors.
    #[instrument(skip_all, fields(method = %request.method(), path = request.path()))]
    pub async fn call(&self, request: &Request) -> Result<Value> {
        let url = request.url(&self.base_url)?;
        self.execute(request.method().clone(), url).await
    }

    /// `GET` an absolute URL, such as a pagination `next` link.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn call_url(&self, url: &Url) -> Result<Value> {
        self.execute(Method::GET, url.clone()).await
    }

    async fn admit(&self) -> Permit<'_> {
        let mut polls: u32 = 0;
        loop {
            if let Some(permit) = self.admission.try_admit() {
                if polls > 0 {
                    debug!(polls, active = self.active(), "admitted after waiting");
                }
                return permit;
            }
            polls += 1;
            trace!(active = self.active(), cap = self.admission.cap, "admission full, polling");
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn execute(&self, method: Method, url: Url) -> Result<Value> {
        let _permit = self.admit().await;
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts: u32 = 0;

        loop {
            debug!(%url, attempt = attempts + 1, "sending request");

            let response = self
                .client
                .request(method.clone(), url.clone())
                .send()
                .await
                .map_err(|e| GoBracketError::Network(format!("{url}: {e}")))?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                attempts += 1;
                if attempts >= max_attempts {
                    warn!(%url, attempts, "throttled, retry budget exhausted");
                    return Err(GoBracketError::RetriesExhausted {
                        url: url.to_string(),
                        attempts,
                    });
                }

                let delay = backoff_delay(self.config.backoff_unit, attempts);
                warn!(
                    %url,
                    attempts,
                    backoff_ms = delay.as_millis() as u64,
                    "throttled, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                warn!(%url, %status, "non-success status, returning body to caller");
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| GoBracketError::Network(format!("{url}: body read failed: {e}")))?;

            return serde_json::from_slice(&body).map_err(|e| {
                GoBracketError::parse(format!("{url}: HTTP {status}: body is not JSON: {e}"))
            });
        }
    }
}
