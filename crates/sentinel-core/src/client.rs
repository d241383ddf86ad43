use crate::config::{ApiConfig, ProbeConfig};
use crate::error::FetchError;
use crate::metrics::MetricsSnapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of cumulative counters for the sampler.
pub trait MetricsSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_metrics(&self) -> BoxFuture<'_, Result<MetricsSnapshot, FetchError>>;
}

/// The rate-limited endpoint the load generator hammers. Resolves to the HTTP
/// status of the response, whatever it is.
pub trait ProbeTarget: Send + Sync {
    fn name(&self) -> &'static str;

    fn probe(&self) -> BoxFuture<'_, Result<u16, FetchError>>;
}

fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build HTTP client")
}

/// `GET {api}/metrics`
pub struct HttpMetricsSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpMetricsSource {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            url: config.metrics_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl MetricsSource for HttpMetricsSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch_metrics(&self) -> BoxFuture<'_, Result<MetricsSnapshot, FetchError>> {
        Box::pin(async move {
            let response = self.client.get(self.url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let body = response.bytes().await?;
            serde_json::from_slice::<MetricsSnapshot>(&body)
                .map_err(|e| FetchError::Malformed(e.to_string()))
        })
    }
}

/// `GET {probe}/playground`, no body, no auth.
pub struct HttpProbeTarget {
    client: reqwest::Client,
    url: Url,
}

impl HttpProbeTarget {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            url: config.url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ProbeTarget for HttpProbeTarget {
    fn name(&self) -> &'static str {
        "http"
    }

    fn probe(&self) -> BoxFuture<'_, Result<u16, FetchError>> {
        Box::pin(async move {
            let response = self.client.get(self.url.clone()).send().await?;
            Ok(response.status().as_u16())
        })
    }
}

/// A rule change for one route, as accepted by the limiter's config endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleUpdate {
    /// Route prefix, or `default` for the catch-all rule
    pub path: String,
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window: u64,
}

impl Default for RuleUpdate {
    fn default() -> Self {
        Self {
            path: "/playground".to_string(),
            limit: 10,
            window: 60,
        }
    }
}

/// `POST {api}/api/config`
pub struct ConfigClient {
    client: reqwest::Client,
    url: Url,
}

impl ConfigClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            url: config.config_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Push one rule. Returns the server's confirmation text; any non-200
    /// answer is a failure.
    pub async fn update_rule(&self, update: &RuleUpdate) -> Result<String> {
        debug!(
            "POST {} path={} limit={} window={}s",
            self.url, update.path, update.limit, update.window
        );
        let response = self
            .client
            .post(self.url.clone())
            .json(update)
            .send()
            .await
            .context("Error connecting to server")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.as_u16() != 200 {
            anyhow::bail!(
                "Failed to update config: HTTP {} {}",
                status.as_u16(),
                body.trim()
            );
        }
        Ok(body.trim().to_string())
    }
}

/// Scripted metrics source. Replays queued results in order, then keeps
/// returning `fallback`, or ever-growing counters when built with
/// [`MockMetricsSource::ramping`].
pub struct MockMetricsSource {
    script: Mutex<VecDeque<Result<MetricsSnapshot, FetchError>>>,
    fallback: Result<MetricsSnapshot, FetchError>,
    ramp: Option<(u64, u64)>,
    calls: AtomicU64,
    delay: Duration,
}

impl MockMetricsSource {
    pub fn new(script: Vec<Result<MetricsSnapshot, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err(FetchError::Transport("mock script exhausted".to_string())),
            ramp: None,
            calls: AtomicU64::new(0),
            delay: Duration::ZERO,
        }
    }

    /// The n-th fetch reports `n * allowed_step` allowed and
    /// `n * blocked_step` blocked requests.
    pub fn ramping(allowed_step: u64, blocked_step: u64) -> Self {
        let mut source = Self::new(Vec::new());
        source.ramp = Some((allowed_step, blocked_step));
        source
    }

    pub fn with_fallback(mut self, fallback: Result<MetricsSnapshot, FetchError>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn next(&self) -> Result<MetricsSnapshot, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = script.pop_front() {
            return result;
        }
        match self.ramp {
            Some((allowed_step, blocked_step)) => Ok(MetricsSnapshot {
                allowed_requests: n.saturating_mul(allowed_step),
                blocked_requests: n.saturating_mul(blocked_step),
                redis_errors: 0,
            }),
            None => self.fallback.clone(),
        }
    }
}

impl MetricsSource for MockMetricsSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch_metrics(&self) -> BoxFuture<'_, Result<MetricsSnapshot, FetchError>> {
        Box::pin(async move {
            // Dequeue at issue time so overlapping fetches keep script order.
            let result = self.next();
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            result
        })
    }
}

/// Scripted probe target with per-entry latency, so tests can make later
/// probes finish before earlier ones.
pub struct MockProbeTarget {
    script: Mutex<VecDeque<(Duration, Result<u16, FetchError>)>>,
    fallback: Result<u16, FetchError>,
}

impl MockProbeTarget {
    pub fn new(statuses: Vec<Result<u16, FetchError>>) -> Self {
        Self::with_latencies(
            statuses
                .into_iter()
                .map(|status| (Duration::ZERO, status))
                .collect(),
        )
    }

    pub fn with_latencies(script: Vec<(Duration, Result<u16, FetchError>)>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Ok(200),
        }
    }

    /// Lets `limit` probes through, then answers 429, like a fresh window.
    pub fn limited(limit: usize) -> Self {
        Self::new(vec![Ok(200); limit]).with_fallback(Ok(429))
    }

    pub fn with_fallback(mut self, fallback: Result<u16, FetchError>) -> Self {
        self.fallback = fallback;
        self
    }

    fn next(&self) -> (Duration, Result<u16, FetchError>) {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script
            .pop_front()
            .unwrap_or_else(|| (Duration::ZERO, self.fallback.clone()))
    }
}

impl ProbeTarget for MockProbeTarget {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn probe(&self) -> BoxFuture<'_, Result<u16, FetchError>> {
        Box::pin(async move {
            let (latency, result) = self.next();
            if !latency.is_zero() {
                sleep(latency).await;
            }
            result
        })
    }
}
