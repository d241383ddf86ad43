use crate::client::MetricsSource;
use crate::config::SamplerConfig;
use crate::metrics::{local_time_label, PollResult, SamplerState};
use crate::ticker::Ticker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const RESULT_CHANNEL_CAPACITY: usize = 1024;

/// Polls the metrics endpoint on a fixed cadence and keeps a bounded window
/// of recent points plus a connectivity flag.
///
/// Poll results go over a channel to a single collector task that owns the
/// [`SamplerState`]; each applied result is published on a `watch` channel.
/// Creating a sampler requires a tokio runtime.
pub struct Sampler {
    source: Arc<dyn MetricsSource>,
    interval: Duration,
    results: mpsc::Sender<PollResult>,
    state: watch::Receiver<SamplerState>,
    ticker: Option<Ticker>,
}

impl Sampler {
    pub fn new(source: Arc<dyn MetricsSource>, config: &SamplerConfig) -> Self {
        let (results, mut result_rx) = mpsc::channel::<PollResult>(RESULT_CHANNEL_CAPACITY);
        let (state_tx, state) = watch::channel(SamplerState::new(config.history_len));

        tokio::spawn(async move {
            let mut current = state_tx.borrow().clone();
            while let Some(result) = result_rx.recv().await {
                current.apply(result);
                state_tx.send_replace(current.clone());
            }
        });

        Self {
            source,
            interval: config.interval(),
            results,
            state,
            ticker: None,
        }
    }

    /// Issue one poll and wait for its result to be handed to the collector.
    pub async fn poll(&self) {
        poll_once(self.source.as_ref(), &self.results).await;
    }

    /// Begin periodic polling. A no-op while already polling.
    pub fn start(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }

        let source = self.source.clone();
        let results = self.results.clone();
        self.ticker = Some(Ticker::start(self.interval, move || {
            let source = source.clone();
            let results = results.clone();
            async move { poll_once(source.as_ref(), &results).await }
        }));

        info!(
            "Sampler started: source={} every {}ms",
            self.source.name(),
            self.interval.as_millis()
        );
        true
    }

    /// Stop periodic polling. Polls already in flight still land. A no-op when
    /// not polling.
    pub fn stop(&mut self) -> bool {
        match self.ticker.take() {
            Some(mut ticker) => {
                ticker.stop();
                info!("Sampler stopped after {} polls", ticker.ticks());
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> SamplerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SamplerState> {
        self.state.clone()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_once(source: &dyn MetricsSource, results: &mpsc::Sender<PollResult>) {
    let outcome = source.fetch_metrics().await;
    match &outcome {
        Ok(snapshot) => debug!(
            "poll ok: allowed={} blocked={} redis_errors={}",
            snapshot.allowed_requests, snapshot.blocked_requests, snapshot.redis_errors
        ),
        Err(e) => warn!("Failed to fetch metrics: {}", e),
    }

    let result = PollResult {
        timestamp: local_time_label(),
        outcome,
    };
    // The collector only goes away with the sampler itself.
    let _ = results.send(result).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMetricsSource;
    use crate::error::FetchError;
    use crate::metrics::MetricsSnapshot;
    use tokio::time::{sleep, timeout};

    fn snapshot(allowed: u64, blocked: u64) -> Result<MetricsSnapshot, FetchError> {
        Ok(MetricsSnapshot {
            allowed_requests: allowed,
            blocked_requests: blocked,
            redis_errors: 0,
        })
    }

    async fn wait_for_polls(sampler: &Sampler, polls: u64) -> SamplerState {
        let mut rx = sampler.subscribe();
        let state = timeout(Duration::from_secs(60), rx.wait_for(|s| s.polls >= polls))
            .await
            .expect("timed out waiting for polls")
            .expect("collector gone");
        state.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_traffic() {
        let source = Arc::new(MockMetricsSource::new(vec![
            snapshot(100, 0),
            snapshot(105, 2),
        ]));
        let sampler = Sampler::new(source, &SamplerConfig::default());

        sampler.poll().await;
        sampler.poll().await;
        let state = wait_for_polls(&sampler, 2).await;

        assert!(state.connected);
        let allowed: Vec<u64> = state.history.iter().map(|p| p.allowed).collect();
        assert_eq!(allowed, vec![100, 105]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_then_recovery() {
        let source = Arc::new(MockMetricsSource::new(vec![
            snapshot(1, 0),
            Err(FetchError::Transport("connection refused".into())),
            Err(FetchError::Status(500)),
            Err(FetchError::Malformed("trailing characters".into())),
            snapshot(9, 3),
        ]));
        let sampler = Sampler::new(source, &SamplerConfig::default());

        for _ in 0..4 {
            sampler.poll().await;
        }
        let state = wait_for_polls(&sampler, 4).await;
        assert!(!state.connected);
        assert_eq!(state.history.len(), 1);

        sampler.poll().await;
        let state = wait_for_polls(&sampler, 5).await;
        assert!(state.connected);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history.newest().unwrap().allowed, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_polling_fills_bounded_window() {
        let source = Arc::new(MockMetricsSource::ramping(5, 1));
        let mut sampler = Sampler::new(source, &SamplerConfig::default());

        assert!(sampler.start());
        sleep(Duration::from_millis(30_500)).await;
        assert!(sampler.stop());

        let state = wait_for_polls(&sampler, 30).await;
        assert_eq!(state.polls, 30);
        assert_eq!(state.history.len(), 20);
        assert_eq!(state.history.oldest().unwrap().allowed, 55);
        assert_eq!(state.history.newest().unwrap().allowed, 150);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_exclusive_and_stop_idempotent() {
        let source = Arc::new(MockMetricsSource::ramping(1, 0));
        let mut sampler = Sampler::new(source, &SamplerConfig::default());

        assert!(!sampler.stop());
        assert!(sampler.start());
        assert!(!sampler.start());
        assert!(!sampler.start());

        sleep(Duration::from_millis(3_500)).await;
        assert!(sampler.stop());
        assert!(!sampler.stop());
        assert!(!sampler.is_running());

        // A second timer would have doubled the poll count.
        let state = wait_for_polls(&sampler, 3).await;
        sleep(Duration::from_millis(5_000)).await;
        assert_eq!(sampler.snapshot().polls, 3);
        assert_eq!(state.polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_overlap() {
        let source = Arc::new(
            MockMetricsSource::ramping(1, 0).with_delay(Duration::from_millis(2_500)),
        );
        let config = SamplerConfig::default();
        let mut sampler = Sampler::new(source, &config);

        sampler.start();
        sleep(Duration::from_millis(3_100)).await;
        sampler.stop();

        // Three polls were issued before stop and none has landed yet.
        assert_eq!(sampler.snapshot().polls, 0);
        let state = wait_for_polls(&sampler, 3).await;
        assert_eq!(state.history.len(), 3);
    }
}
