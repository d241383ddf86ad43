use crate::client::ProbeTarget;
use crate::config::LoadConfig;
use crate::history::BoundedLog;
use crate::metrics::local_time_label;
use crate::probe::{LogEntry, OutcomeKind, ProbeOutcome};
use crate::stats::LoadStats;
use crate::ticker::Ticker;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

const OUTCOME_CHANNEL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulationState {
    Idle,
    Running,
}

/// Event log and totals for one session.
#[derive(Debug, Clone, Serialize)]
pub struct LoadState {
    pub log: BoundedLog<LogEntry>,
    pub stats: LoadStats,
    #[serde(skip)]
    last_id: u64,
}

impl LoadState {
    pub fn new(log_len: usize) -> Self {
        Self {
            log: BoundedLog::new(log_len),
            stats: LoadStats::new(),
            last_id: 0,
        }
    }

    /// Fold one outcome, stamping it with an id derived from `now_micros`
    /// but never reusing or going below a previous id.
    pub fn record(&mut self, outcome: ProbeOutcome, now_micros: u64) -> u64 {
        let id = now_micros.max(self.last_id + 1);
        self.last_id = id;
        self.stats.record(outcome.kind);
        self.log.push(LogEntry { id, outcome });
        id
    }
}

/// Fires probes at a fixed rate while running and keeps a bounded log of
/// classified outcomes plus running totals.
///
/// Outcomes go over a channel to a single collector task that owns the
/// [`LoadState`]; each applied outcome is published on a `watch` channel.
/// Stats and log survive stop/start cycles. Creating a generator requires a
/// tokio runtime.
pub struct LoadGenerator {
    target: Arc<dyn ProbeTarget>,
    interval: Duration,
    outcomes: mpsc::Sender<ProbeOutcome>,
    state: watch::Receiver<LoadState>,
    issued: Arc<AtomicU64>,
    ticker: Option<Ticker>,
}

impl LoadGenerator {
    pub fn new(target: Arc<dyn ProbeTarget>, config: &LoadConfig) -> Self {
        let (outcomes, mut outcome_rx) = mpsc::channel::<ProbeOutcome>(OUTCOME_CHANNEL_CAPACITY);
        let (state_tx, state) = watch::channel(LoadState::new(config.log_len));

        tokio::spawn(async move {
            let mut current = state_tx.borrow().clone();
            while let Some(outcome) = outcome_rx.recv().await {
                let now_micros = chrono::Utc::now().timestamp_micros().max(0) as u64;
                current.record(outcome, now_micros);
                state_tx.send_replace(current.clone());
            }
        });

        Self {
            target,
            interval: config.interval(),
            outcomes,
            state,
            issued: Arc::new(AtomicU64::new(0)),
            ticker: None,
        }
    }

    /// Issue one probe and hand its outcome to the collector.
    pub async fn fire_one(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        fire(self.target.as_ref(), &self.outcomes).await;
    }

    /// Flip between idle and running and return the new state.
    pub fn toggle(&mut self) -> SimulationState {
        match self.state() {
            SimulationState::Idle => self.start(),
            SimulationState::Running => self.stop(),
        };
        self.state()
    }

    /// A no-op while already running.
    pub fn start(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }

        let target = self.target.clone();
        let outcomes = self.outcomes.clone();
        let issued = self.issued.clone();
        self.ticker = Some(Ticker::start(self.interval, move || {
            issued.fetch_add(1, Ordering::Relaxed);
            let target = target.clone();
            let outcomes = outcomes.clone();
            async move { fire(target.as_ref(), &outcomes).await }
        }));

        info!(
            "Simulation started: target={} every {}ms",
            self.target.name(),
            self.interval.as_millis()
        );
        true
    }

    /// Stop issuing probes. Probes already in flight still land. A no-op while
    /// idle.
    pub fn stop(&mut self) -> bool {
        match self.ticker.take() {
            Some(mut ticker) => {
                ticker.stop();
                info!(
                    "Simulation stopped after {} ticks ({} probes issued this session)",
                    ticker.ticks(),
                    self.issued()
                );
                true
            }
            None => false,
        }
    }

    pub fn state(&self) -> SimulationState {
        if self.ticker.is_some() {
            SimulationState::Running
        } else {
            SimulationState::Idle
        }
    }

    /// Probes issued this session, landed or not.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.clone()
    }
}

impl Drop for LoadGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fire(target: &dyn ProbeTarget, outcomes: &mpsc::Sender<ProbeOutcome>) {
    let kind = match target.probe().await {
        Ok(status) => OutcomeKind::from_status(status),
        Err(e) => {
            debug!("probe failed: {}", e);
            OutcomeKind::TransportError
        }
    };
    debug!("probe -> {} {}", kind.status(), kind.message());

    let outcome = ProbeOutcome::new(kind, local_time_label());
    let _ = outcomes.send(outcome).await;
}
