use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Repeating timer that launches one detached task per tick.
///
/// The first tick fires one full `period` after [`Ticker::start`]. A tick never
/// waits for the previous task to finish, so executions may overlap; callers
/// fold results in completion order. Stopping prevents further ticks but leaves
/// already-launched tasks running. Dropping the handle stops it.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    gate: Arc<Mutex<bool>>,
    ticks: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(period: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let gate = Arc::new(Mutex::new(false));
        let ticks = Arc::new(AtomicU64::new(0));

        let join = {
            let gate = gate.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    // Held across the spawn so `stop` cannot return between
                    // the check and the launch.
                    let stopped = gate.lock().unwrap_or_else(PoisonError::into_inner);
                    if *stopped {
                        break;
                    }
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(task());
                }
            })
        };

        debug!("ticker started, period={}ms", period.as_millis());

        Self {
            period,
            gate,
            ticks,
            join: Some(join),
        }
    }

    /// Idempotent. No tick fires after this returns.
    pub fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = true;
        join.abort();
        debug!(
            "ticker stopped after {} ticks",
            self.ticks.load(Ordering::Relaxed)
        );
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    /// Number of tasks launched so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
