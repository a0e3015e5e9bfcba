//! Periodic expiry sweeps.
//!
//! Sweeps never overlap: the task awaits each sweep before waiting for the next
//! tick, and ticks that elapse during a slow sweep are skipped.

use std::sync::OnceLock;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Shortest accepted period; a zero period would make the interval panic.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Background sweep task, armed at most once and aborted on drop.
#[derive(Debug)]
pub(crate) struct ExpirationScheduler {
    period: Duration,
    task: OnceLock<JoinHandle<()>>,
}

impl ExpirationScheduler {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            task: OnceLock::new(),
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.task.get().is_some()
    }

    /// Start sweeping every period. Later calls are no-ops.
    ///
    /// `sweep` returns `None` once its target is gone, which ends the task.
    /// Must be called from within a Tokio runtime.
    pub(crate) fn arm<F>(&self, sweep: F) -> bool
    where
        F: Fn() -> Option<BoxFuture<'static, ()>> + Send + 'static,
    {
        let mut armed = false;
        self.task.get_or_init(|| {
            armed = true;
            let period = self.period;
            debug!(period_ms = period.as_millis() as u64, "arming expiry sweeps");
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    match sweep() {
                        Some(run) => run.await,
                        None => {
                            debug!("session store dropped, stopping expiry sweeps");
                            break;
                        }
                    }
                }
            })
        });
        armed
    }
}

impl Drop for ExpirationScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get() {
            task.abort();
        }
    }
}
