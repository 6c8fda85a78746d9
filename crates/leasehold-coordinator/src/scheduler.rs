//! Fixed-rate background tasks on the coordinator's tokio runtime.
//!
//! The coordinator owns one [`Scheduler`]. Lease handles submit their renewal
//! loop to it when activated and cancel it when deactivated; the coordinator
//! submits its sweep.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::LeaseError;

/// Spawns recurring tasks on a captured runtime handle.
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Handle,
}

impl Scheduler {
    /// Captures the runtime the caller is running on.
    pub fn current() -> Result<Self, LeaseError> {
        Handle::try_current()
            .map(|runtime| Scheduler { runtime })
            .map_err(|_| LeaseError::NoRuntime)
    }

    /// Runs `task` every `period`, the first run one period from now.
    ///
    /// Ticks missed while an iteration overruns are skipped rather than
    /// replayed in a burst. Iterations never overlap.
    pub fn schedule_fixed_rate<F, Fut>(
        &self,
        label: impl Into<String>,
        period: Duration,
        mut task: F,
    ) -> ScheduledTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = self.runtime.spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    // Fires on an explicit stop and when the sender is dropped.
                    _ = stop_rx.changed() => break,
                    _ = tick.tick() => {}
                }
                task().await;
            }
            tracing::debug!(task = %label, "scheduled task stopped");
        });

        ScheduledTask {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    /// Spawns a one-off future on the captured runtime.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }
}

/// Handle to a task started by [`Scheduler::schedule_fixed_rate`].
///
/// Dropping it stops the task after its current iteration.
#[derive(Debug)]
pub struct ScheduledTask {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Stops the task and waits until it has exited. No iteration is running
    /// once this returns.
    pub async fn cancel(mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Asks the task to stop without waiting for it.
    pub fn signal_stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn current_outside_runtime_fails() {
        assert!(matches!(Scheduler::current(), Err(LeaseError::NoRuntime)));
    }

    #[tokio::test]
    async fn runs_repeatedly_until_cancelled() {
        let scheduler = Scheduler::current().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let task = scheduler.schedule_fixed_rate("count", Duration::from_millis(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.cancel().await;
        let after_cancel = runs.load(Ordering::SeqCst);
        assert!(after_cancel >= 3, "only {after_cancel} runs");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn first_run_waits_one_period() {
        let scheduler = Scheduler::current().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let task = scheduler.schedule_fixed_rate("late", Duration::from_secs(60), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        task.cancel().await;
    }

    #[tokio::test]
    async fn dropping_handle_stops_task() {
        let scheduler = Scheduler::current().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let task = scheduler.schedule_fixed_rate("drop", Duration::from_millis(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(task);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let settled = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), settled);
    }
}
