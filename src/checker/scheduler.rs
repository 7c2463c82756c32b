use crate::checker::Checker;
use crate::collab::PeerProvider;
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the state at `Running` while a cycle is in progress, whoever triggered it.
pub(super) struct RunningCycle<'a> {
    state: &'a Mutex<SchedulerState>,
}

impl<'a> RunningCycle<'a> {
    pub(super) fn enter(state: &'a Mutex<SchedulerState>) -> Self {
        let mut current = lock(state);
        if *current != SchedulerState::Stopped {
            *current = SchedulerState::Running;
        }

        Self { state }
    }
}

impl Drop for RunningCycle<'_> {
    fn drop(&mut self) {
        let mut current = lock(self.state);
        if *current == SchedulerState::Running {
            *current = SchedulerState::Idle;
        }
    }
}

/// Keeps the metrics up to date by running a cycle every `interval`.
pub struct Scheduler<P> {
    checker: Arc<Checker<P>>,
    interval: Duration,
    shutdown: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P: PeerProvider + Send + Sync + 'static> Scheduler<P> {
    pub fn new(checker: Arc<Checker<P>>, interval: Duration) -> Self {
        Self {
            shutdown: checker.shutdown_token(),
            checker,
            interval,
            task_handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.checker.state()
    }

    /// Starts the periodic loop. The first cycle runs right away.
    pub fn start(&self) {
        let mut handle = lock(&self.task_handle);

        if handle.is_some() || self.shutdown.is_cancelled() {
            return;
        }

        let checker = self.checker.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = checker.run().await;
                if snapshot.has_error {
                    warn!("check cycle finished with errors");
                }
            }
        });

        *handle = Some(task);

        info!("Scheduler started with interval {:?}", self.interval);
    }

    /// Cancels in-flight probes and waits for the current cycle to wind down.
    ///
    /// Calling it again is a no-op.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let task = lock(&self.task_handle).take();

        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("scheduler task ended abnormally: {e}");
            }
        }

        if self.checker.mark_stopped() {
            info!("Scheduler stopped");
        }
    }
}
