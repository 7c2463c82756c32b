use crate::checker::result::CheckResult;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A published cycle result.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub result: Arc<CheckResult>,
    pub has_error: bool,
    created_at: Instant,
}

impl Snapshot {
    pub fn new(result: CheckResult) -> Self {
        Self {
            has_error: result.has_error(),
            result: Arc::new(result),
            created_at: Instant::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.has_error
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Holds the latest result and decides when it is too old to serve.
///
/// Snapshots are replaced whole, so readers never see a half-written result. Refreshes are
/// serialized: callers arriving while a cycle runs wait for it and reuse its result instead
/// of starting their own.
pub struct ResultCache {
    ttl: Duration,
    current: RwLock<Option<Snapshot>>,
    refresh: Mutex<()>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The latest snapshot, if it is younger than the freshness window.
    pub fn fresh(&self) -> Option<Snapshot> {
        self.latest().filter(|snapshot| snapshot.age() < self.ttl)
    }

    fn publish(&self, result: CheckResult) -> Snapshot {
        let snapshot = Snapshot::new(result);

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());

        snapshot
    }

    /// Serves the fresh snapshot, or runs `cycle` and publishes its result.
    pub async fn get_or_refresh<F, Fut>(&self, cycle: F) -> Snapshot
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CheckResult>,
    {
        if let Some(snapshot) = self.fresh() {
            return snapshot;
        }

        let _guard = self.refresh.lock().await;

        // Someone else may have refreshed while we waited
        if let Some(snapshot) = self.fresh() {
            return snapshot;
        }

        self.publish(cycle().await)
    }

    /// Runs `cycle` and publishes its result regardless of the current snapshot's age.
    pub async fn refresh<F, Fut>(&self, cycle: F) -> Snapshot
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CheckResult>,
    {
        let _guard = self.refresh.lock().await;

        self.publish(cycle().await)
    }
}
