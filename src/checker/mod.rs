//! The check cycle.
//!
//! One cycle runs the four fixed checks in order (direct, DNS, ingress, service), then
//! discovers the neighbourhood and checks the ring-selected neighbours concurrently. The
//! result replaces the cached snapshot that `/alive` serves.

pub mod cache;
pub mod probe;
pub mod result;
pub mod scheduler;

use crate::{
    checker::{
        cache::{ResultCache, Snapshot},
        probe::{NEIGHBOUR_ORIGIN_HEADER, Prober},
        result::{CheckOutcome, CheckResult},
        scheduler::{RunningCycle, SchedulerState, lock},
    },
    collab::{NodePhase, Peer, PeerProvider, select_neighbours},
    config::CheckerConfig,
    metrics::InstrumentationSink,
};
use anyhow::{Result, anyhow};
use chrono::Utc;
use futures::{StreamExt, stream};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const API_SERVER_DIRECT: &str = "api_server_direct";
pub const API_SERVER_DNS: &str = "api_server_dns";
pub const ME_INGRESS: &str = "me_ingress";
pub const ME_SERVICE: &str = "me_service";

/// Runs `check`, records its duration under `label` and, on failure, counts an error.
///
/// Failures are returned as [`CheckOutcome::Error`], never retried.
pub async fn measure<Fut>(sink: &dyn InstrumentationSink, label: &str, check: Fut) -> CheckOutcome
where
    Fut: Future<Output = Result<()>>,
{
    let start = Instant::now();

    let result = check.await;

    sink.observe_duration(label, start.elapsed().as_secs_f64());

    match result {
        Ok(()) => CheckOutcome::Ok,
        Err(e) => {
            warn!("failed request for {label}: {e:#}");
            sink.increment_error(label);
            CheckOutcome::Error(format!("{e:#}"))
        }
    }
}

struct Neighbourhood {
    state: CheckOutcome,
    peers: Vec<Peer>,
    checks: BTreeMap<String, CheckOutcome>,
}

impl Neighbourhood {
    fn unchecked(state: CheckOutcome) -> Self {
        Self {
            state,
            peers: Vec::new(),
            checks: BTreeMap::new(),
        }
    }
}

pub struct Checker<P> {
    config: CheckerConfig,
    prober: Prober,
    provider: P,
    sink: Arc<dyn InstrumentationSink>,
    cache: ResultCache,
    shutdown: CancellationToken,
    state: Mutex<SchedulerState>,
    last_selection: Mutex<Option<usize>>,
}

impl<P: PeerProvider + Send + Sync> Checker<P> {
    pub fn new(
        config: CheckerConfig,
        prober: Prober,
        provider: P,
        sink: Arc<dyn InstrumentationSink>,
    ) -> Self {
        Self {
            cache: ResultCache::new(config.cache_ttl),
            config,
            prober,
            provider,
            sink,
            shutdown: CancellationToken::new(),
            state: Mutex::new(SchedulerState::Idle),
            last_selection: Mutex::new(None),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Cancelling this token aborts every in-flight probe.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    /// Moves to the terminal `Stopped` state. Returns whether this call did it.
    pub(crate) fn mark_stopped(&self) -> bool {
        let mut state = lock(&self.state);
        let changed = *state != SchedulerState::Stopped;
        *state = SchedulerState::Stopped;
        changed
    }

    /// The cached snapshot, recomputed first if it is older than the freshness window.
    ///
    /// After shutdown no cycle runs anymore: the last snapshot is served as-is, or a
    /// healthy all-skipped result if none was ever published.
    pub async fn get_current(&self) -> Snapshot {
        if self.shutdown.is_cancelled() {
            return self
                .cache
                .latest()
                .unwrap_or_else(|| Snapshot::new(CheckResult::skipped()));
        }

        self.cache.get_or_refresh(|| self.tracked_cycle()).await
    }

    /// Runs a full cycle and publishes it, ignoring the cache.
    pub async fn run(&self) -> Snapshot {
        self.cache.refresh(|| self.tracked_cycle()).await
    }

    async fn tracked_cycle(&self) -> CheckResult {
        let _running = RunningCycle::enter(&self.state);

        self.run_cycle().await
    }

    async fn run_cycle(&self) -> CheckResult {
        let targets = &self.config.targets;
        let enabled = self.config.enabled;

        let api_server_direct = self
            .fixed_check(
                API_SERVER_DIRECT,
                enabled.api_server_direct,
                &targets.api_server_direct,
            )
            .await;
        let api_server_dns = self
            .fixed_check(API_SERVER_DNS, enabled.api_server_dns, &targets.api_server_dns)
            .await;
        let me_ingress = self
            .fixed_check(ME_INGRESS, enabled.me_ingress, &targets.me_ingress)
            .await;
        let me_service = self
            .fixed_check(ME_SERVICE, enabled.me_service, &targets.me_service)
            .await;

        let neighbourhood = if enabled.neighbourhood {
            self.check_neighbourhood().await
        } else {
            Neighbourhood::unchecked(CheckOutcome::Skipped)
        };

        CheckResult {
            api_server_direct,
            api_server_dns,
            me_ingress,
            me_service,
            neighbourhood_state: neighbourhood.state,
            neighbourhood: neighbourhood.peers,
            neighbour_checks: neighbourhood.checks,
            checked_at: Utc::now(),
        }
    }

    async fn fixed_check(&self, label: &str, enabled: bool, url: &str) -> CheckOutcome {
        if !enabled {
            return CheckOutcome::Skipped;
        }

        measure(
            self.sink.as_ref(),
            label,
            self.prober.get(url, &[], &self.shutdown),
        )
        .await
    }

    async fn discover(&self) -> Result<Vec<Peer>> {
        let list = self
            .provider
            .list(&self.config.namespace, &self.config.neighbour_filter);

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(anyhow!("neighbour discovery cancelled")),
            peers = list => peers,
        }
    }

    async fn check_neighbourhood(&self) -> Neighbourhood {
        let discovered = match self.discover().await {
            Ok(peers) => peers,
            Err(e) => {
                error!("failed to discover neighbours: {e:#}");
                return Neighbourhood::unchecked(CheckOutcome::Error(format!("{e:#}")));
            }
        };

        let allow_unschedulable = self.config.allow_unschedulable;
        let peers: Vec<Peer> = discovered
            .into_iter()
            .filter(|peer| allow_unschedulable || peer.phase != NodePhase::Unschedulable)
            .collect();

        let selected = select_neighbours(
            &self.config.node_name,
            &peers,
            self.config.neighbour_limit,
        );

        self.sink.record_neighbourhood(peers.len(), selected.len());
        self.log_selection_change(selected.len());

        let node_name = self.config.node_name.as_str();
        let port = self.config.neighbour_port;

        let probes: Vec<(String, String)> = selected
            .iter()
            .map(|peer| (peer.metric_label(), peer.probe_url(port)))
            .collect();

        let checks = stream::iter(probes)
            .map(|(label, url)| async move {
                let headers = [(NEIGHBOUR_ORIGIN_HEADER, node_name)];
                let outcome = measure(
                    self.sink.as_ref(),
                    &label,
                    self.prober.get(&url, &headers, &self.shutdown),
                )
                .await;
                (label, outcome)
            })
            .buffer_unordered(self.config.neighbour_concurrency.max(1))
            .collect()
            .await;

        Neighbourhood {
            state: CheckOutcome::Ok,
            peers,
            checks,
        }
    }

    fn log_selection_change(&self, selected: usize) {
        let mut last = lock(&self.last_selection);

        if *last != Some(selected) {
            info!(
                "Neighbour selection changed: old='{}', new='{}'",
                last.map(|n| n.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                selected
            );
            *last = Some(selected);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::collab::discovery::testing::StaticPeers;
    use crate::metrics::testing::RecordingSink;
    use reqwest::Client;
    use std::time::Duration;

    pub fn test_checker(
        config: CheckerConfig,
        provider: StaticPeers,
    ) -> (Checker<StaticPeers>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let prober = Prober::new(Client::new(), Duration::from_secs(2), sink.clone());
        let checker = Checker::new(config, prober, provider, sink.clone());

        (checker, sink)
    }
}
