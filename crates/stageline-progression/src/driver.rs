//! Leader-gated tick driver.
//!
//! A fixed-period loop that, while this process holds cluster
//! leadership, refreshes the cached views and runs one reconciliation
//! pass. The five steps of a tick are failure-isolated: a broken cache
//! refresh or orchestrator fetch is reported and the remaining steps
//! still run. Passes never overlap — the next tick is scheduled only
//! after the previous one fully completes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use stageline_state::{AppRecord, StateStore};

use crate::engine::Engine;
use crate::finished::DeploymentActivity;

/// Boxed future for dyn-compatible collaborator traits.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Cluster leadership check. Cheap; consulted on every tick and never
/// cached, since leadership can move between ticks.
pub trait Leadership: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Fresh orchestrator deployment-activity fetch, once per pass.
pub trait ActivitySource: Send + Sync {
    fn deployments(&self) -> BoxFuture<anyhow::Result<Vec<DeploymentActivity>>>;
}

/// Orchestrator-side cached views refreshed at the top of each tick.
pub trait OrchestratorCache: Send + Sync {
    fn refresh_service_apps(&self) -> BoxFuture<anyhow::Result<()>>;
    fn refresh_last_state(&self) -> BoxFuture<anyhow::Result<()>>;
}

/// Driver timing and gating configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Delay before the first tick after startup.
    pub initial_delay: Duration,
    /// Fixed delay between the end of one pass and the start of the next.
    pub tick_interval: Duration,
    /// Gate polarity: reconcile when the leadership check equals this
    /// value. The intended semantics — run only while holding
    /// leadership — is `true`, the default.
    pub run_when_leader: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            tick_interval: Duration::from_millis(3000),
            run_when_leader: true,
        }
    }
}

/// The five failure-isolated steps of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStep {
    NameRefresh,
    AppRefresh,
    ServiceCacheRefresh,
    LastStateRefresh,
    Reconcile,
}

/// One step's result within a tick.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: TickStep,
    pub error: Option<String>,
}

/// Structured record of one tick, failed steps included.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// What the leadership check returned.
    pub leader: bool,
    /// Whether the gate let this tick run its steps.
    pub executed: bool,
    pub steps: Vec<StepOutcome>,
}

impl TickReport {
    fn skipped(leader: bool) -> Self {
        Self {
            leader,
            executed: false,
            steps: Vec::new(),
        }
    }

    /// Errors of the steps that failed this tick.
    pub fn failures(&self) -> Vec<(TickStep, &str)> {
        self.steps
            .iter()
            .filter_map(|s| s.error.as_deref().map(|e| (s.step, e)))
            .collect()
    }

    pub fn step_error(&self, step: TickStep) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .and_then(|s| s.error.as_deref())
    }
}

/// Drives the reconciliation engine from a periodic timer.
pub struct ProgressionDriver<L, A, C> {
    state: StateStore,
    engine: Engine,
    leadership: L,
    activity: A,
    cache: C,
    config: DriverConfig,
    /// Application snapshot iterated by the engine. Refreshed once per
    /// tick; kept from the previous tick when the refresh fails.
    apps: Vec<AppRecord>,
}

impl<L, A, C> ProgressionDriver<L, A, C>
where
    L: Leadership,
    A: ActivitySource,
    C: OrchestratorCache,
{
    pub fn new(
        state: StateStore,
        engine: Engine,
        leadership: L,
        activity: A,
        cache: C,
        config: DriverConfig,
    ) -> Self {
        Self {
            state,
            engine,
            leadership,
            activity,
            cache,
            config,
            apps: Vec::new(),
        }
    }

    /// Execute one tick: leadership gate, cache refreshes, reconcile.
    pub async fn tick(&mut self) -> TickReport {
        let leader = self.leadership.is_leader();
        if leader != self.config.run_when_leader {
            debug!(leader, "tick skipped by leadership gate");
            return TickReport::skipped(leader);
        }

        let mut report = TickReport {
            leader,
            executed: true,
            steps: Vec::new(),
        };

        let result = self.state.refresh_name_index().map(|_| ());
        record_step(&mut report, TickStep::NameRefresh, result.map_err(Into::into));

        let result = match self.state.list_apps() {
            Ok(apps) => {
                self.apps = apps;
                Ok(())
            }
            // Keep the previous snapshot; the guard re-reads before any
            // write, so stale iteration input is safe.
            Err(e) => Err(e.into()),
        };
        record_step(&mut report, TickStep::AppRefresh, result);

        let result = self.cache.refresh_service_apps().await;
        record_step(&mut report, TickStep::ServiceCacheRefresh, result);

        let result = self.cache.refresh_last_state().await;
        record_step(&mut report, TickStep::LastStateRefresh, result);

        let result = match self.activity.deployments().await {
            Ok(activities) => {
                let summary = self.engine.reconcile(&self.apps, &activities, epoch_ms());
                debug!(
                    stages = summary.outcomes.len(),
                    faults = summary.faults.len(),
                    "reconciliation pass completed"
                );
                Ok(())
            }
            // Without a trustworthy activity list every deployment would
            // look finished; skip the pass instead.
            Err(e) => Err(e),
        };
        record_step(&mut report, TickStep::Reconcile, result);

        report
    }

    /// Run the tick loop until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            initial_delay_ms = self.config.initial_delay.as_millis() as u64,
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            "progression driver started"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.config.initial_delay) => {}
            _ = shutdown.changed() => {
                info!("progression driver shutting down");
                return;
            }
        }

        loop {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                _ = shutdown.changed() => {
                    info!("progression driver shutting down");
                    break;
                }
            }
        }
    }
}

fn record_step(report: &mut TickReport, step: TickStep, result: anyhow::Result<()>) {
    let error = result.err().map(|e| e.to_string());
    if let Some(ref e) = error {
        warn!(?step, error = %e, "tick step failed");
    }
    report.steps.push(StepOutcome { step, error });
}

/// Current Unix epoch in milliseconds.
fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
