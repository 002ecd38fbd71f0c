//! Reconciliation engine — advances every stage's deployment state machine.
//!
//! The engine walks the application snapshot × {dev, stg, prod} and, for
//! each stage with an active deployment, decides one action for this
//! pass: stamp the deployment end time, adjust the canary weight, promote
//! a fully-ramped canary, or finalize a finished deployment/rollback.
//! Every write is preceded by the override guard, and a fault in one
//! (application, stage) pair never stops the rest of the pass.

use tracing::{debug, warn};

use stageline_state::{AppRecord, CanaryStep, DeploymentStatus, StageName, StateStore};

use crate::error::{EngineError, EngineResult};
use crate::finalize::Finalizer;
use crate::finished::{is_deployment_finished, DeploymentActivity};
use crate::guard::OverrideGuard;
use crate::ramp::{ramp_point, IncreaseTimeBase};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long after a deployment (or rollback) start before finished
    /// checks begin — gives the orchestrator time to register the new
    /// deployment in its activity list.
    pub debounce_ms: u64,
    /// Time base for the canary increase phase (see [`IncreaseTimeBase`]).
    pub increase_time_base: IncreaseTimeBase,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            increase_time_base: IncreaseTimeBase::default(),
        }
    }
}

/// What the engine did (or declined to do) for one stage this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// No active deployment, or a terminal status this core leaves alone.
    Idle,
    /// Inside the post-start settle window; no finished check yet.
    Debounced,
    /// Deployment still in flight at the orchestrator; nothing to do.
    InFlight,
    /// Blue-green without auto canary: progression is operator-driven.
    UserDriven,
    /// Deployment end time stamped; the canary timer starts here.
    EndTimeRecorded,
    /// Canary weight moved to a new value.
    WeightAdjusted { weight: u32, step: CanaryStep },
    /// Ramp evaluated to the already-stored weight; no write issued.
    WeightHeld,
    /// Deployment finalized to history with this outcome.
    Finalized(DeploymentStatus),
    /// Ramp window fully elapsed; canary promoted to 100%.
    CanaryPromoted,
    /// The override guard vetoed the pending write; skipped silently.
    GuardDenied,
}

/// A per-stage failure captured without aborting the pass.
#[derive(Debug)]
pub struct StageFault {
    pub app: String,
    pub stage: StageName,
    pub error: EngineError,
}

/// Result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub outcomes: Vec<(String, StageName, StageOutcome)>,
    pub faults: Vec<StageFault>,
}

impl ReconcileSummary {
    /// Outcome for one (application, stage) pair, if it was processed.
    pub fn outcome(&self, app: &str, stage: StageName) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|(a, s, _)| a == app && *s == stage)
            .map(|(_, _, o)| o)
    }
}

pub struct Engine {
    state: StateStore,
    guard: OverrideGuard,
    finalizer: Finalizer,
    config: EngineConfig,
}

impl Engine {
    pub fn new(state: StateStore) -> Self {
        Self::with_config(state, EngineConfig::default())
    }

    pub fn with_config(state: StateStore, config: EngineConfig) -> Self {
        Self {
            guard: OverrideGuard::new(state.clone()),
            finalizer: Finalizer::new(state.clone()),
            state,
            config,
        }
    }

    /// Run one reconciliation pass over an application snapshot and a
    /// freshly fetched orchestrator activity list.
    pub fn reconcile(
        &self,
        apps: &[AppRecord],
        activities: &[DeploymentActivity],
        now_ms: u64,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        for app in apps {
            for stage in StageName::ALL {
                match self.reconcile_stage(app, stage, activities, now_ms) {
                    Ok(outcome) => {
                        if outcome != StageOutcome::Idle {
                            debug!(app = %app.name, %stage, ?outcome, "stage reconciled");
                        }
                        summary.outcomes.push((app.name.clone(), stage, outcome));
                    }
                    Err(error) => {
                        warn!(app = %app.name, %stage, %error, "stage reconciliation failed");
                        summary.faults.push(StageFault {
                            app: app.name.clone(),
                            stage,
                            error,
                        });
                    }
                }
            }
        }

        summary
    }

    fn reconcile_stage(
        &self,
        app: &AppRecord,
        stage: StageName,
        activities: &[DeploymentActivity],
        now_ms: u64,
    ) -> EngineResult<StageOutcome> {
        let record = app.stage(stage).cloned().ok_or_else(|| {
            EngineError::DataIntegrity(format!("{}/{stage}: missing stage record", app.name))
        })?;

        let status = match record.temp.status {
            Some(s @ (DeploymentStatus::Running | DeploymentStatus::RunningRollback)) => s,
            _ => return Ok(StageOutcome::Idle),
        };

        // Settle window: don't consult the activity list until the
        // orchestrator has had time to register the new deployment.
        let started = match status {
            DeploymentStatus::RunningRollback => record.temp.rollback_start_time,
            _ => record.temp.start_time,
        };
        let settled = matches!(started, Some(t) if now_ms >= t + self.config.debounce_ms);
        if !settled {
            return Ok(StageOutcome::Debounced);
        }

        let finished = is_deployment_finished(record.temp.deployment_id.as_deref(), activities);

        if status == DeploymentStatus::RunningRollback {
            if !finished {
                return Ok(StageOutcome::InFlight);
            }
            if !self.guard.allow(&app.name, stage)? {
                return Ok(StageOutcome::GuardDenied);
            }
            self.finalizer.finish_deployment(
                app,
                &record,
                stage,
                DeploymentStatus::RollbackSucceed,
                now_ms,
            )?;
            return Ok(StageOutcome::Finalized(DeploymentStatus::RollbackSucceed));
        }

        let bluegreen = record.strategy.bluegreen;
        let auto = record.strategy.canary.auto;
        let end_time = record.temp.deployment_end_time;

        // The orchestrator just converged: stamp the end time once. This
        // starts the canary timer and is independent of strategy.
        if finished && end_time.is_none() {
            let mut stamped = record;
            stamped.temp.deployment_end_time = Some(now_ms);
            // The write returns the authoritative snapshot; everything
            // after this point in the iteration must use it.
            let app = self.state.set_app_stage(app, stage, stamped)?;
            if self.guard.allow(&app.name, stage)? {
                self.state.put_app(&app)?;
            }
            return Ok(StageOutcome::EndTimeRecorded);
        }

        if bluegreen && !auto {
            // Progression is driven by the operator.
            return Ok(StageOutcome::UserDriven);
        }

        if bluegreen && auto {
            let Some(end_ms) = end_time else {
                return Ok(StageOutcome::InFlight);
            };

            let point = ramp_point(
                end_ms,
                now_ms,
                &record.strategy.canary,
                self.config.increase_time_base,
            )
            .map_err(|e| EngineError::DataIntegrity(format!("{}/{stage}: {e}", app.name)))?;

            return match point {
                Some(point) => {
                    if point.weight == record.strategy.canary.weight {
                        return Ok(StageOutcome::WeightHeld);
                    }
                    let mut adjusted = record;
                    adjusted.temp.current_step = Some(point.step);
                    adjusted.temp.minute_from_deployment = Some(point.minutes_elapsed);
                    adjusted.strategy.canary.weight = point.weight;
                    let app = self.state.set_app_stage(app, stage, adjusted)?;
                    if self.guard.allow(&app.name, stage)? {
                        self.state.put_app(&app)?;
                    }
                    Ok(StageOutcome::WeightAdjusted {
                        weight: point.weight,
                        step: point.step,
                    })
                }
                None => {
                    if !self.guard.allow(&app.name, stage)? {
                        return Ok(StageOutcome::GuardDenied);
                    }
                    self.finalizer.finish_manual_canary(&app.name, stage, now_ms)?;
                    Ok(StageOutcome::CanaryPromoted)
                }
            };
        }

        // Plain strategy (or blue-green whose end time is still unset and
        // whose deployment is still listed): finalize once finished.
        if !finished {
            return Ok(StageOutcome::InFlight);
        }
        if !self.guard.allow(&app.name, stage)? {
            return Ok(StageOutcome::GuardDenied);
        }
        self.finalizer
            .finish_deployment(app, &record, stage, DeploymentStatus::Succeed, now_ms)?;
        Ok(StageOutcome::Finalized(DeploymentStatus::Succeed))
    }
}
