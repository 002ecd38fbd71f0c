//! Deployment finalization — history write + temp-record clear.
//!
//! Finalizing moves a deployment out of its running state exactly once:
//! the outcome is appended to the history table and the stage's transient
//! progress record is cleared back to idle. A cleared record is what the
//! override guard keys on, so a second finalization attempt for the same
//! deployment is denied before it reaches this module.

use tracing::info;

use stageline_state::{
    AppRecord, DeploymentStatus, HistoryRecord, StageName, StageRecord, StateStore, TempDeployment,
};

use crate::error::EngineResult;

pub struct Finalizer {
    state: StateStore,
}

impl Finalizer {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Finalize a stage's deployment with the given terminal outcome.
    ///
    /// Rollback outcomes take their start time from the rollback start,
    /// regular outcomes from the deployment start.
    pub fn finish_deployment(
        &self,
        app: &AppRecord,
        record: &StageRecord,
        stage: StageName,
        outcome: DeploymentStatus,
        now_ms: u64,
    ) -> EngineResult<()> {
        let started_at = match outcome {
            DeploymentStatus::RollbackSucceed => record.temp.rollback_start_time,
            _ => record.temp.start_time,
        };

        self.state.put_history(&HistoryRecord {
            app_name: app.name.clone(),
            stage: stage.as_str().to_string(),
            deployment_id: record.temp.deployment_id.clone(),
            outcome,
            started_at,
            finished_at: now_ms,
            final_weight: record.strategy.canary.weight,
        })?;

        let mut cleared = record.clone();
        cleared.temp = TempDeployment::default();
        self.state.set_app_stage(app, stage, cleared)?;

        info!(app = %app.name, %stage, ?outcome, "deployment finalized");
        Ok(())
    }

    /// Promote a canary deployment whose ramp window has fully elapsed:
    /// weight goes to 100, the outcome is recorded as succeeded, and the
    /// transient record is cleared.
    ///
    /// Takes the application name rather than a snapshot — the promoted
    /// weight must land on the authoritative record.
    pub fn finish_manual_canary(
        &self,
        app_name: &str,
        stage: StageName,
        now_ms: u64,
    ) -> EngineResult<()> {
        let Some(app) = self.state.get_app(app_name)? else {
            return Ok(());
        };
        let Some(record) = app.stage(stage) else {
            return Ok(());
        };

        self.state.put_history(&HistoryRecord {
            app_name: app.name.clone(),
            stage: stage.as_str().to_string(),
            deployment_id: record.temp.deployment_id.clone(),
            outcome: DeploymentStatus::Succeed,
            started_at: record.temp.start_time,
            finished_at: now_ms,
            final_weight: 100,
        })?;

        let mut promoted = record.clone();
        promoted.strategy.canary.weight = 100;
        promoted.temp = TempDeployment::default();
        self.state.set_app_stage(&app, stage, promoted)?;

        info!(app = %app.name, %stage, "canary promoted to full traffic");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn running_app(deployment_id: &str) -> AppRecord {
        let mut record = StageRecord::default();
        record.temp.status = Some(DeploymentStatus::Running);
        record.temp.deployment_id = Some(deployment_id.to_string());
        record.temp.start_time = Some(1000);
        record.temp.rollback_start_time = Some(2000);
        record.strategy.canary.weight = 40;
        let mut stages = HashMap::new();
        stages.insert("prod".to_string(), record);
        AppRecord {
            name: "orders".to_string(),
            stages,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn finish_writes_history_and_clears_temp() {
        let state = StateStore::open_in_memory().unwrap();
        let app = running_app("d1");
        state.put_app(&app).unwrap();

        let finalizer = Finalizer::new(state.clone());
        let record = app.stage(StageName::Prod).unwrap().clone();
        finalizer
            .finish_deployment(&app, &record, StageName::Prod, DeploymentStatus::Succeed, 9000)
            .unwrap();

        let history = state.list_history("orders", StageName::Prod).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, DeploymentStatus::Succeed);
        assert_eq!(history[0].deployment_id, Some("d1".to_string()));
        assert_eq!(history[0].started_at, Some(1000));
        assert_eq!(history[0].finished_at, 9000);
        assert_eq!(history[0].final_weight, 40);

        let reread = state.get_app("orders").unwrap().unwrap();
        let temp = &reread.stage(StageName::Prod).unwrap().temp;
        assert!(temp.status.is_none());
        assert!(temp.deployment_id.is_none());
        assert!(temp.deployment_end_time.is_none());
    }

    #[test]
    fn rollback_outcome_uses_rollback_start_time() {
        let state = StateStore::open_in_memory().unwrap();
        let app = running_app("d1");
        state.put_app(&app).unwrap();

        let finalizer = Finalizer::new(state.clone());
        let record = app.stage(StageName::Prod).unwrap().clone();
        finalizer
            .finish_deployment(
                &app,
                &record,
                StageName::Prod,
                DeploymentStatus::RollbackSucceed,
                9000,
            )
            .unwrap();

        let history = state.list_history("orders", StageName::Prod).unwrap();
        assert_eq!(history[0].started_at, Some(2000));
    }

    #[test]
    fn manual_canary_promotes_weight_to_hundred() {
        let state = StateStore::open_in_memory().unwrap();
        let app = running_app("d1");
        state.put_app(&app).unwrap();

        let finalizer = Finalizer::new(state.clone());
        finalizer
            .finish_manual_canary("orders", StageName::Prod, 9000)
            .unwrap();

        let reread = state.get_app("orders").unwrap().unwrap();
        let stage = reread.stage(StageName::Prod).unwrap();
        assert_eq!(stage.strategy.canary.weight, 100);
        assert!(stage.temp.status.is_none());

        let history = state.list_history("orders", StageName::Prod).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].final_weight, 100);
        assert_eq!(history[0].outcome, DeploymentStatus::Succeed);
    }

    #[test]
    fn manual_canary_on_missing_app_is_a_noop() {
        let state = StateStore::open_in_memory().unwrap();
        let finalizer = Finalizer::new(state.clone());
        finalizer
            .finish_manual_canary("ghost", StageName::Prod, 9000)
            .unwrap();
        assert!(state.list_history("ghost", StageName::Prod).unwrap().is_empty());
    }
}
