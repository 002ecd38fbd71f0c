//! Optimistic-concurrency fence applied before every mutating action.
//!
//! The engine iterates over a snapshot of the application list that may
//! be stale by the time it decides to write: a user action, redeploy, or
//! delete can reset or remove a stage mid-pass. The guard re-fetches the
//! authoritative record immediately before the write and denies the
//! action when the stage no longer carries an active deployment. A
//! denial is a normal "skip this write" outcome, not an error.

use stageline_state::{StageName, StateStore};

use crate::error::EngineResult;

pub struct OverrideGuard {
    state: StateStore,
}

impl OverrideGuard {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Re-read the application by name and allow the pending write only
    /// if the stage still exists and its deployment status is set.
    pub fn allow(&self, app_name: &str, stage: StageName) -> EngineResult<bool> {
        let Some(app) = self.state.get_app(app_name)? else {
            return Ok(false);
        };
        let Some(record) = app.stage(stage) else {
            return Ok(false);
        };
        Ok(record.temp.status.is_some())
    }
}
