//! Domain types for the Stageline state store.
//!
//! These types represent the persisted state of managed applications: the
//! per-stage deployment strategy and transient deployment-progress record,
//! the history rows written when a deployment is finalized, and the
//! leadership lease. All types are serializable to/from JSON for storage
//! in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a managed application.
pub type AppName = String;

// ── Stages ────────────────────────────────────────────────────────

/// The three environment slots every application owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Dev,
    Stg,
    Prod,
}

impl StageName {
    /// All stages in reconciliation order.
    pub const ALL: [StageName; 3] = [StageName::Dev, StageName::Stg, StageName::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Dev => "dev",
            StageName::Stg => "stg",
            StageName::Prod => "prod",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Application ───────────────────────────────────────────────────

/// A managed application with its per-environment stage records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppRecord {
    pub name: AppName,
    /// Stage records keyed by environment name ("dev", "stg", "prod").
    pub stages: HashMap<String, StageRecord>,
    /// Unix timestamp (ms) when this record was created.
    pub created_at: u64,
    /// Unix timestamp (ms) when this record was last updated.
    pub updated_at: u64,
}

impl AppRecord {
    /// Look up a stage record by environment name.
    pub fn stage(&self, stage: StageName) -> Option<&StageRecord> {
        self.stages.get(stage.as_str())
    }
}

/// Per-environment deployment configuration and transient runtime state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub strategy: DeploymentStrategy,
    /// The live-progress record for the deployment currently in flight
    /// (if any). Cleared when the deployment is finalized to history.
    #[serde(default)]
    pub temp: TempDeployment,
}

/// How new versions reach this stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploymentStrategy {
    /// Stand up the new version alongside the old and shift traffic,
    /// instead of an in-place rolling update.
    pub bluegreen: bool,
    pub canary: CanaryStrategy,
}

/// Timed canary traffic-weight ramp parameters.
///
/// All windows are in minutes. `weight` is the only field the progression
/// controller mutates between passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CanaryStrategy {
    /// Advance the ramp automatically; when false the operator drives it.
    pub auto: bool,
    pub increase_minutes: u32,
    pub test_minutes: u32,
    pub decrease_minutes: u32,
    /// Current traffic weight routed to the new version (0..=100).
    pub weight: u32,
}

/// Transient progress record for a deployment in flight.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TempDeployment {
    /// Absent means no active deployment.
    pub status: Option<DeploymentStatus>,
    /// Orchestrator deployment id; absent makes finished-detection
    /// indeterminate until a new deployment starts.
    pub deployment_id: Option<String>,
    /// Unix timestamp (ms) when the deployment was initiated.
    pub start_time: Option<u64>,
    /// Unix timestamp (ms) when a rollback was initiated.
    pub rollback_start_time: Option<u64>,
    /// Unix timestamp (ms) when the orchestrator finished converging.
    /// Set at most once per deployment lifecycle; starts the canary timer.
    pub deployment_end_time: Option<u64>,
    /// Current canary ramp phase.
    pub current_step: Option<CanaryStep>,
    /// Whole minutes elapsed since `deployment_end_time`.
    pub minute_from_deployment: Option<u32>,
}

/// Deployment lifecycle status as driven by the progression controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Running,
    RunningRollback,
    Succeed,
    RollbackSucceed,
    Failed,
}

/// Phase of the canary traffic-weight ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryStep {
    Increase,
    Test,
    Decrease,
}

impl CanaryStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanaryStep::Increase => "increase",
            CanaryStep::Test => "test",
            CanaryStep::Decrease => "decrease",
        }
    }
}

// ── History ───────────────────────────────────────────────────────

/// One finalized deployment, written exactly once when a stage's temp
/// record is cleared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub app_name: AppName,
    pub stage: String,
    pub deployment_id: Option<String>,
    pub outcome: DeploymentStatus,
    /// Unix timestamp (ms) when the deployment (or rollback) started.
    pub started_at: Option<u64>,
    /// Unix timestamp (ms) when the deployment was finalized.
    pub finished_at: u64,
    /// Canary weight at finalization time.
    pub final_weight: u32,
}

impl HistoryRecord {
    /// Build the composite key for the history table.
    ///
    /// The deployment id disambiguates finalizations that land on the
    /// same millisecond, so one can never overwrite another.
    pub fn table_key(&self) -> String {
        format!(
            "{}/{}:{}:{}",
            self.app_name,
            self.stage,
            self.finished_at,
            self.deployment_id.as_deref().unwrap_or("")
        )
    }
}

// ── Leases ────────────────────────────────────────────────────────

/// A named leadership lease. Held by whichever node most recently
/// acquired or renewed it within the TTL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaseRecord {
    pub name: String,
    pub holder: String,
    /// Unix timestamp (ms) of first acquisition by the current holder.
    pub acquired_at: u64,
    /// Unix timestamp (ms) of the most recent renewal.
    pub renewed_at: u64,
    pub ttl_ms: u64,
}

impl LeaseRecord {
    /// Whether the lease has lapsed at `now_ms`.
    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms >= self.renewed_at + self.ttl_ms
    }
}
