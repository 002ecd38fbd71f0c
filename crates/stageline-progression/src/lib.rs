//! stageline-progression — the deployment-progression core.
//!
//! A leader-gated tick driver reconciles every managed application's
//! per-environment deployment state against the orchestrator's reported
//! deployment activity: it stamps deployment end times, ramps canary
//! traffic weights on a timed schedule, and finalizes completed
//! deployments and rollbacks to history.
//!
//! # Architecture
//!
//! ```text
//! ProgressionDriver (tick every 3s, leader only)
//!   ├── StateStore (name index + application snapshot refresh)
//!   ├── OrchestratorCache (service-app / last-state refresh)
//!   ├── ActivitySource (fresh in-flight deployment list)
//!   └── Engine (per app × stage)
//!       ├── ramp      — canary weight arithmetic (pure)
//!       ├── finished  — deployment-activity predicate (pure)
//!       ├── guard     — optimistic re-read before every write
//!       └── finalizer — history write + temp-record clear
//! ```

pub mod driver;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod finished;
pub mod guard;
pub mod ramp;

pub use driver::{
    ActivitySource, BoxFuture, DriverConfig, Leadership, OrchestratorCache, ProgressionDriver,
    StepOutcome, TickReport, TickStep,
};
pub use engine::{Engine, EngineConfig, ReconcileSummary, StageFault, StageOutcome};
pub use error::{EngineError, EngineResult};
pub use finalize::Finalizer;
pub use finished::{is_deployment_finished, DeploymentActivity};
pub use guard::OverrideGuard;
pub use ramp::{ramp_point, IncreaseTimeBase, RampError, RampPoint};
