//! Cached Marathon views refreshed once per reconciliation tick.
//!
//! The service-app list and the last successfully fetched deployment
//! state are kept behind `RwLock`s so readers (API surfaces, debugging)
//! never block a refresh. The progression driver consumes this type via
//! the `OrchestratorCache` and `ActivitySource` traits; activity reads
//! for finished-detection always go to Marathon directly rather than
//! through the cached copy.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::debug;

use stageline_progression::{ActivitySource, BoxFuture, DeploymentActivity, OrchestratorCache};

use crate::client::MarathonClient;
use crate::types::ServiceApp;

/// Last-known orchestrator deployment state with its fetch time.
#[derive(Debug, Clone, Default)]
pub struct LastKnownState {
    pub fetched_at_ms: u64,
    pub deployments: Vec<DeploymentActivity>,
}

#[derive(Clone)]
pub struct MarathonCache {
    client: MarathonClient,
    service_apps: Arc<RwLock<Vec<ServiceApp>>>,
    last_state: Arc<RwLock<LastKnownState>>,
}

impl MarathonCache {
    pub fn new(client: MarathonClient) -> Self {
        Self {
            client,
            service_apps: Arc::new(RwLock::new(Vec::new())),
            last_state: Arc::new(RwLock::new(LastKnownState::default())),
        }
    }

    /// Snapshot of the cached service-app list.
    pub async fn service_apps(&self) -> Vec<ServiceApp> {
        self.service_apps.read().await.clone()
    }

    /// Snapshot of the last successfully fetched deployment state.
    pub async fn last_state(&self) -> LastKnownState {
        self.last_state.read().await.clone()
    }
}

impl OrchestratorCache for MarathonCache {
    fn refresh_service_apps(&self) -> BoxFuture<anyhow::Result<()>> {
        let cache = self.clone();
        Box::pin(async move {
            let apps = cache.client.get_apps().await?;
            debug!(count = apps.len(), "service-app cache refreshed");
            *cache.service_apps.write().await = apps;
            Ok(())
        })
    }

    fn refresh_last_state(&self) -> BoxFuture<anyhow::Result<()>> {
        let cache = self.clone();
        Box::pin(async move {
            let deployments = cache.client.get_deployments().await?;
            let mut state = cache.last_state.write().await;
            state.fetched_at_ms = epoch_ms();
            state.deployments = deployments;
            Ok(())
        })
    }
}

impl ActivitySource for MarathonCache {
    fn deployments(&self) -> BoxFuture<anyhow::Result<Vec<DeploymentActivity>>> {
        let client = self.client.clone();
        Box::pin(async move { client.get_deployments().await })
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
