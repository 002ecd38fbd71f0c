//! StateStore — redb-backed state persistence for Stageline.
//!
//! Provides typed CRUD operations over application records, the name
//! index, deployment history, and leadership leases. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(APPS).map_err(map_err!(Table))?;
        txn.open_table(APP_NAMES).map_err(map_err!(Table))?;
        txn.open_table(HISTORY).map_err(map_err!(Table))?;
        txn.open_table(LEASES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Applications ───────────────────────────────────────────────

    /// Insert or update an application record.
    pub fn put_app(&self, app: &AppRecord) -> StateResult<()> {
        let value = serde_json::to_vec(app).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            table
                .insert(app.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(app = %app.name, "application stored");
        Ok(())
    }

    /// Get an application by name.
    pub fn get_app(&self, name: &str) -> StateResult<Option<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let app: AppRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(app))
            }
            None => Ok(None),
        }
    }

    /// List all application records.
    pub fn list_apps(&self) -> StateResult<Vec<AppRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let app: AppRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(app);
        }
        Ok(results)
    }

    /// Delete an application by name. Returns true if it existed.
    pub fn delete_app(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(app = %name, existed, "application deleted");
        Ok(existed)
    }

    /// Replace one stage of an application and persist the whole record.
    ///
    /// Returns the updated record; callers must use the returned snapshot
    /// for any further checks in the same pass, not the one they passed in.
    pub fn set_app_stage(
        &self,
        app: &AppRecord,
        stage: StageName,
        record: StageRecord,
    ) -> StateResult<AppRecord> {
        let mut updated = app.clone();
        updated.stages.insert(stage.as_str().to_string(), record);
        self.put_app(&updated)?;
        Ok(updated)
    }

    // ── Name index ─────────────────────────────────────────────────

    /// Rebuild the name index from the applications table.
    ///
    /// Rewritten wholesale once per tick so lookups never see names of
    /// deleted applications.
    pub fn refresh_name_index(&self) -> StateResult<u32> {
        let names: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(APPS).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    Some(key.value().to_string())
                })
                .collect()
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APP_NAMES).map_err(map_err!(Table))?;
            // Clear stale entries before re-inserting.
            let stale: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    Some(key.value().to_string())
                })
                .collect();
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            for name in &names {
                table
                    .insert(name.as_str(), &b""[..])
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(names.len() as u32)
    }

    /// List all indexed application names.
    pub fn list_app_names(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APP_NAMES).map_err(map_err!(Table))?;
        let mut names = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }

    // ── History ────────────────────────────────────────────────────

    /// Append a finalized-deployment history record.
    pub fn put_history(&self, record: &HistoryRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, outcome = ?record.outcome, "history recorded");
        Ok(())
    }

    /// List history for one app/stage pair (by key prefix scan).
    pub fn list_history(&self, app_name: &str, stage: StageName) -> StateResult<Vec<HistoryRecord>> {
        let prefix = format!("{app_name}/{stage}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HISTORY).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: HistoryRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Leases ─────────────────────────────────────────────────────

    /// Try to acquire (or renew) a named lease for `holder` at `now_ms`.
    ///
    /// Succeeds when the lease is unheld, expired, or already held by this
    /// holder; the renewal timestamp is bumped on every success. Returns
    /// false when another holder's lease is still live.
    pub fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl_ms: u64,
        now_ms: u64,
    ) -> StateResult<bool> {
        let existing = self.get_lease(name)?;

        let acquired_at = match &existing {
            Some(lease) if lease.holder == holder && !lease.expired(now_ms) => lease.acquired_at,
            Some(lease) if !lease.expired(now_ms) => return Ok(false),
            _ => now_ms,
        };

        let lease = LeaseRecord {
            name: name.to_string(),
            holder: holder.to_string(),
            acquired_at,
            renewed_at: now_ms,
            ttl_ms,
        };
        let value = serde_json::to_vec(&lease).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LEASES).map_err(map_err!(Table))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(lease = %name, %holder, "lease acquired or renewed");
        Ok(true)
    }

    /// Get a lease by name.
    pub fn get_lease(&self, name: &str) -> StateResult<Option<LeaseRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LEASES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let lease: LeaseRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(lease))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_app(name: &str) -> AppRecord {
        let mut stages = HashMap::new();
        for stage in StageName::ALL {
            stages.insert(stage.as_str().to_string(), StageRecord::default());
        }
        AppRecord {
            name: name.to_string(),
            stages,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    // ── Application CRUD ───────────────────────────────────────────

    #[test]
    fn app_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let app = test_app("orders");

        store.put_app(&app).unwrap();
        let retrieved = store.get_app("orders").unwrap();

        assert_eq!(retrieved, Some(app));
    }

    #[test]
    fn app_get_missing_is_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_app("ghost").unwrap().is_none());
    }

    #[test]
    fn app_list_all() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_app(&test_app("orders")).unwrap();
        store.put_app(&test_app("billing")).unwrap();

        let all = store.list_apps().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn app_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_app(&test_app("orders")).unwrap();

        assert!(store.delete_app("orders").unwrap());
        assert!(!store.delete_app("orders").unwrap());
        assert!(store.get_app("orders").unwrap().is_none());
    }

    #[test]
    fn set_app_stage_returns_updated_snapshot() {
        let store = StateStore::open_in_memory().unwrap();
        let app = test_app("orders");
        store.put_app(&app).unwrap();

        let mut record = StageRecord::default();
        record.temp.status = Some(DeploymentStatus::Running);
        record.temp.deployment_id = Some("d1".to_string());

        let updated = store.set_app_stage(&app, StageName::Dev, record).unwrap();
        assert_eq!(
            updated.stage(StageName::Dev).unwrap().temp.status,
            Some(DeploymentStatus::Running)
        );

        // The write is persisted, not just reflected in the return value.
        let reread = store.get_app("orders").unwrap().unwrap();
        assert_eq!(
            reread.stage(StageName::Dev).unwrap().temp.deployment_id,
            Some("d1".to_string())
        );
    }

    // ── Name index ─────────────────────────────────────────────────

    #[test]
    fn name_index_tracks_apps() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_app(&test_app("orders")).unwrap();
        store.put_app(&test_app("billing")).unwrap();

        let count = store.refresh_name_index().unwrap();
        assert_eq!(count, 2);

        let mut names = store.list_app_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["billing".to_string(), "orders".to_string()]);
    }

    #[test]
    fn name_index_drops_deleted_apps() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_app(&test_app("orders")).unwrap();
        store.put_app(&test_app("billing")).unwrap();
        store.refresh_name_index().unwrap();

        store.delete_app("billing").unwrap();
        store.refresh_name_index().unwrap();

        assert_eq!(store.list_app_names().unwrap(), vec!["orders".to_string()]);
    }

    // ── History ────────────────────────────────────────────────────

    #[test]
    fn history_put_and_list_by_stage() {
        let store = StateStore::open_in_memory().unwrap();

        for finished_at in [5000u64, 6000, 7000] {
            store
                .put_history(&HistoryRecord {
                    app_name: "orders".to_string(),
                    stage: "prod".to_string(),
                    deployment_id: Some("d1".to_string()),
                    outcome: DeploymentStatus::Succeed,
                    started_at: Some(1000),
                    finished_at,
                    final_weight: 100,
                })
                .unwrap();
        }
        store
            .put_history(&HistoryRecord {
                app_name: "orders".to_string(),
                stage: "dev".to_string(),
                deployment_id: None,
                outcome: DeploymentStatus::RollbackSucceed,
                started_at: None,
                finished_at: 8000,
                final_weight: 0,
            })
            .unwrap();

        let prod = store.list_history("orders", StageName::Prod).unwrap();
        assert_eq!(prod.len(), 3);

        let dev = store.list_history("orders", StageName::Dev).unwrap();
        assert_eq!(dev.len(), 1);
        assert_eq!(dev[0].outcome, DeploymentStatus::RollbackSucceed);
    }

    #[test]
    fn history_same_millisecond_keeps_both_records() {
        let store = StateStore::open_in_memory().unwrap();

        for id in ["d1", "d2"] {
            store
                .put_history(&HistoryRecord {
                    app_name: "orders".to_string(),
                    stage: "prod".to_string(),
                    deployment_id: Some(id.to_string()),
                    outcome: DeploymentStatus::Succeed,
                    started_at: Some(1000),
                    finished_at: 5000,
                    final_weight: 100,
                })
                .unwrap();
        }

        let prod = store.list_history("orders", StageName::Prod).unwrap();
        assert_eq!(prod.len(), 2);
    }

    // ── Leases ─────────────────────────────────────────────────────

    #[test]
    fn lease_acquire_fresh() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.try_acquire_lease("leader", "node-1", 5000, 1000).unwrap());

        let lease = store.get_lease("leader").unwrap().unwrap();
        assert_eq!(lease.holder, "node-1");
        assert_eq!(lease.acquired_at, 1000);
    }

    #[test]
    fn lease_contention_denied_until_expiry() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.try_acquire_lease("leader", "node-1", 5000, 1000).unwrap());

        // Another node cannot steal a live lease.
        assert!(!store.try_acquire_lease("leader", "node-2", 5000, 2000).unwrap());

        // After expiry it can.
        assert!(store.try_acquire_lease("leader", "node-2", 5000, 6000).unwrap());
        let lease = store.get_lease("leader").unwrap().unwrap();
        assert_eq!(lease.holder, "node-2");
        assert_eq!(lease.acquired_at, 6000);
    }

    #[test]
    fn lease_renewal_preserves_acquired_at() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.try_acquire_lease("leader", "node-1", 5000, 1000).unwrap());
        assert!(store.try_acquire_lease("leader", "node-1", 5000, 3000).unwrap());

        let lease = store.get_lease("leader").unwrap().unwrap();
        assert_eq!(lease.acquired_at, 1000);
        assert_eq!(lease.renewed_at, 3000);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_app(&test_app("orders")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let app = store.get_app("orders").unwrap();
        assert!(app.is_some());
        assert_eq!(app.unwrap().name, "orders");
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_apps().unwrap().is_empty());
        assert!(store.list_app_names().unwrap().is_empty());
        assert!(store.list_history("any", StageName::Dev).unwrap().is_empty());
        assert!(store.get_lease("leader").unwrap().is_none());
        assert!(!store.delete_app("nope").unwrap());
        assert_eq!(store.refresh_name_index().unwrap(), 0);
    }
}
