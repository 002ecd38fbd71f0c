//! redb table definitions for the Stageline state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). History rows use composite
//! `{app}/{stage}:{finished_at}:{deployment_id}` keys so a prefix scan
//! returns one stage's records in finish order.

use redb::TableDefinition;

/// Application records keyed by `{name}`.
pub const APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("apps");

/// Name index keyed by `{name}`, rebuilt once per tick from `APPS`.
pub const APP_NAMES: TableDefinition<&str, &[u8]> = TableDefinition::new("app_names");

/// Deployment history keyed by `{app}/{stage}:{finished_at}:{deployment_id}`.
pub const HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("history");

/// Leadership leases keyed by `{lease_name}`.
pub const LEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("leases");
