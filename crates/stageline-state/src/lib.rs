//! stageline-state — embedded state store for Stageline.
//!
//! Backed by [redb](https://docs.rs/redb), holds the authoritative
//! application records (with their per-stage deployment state), the
//! deployment history written on every finalization, and the leadership
//! lease used by the progression controller's elector.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{app}/{stage}:{finished_at}:{deployment_id}` for
//! history) enable prefix scans for related records.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
