//! stageline-marathon — Marathon/DC-OS orchestrator surface.
//!
//! A thin HTTP client over Marathon's v2 API plus the cached cluster
//! views the progression driver refreshes at the top of each tick. The
//! progression core never calls Marathon directly; it consumes this
//! crate through the `ActivitySource` and `OrchestratorCache` traits.

pub mod cache;
pub mod client;
pub mod types;

pub use cache::MarathonCache;
pub use client::MarathonClient;
pub use types::ServiceApp;
