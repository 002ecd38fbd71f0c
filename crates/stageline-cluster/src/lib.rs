//! stageline-cluster — leadership election for peer replicas.
//!
//! Exactly one replica may advance deployment state at a time. The
//! elector competes for a named TTL lease in the shared state store:
//! whoever holds a live lease is the leader, and a crashed leader's
//! lease simply lapses after the TTL, letting a peer take over.

pub mod lease;

pub use lease::LeaseElector;
