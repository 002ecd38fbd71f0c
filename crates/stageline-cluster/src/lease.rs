//! TTL lease elector.
//!
//! Every leadership check is an acquire-or-renew attempt: the current
//! holder renews cheaply, everyone else acquires only once the lease
//! has lapsed. The check is deliberately never cached — leadership can
//! move between ticks, and the driver re-asks on every one.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use stageline_progression::Leadership;
use stageline_state::StateStore;

const LEASE_NAME: &str = "progression-leader";

pub struct LeaseElector {
    state: StateStore,
    node_id: String,
    ttl: Duration,
}

impl LeaseElector {
    pub fn new(state: StateStore, node_id: impl Into<String>) -> Self {
        Self {
            state,
            node_id: node_id.into(),
            ttl: Duration::from_secs(10),
        }
    }

    /// Set the lease TTL. Must comfortably exceed the tick interval or
    /// leadership will flap between renewals.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Attempt to acquire or renew the lease at the given time.
    fn try_renew_at(&self, now_ms: u64) -> bool {
        match self.state.try_acquire_lease(
            LEASE_NAME,
            &self.node_id,
            self.ttl.as_millis() as u64,
            now_ms,
        ) {
            Ok(held) => {
                debug!(node = %self.node_id, held, "leadership lease checked");
                held
            }
            Err(e) => {
                // Unable to reach the store: claim nothing.
                warn!(node = %self.node_id, error = %e, "leadership lease check failed");
                false
            }
        }
    }
}

impl Leadership for LeaseElector {
    fn is_leader(&self) -> bool {
        self.try_renew_at(epoch_ms())
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elector(state: &StateStore, node: &str) -> LeaseElector {
        LeaseElector::new(state.clone(), node).with_ttl(Duration::from_millis(5000))
    }

    #[test]
    fn first_claimant_becomes_leader() {
        let state = StateStore::open_in_memory().unwrap();
        assert!(elector(&state, "node-1").try_renew_at(1000));
    }

    #[test]
    fn second_node_waits_for_expiry() {
        let state = StateStore::open_in_memory().unwrap();
        let a = elector(&state, "node-1");
        let b = elector(&state, "node-2");

        assert!(a.try_renew_at(1000));
        assert!(!b.try_renew_at(2000));

        // node-1 stops renewing; after the TTL node-2 takes over.
        assert!(b.try_renew_at(6000));
        assert!(!a.try_renew_at(7000));
    }

    #[test]
    fn holder_renews_indefinitely() {
        let state = StateStore::open_in_memory().unwrap();
        let a = elector(&state, "node-1");

        assert!(a.try_renew_at(1000));
        assert!(a.try_renew_at(5000));
        assert!(a.try_renew_at(9000));

        let lease = state.get_lease(LEASE_NAME).unwrap().unwrap();
        assert_eq!(lease.acquired_at, 1000);
        assert_eq!(lease.renewed_at, 9000);
    }

    #[test]
    fn wall_clock_check_works_end_to_end() {
        let state = StateStore::open_in_memory().unwrap();
        let a = elector(&state, "node-1");
        assert!(a.is_leader());
        assert!(a.is_leader());
    }
}
