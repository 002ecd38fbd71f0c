//! Deployment-finished detection against orchestrator activity.

use serde::{Deserialize, Serialize};

/// One in-flight deployment as reported by the orchestrator.
///
/// The orchestrator returns richer records; only the id participates in
/// finished-detection, so everything else is ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentActivity {
    pub id: String,
}

/// Whether a stage's deployment is no longer active at the orchestrator.
///
/// True iff the id is present and non-empty AND no activity record
/// carries it. An absent or empty id returns false: without an id there
/// is no way to know, and "not finished" is the safe answer — it defers
/// finalization rather than risking a premature one.
pub fn is_deployment_finished(
    deployment_id: Option<&str>,
    activities: &[DeploymentActivity],
) -> bool {
    match deployment_id {
        Some(id) if !id.is_empty() => !activities.iter().any(|a| a.id == id),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: &str) -> DeploymentActivity {
        DeploymentActivity { id: id.to_string() }
    }

    #[test]
    fn still_listed_means_not_finished() {
        assert!(!is_deployment_finished(Some("d1"), &[activity("d1")]));
    }

    #[test]
    fn absent_from_empty_list_means_finished() {
        assert!(is_deployment_finished(Some("d1"), &[]));
    }

    #[test]
    fn absent_from_other_activity_means_finished() {
        assert!(is_deployment_finished(
            Some("d1"),
            &[activity("d2"), activity("d3")]
        ));
    }

    #[test]
    fn empty_id_is_never_finished() {
        assert!(!is_deployment_finished(Some(""), &[]));
        assert!(!is_deployment_finished(Some(""), &[activity("d1")]));
    }

    #[test]
    fn missing_id_is_never_finished() {
        assert!(!is_deployment_finished(None, &[]));
    }

    #[test]
    fn deserializes_ignoring_extra_fields() {
        let json = r#"[{"id":"d1","affectedApps":["/orders"],"steps":[]}]"#;
        let activities: Vec<DeploymentActivity> = serde_json::from_str(json).unwrap();
        assert_eq!(activities, vec![activity("d1")]);
    }
}
