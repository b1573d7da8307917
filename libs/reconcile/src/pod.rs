//! Observed pod state.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Annotation carrying the name of the unit a pod belongs to.
pub const UNIT_ANNOTATION: &str = "juju.io/unit";

/// A pod list as returned by the API server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: PodMetadata,
    #[serde(default)]
    pub status: PodPhase,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMetadata {
    pub name: Option<String>,
    pub annotations: Option<BTreeMap<String, String>>,
}

/// The `status` section of a pod.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodPhase {
    pub phase: Option<String>,
    pub conditions: Option<Vec<PodCondition>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

impl Pod {
    /// Unit named by the pod's annotation.
    pub fn unit_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(UNIT_ANNOTATION))
            .map(String::as_str)
    }
}

impl PodList {
    /// Status of the pod annotated with `unit_name`.
    ///
    /// A response that is not a non-empty pod list, or that has no pod for
    /// the unit, yields the unknown status.
    pub fn status_for_unit(&self, unit_name: &str) -> PodStatus {
        if self.kind != "PodList" || self.items.is_empty() {
            return PodStatus::unknown();
        }
        self.items
            .iter()
            .find(|pod| pod.unit_name() == Some(unit_name))
            .map(PodStatus::from_pod)
            .unwrap_or_else(PodStatus::unknown)
    }
}

/// Predicates derived from an observed pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodStatus {
    unknown: bool,
    running: bool,
    ready: bool,
}

impl PodStatus {
    /// Builds a status from raw predicates. Combinations the orchestrator
    /// would never report (ready but not running) are accepted.
    pub fn new(unknown: bool, running: bool, ready: bool) -> Self {
        Self {
            unknown,
            running,
            ready,
        }
    }

    /// No pod was found.
    pub fn unknown() -> Self {
        Self::new(true, false, false)
    }

    pub fn from_pod(pod: &Pod) -> Self {
        let running = pod.status.phase.as_deref() == Some("Running");
        let ready = pod
            .status
            .conditions
            .iter()
            .flatten()
            .find(|c| c.condition_type == "ContainersReady")
            .is_some_and(|c| c.status == "True");
        Self::new(false, running, ready)
    }

    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    pub fn is_running(&self) -> bool {
        !self.unknown && self.running
    }

    pub fn is_ready(&self) -> bool {
        !self.unknown && self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_list(value: serde_json::Value) -> PodList {
        serde_json::from_value(value).unwrap()
    }

    fn pod(unit: &str, phase: &str, ready: &str) -> serde_json::Value {
        json!({
            "metadata": {"annotations": {UNIT_ANNOTATION: unit}},
            "status": {
                "phase": phase,
                "conditions": [
                    {"type": "Initialized", "status": "True"},
                    {"type": "ContainersReady", "status": ready},
                ]
            }
        })
    }

    #[test]
    fn test_selects_pod_by_unit_annotation() {
        let list = pod_list(json!({
            "kind": "PodList",
            "items": [
                pod("alertmanager/1", "Pending", "False"),
                pod("alertmanager/0", "Running", "True"),
            ]
        }));

        let status = list.status_for_unit("alertmanager/0");
        assert!(!status.is_unknown());
        assert!(status.is_running());
        assert!(status.is_ready());

        let status = list.status_for_unit("alertmanager/1");
        assert!(!status.is_running());
        assert!(!status.is_ready());
    }

    #[test]
    fn test_missing_pod_is_unknown() {
        let list = pod_list(json!({
            "kind": "PodList",
            "items": [pod("alertmanager/1", "Running", "True")]
        }));
        assert!(list.status_for_unit("alertmanager/0").is_unknown());
    }

    #[test]
    fn test_non_pod_list_is_unknown() {
        let status = pod_list(json!({"kind": "Status", "items": []}))
            .status_for_unit("alertmanager/0");
        assert_eq!(status, PodStatus::unknown());

        let status = pod_list(json!({"kind": "PodList", "items": []}))
            .status_for_unit("alertmanager/0");
        assert!(status.is_unknown());
    }

    #[test]
    fn test_pod_without_annotations_or_conditions() {
        let list = pod_list(json!({
            "kind": "PodList",
            "items": [{"metadata": {"annotations": null}, "status": {"phase": "Running"}}]
        }));
        assert!(list.status_for_unit("alertmanager/0").is_unknown());

        let pod: Pod = serde_json::from_value(json!({"status": {"phase": "Running"}})).unwrap();
        let status = PodStatus::from_pod(&pod);
        assert!(status.is_running());
        assert!(!status.is_ready());
    }
}
