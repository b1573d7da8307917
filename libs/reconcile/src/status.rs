//! Unit status decision function.

use charm_framework::Status;

use crate::PodStatus;

/// Maps observed pod state onto the unit status.
///
/// First match wins: an unknown pod is reported as such regardless of the
/// other predicates, and readiness only matters once the pod runs.
pub fn unit_status_for(unknown: bool, running: bool, ready: bool) -> Status {
    if unknown {
        Status::maintenance("Waiting for pod to appear")
    } else if !running {
        Status::maintenance("Pod is starting")
    } else if !ready {
        Status::maintenance("Pod is getting ready")
    } else {
        Status::active()
    }
}

pub fn build_unit_status(pod_status: &PodStatus) -> Status {
    unit_status_for(
        pod_status.is_unknown(),
        pod_status.is_running(),
        pod_status.is_ready(),
    )
}
