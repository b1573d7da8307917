//! Reconciliation of observed pod state into unit status.
//!
//! This library maps what the orchestrator reports about a unit's pod onto
//! the small status vocabulary the unit exposes to operators. Key concepts:
//!
//! - **Pod status**: observed state, fetched fresh on every tick and never
//!   persisted. A missing pod is a valid observation, not an error.
//! - **Unit status**: derived from pod status by a fixed priority chain.
//! - **Readiness loop**: polls until the unit becomes active.
//!
//! # Invariants
//!
//! - The status decision is total and deterministic
//! - The loop sleeps between polls and never spins

mod pod;
mod readiness;
mod status;

use thiserror::Error;

pub use pod::{Pod, PodCondition, PodList, PodMetadata, PodPhase, PodStatus, UNIT_ANNOTATION};
pub use readiness::{reconcile_once, wait_for_ready, PodStatusSource, ReadinessConfig};
pub use status::{build_unit_status, unit_status_for};

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Pod status could not be fetched.
    #[error("failed to fetch pod status: {0}")]
    Fetch(#[source] anyhow::Error),

    /// Unit status could not be published.
    #[error("failed to set unit status: {0}")]
    Publish(#[from] charm_framework::ModelError),
}
