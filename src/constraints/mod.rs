//! Scheduler-style predicates evaluating one pod against one node.
//!
//! Every predicate is pure and absent-safe: a missing spec, label map or
//! status is treated as empty, and no predicate fails with an error.

pub mod node_affinity;
pub mod node_status;
pub mod pod_affinity;
pub mod resources;
pub mod taints;
pub mod volumes;

use serde::Serialize;

pub use node_affinity::{check_node_affinity, node_selector_term_matches};
pub use node_status::check_node_readiness;
pub use pod_affinity::{check_pod_anti_affinity, label_selector_matches};
pub use resources::{check_resource_fit, sum_pod_requests, ResourceAxis, ResourceExplanation, ResourceShortage};
pub use taints::{check_taints, toleration_matches, TaintExplanation};
pub use volumes::{check_volume_binding, ClaimBinding, VolumeCheck, VolumeExplanation, VolumeKind};

/// Outcome of a single predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintResult {
    pub satisfied: bool,
    pub reasons: Vec<String>,
}

impl ConstraintResult {
    pub fn satisfied(reasons: Vec<String>) -> Self {
        Self { satisfied: true, reasons }
    }

    /// A failed result always carries at least one reason.
    pub fn unsatisfied(mut reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            reasons.push("constraint not satisfied".to_string());
        }
        Self { satisfied: false, reasons }
    }

    /// Failed when any failure reason was collected, otherwise satisfied with `info`.
    pub fn from_parts(failures: Vec<String>, info: Vec<String>) -> Self {
        if failures.is_empty() {
            Self::satisfied(info)
        } else {
            Self::unsatisfied(failures)
        }
    }

    pub fn failure_reasons(&self) -> &[String] {
        if self.satisfied {
            &[]
        } else {
            &self.reasons
        }
    }
}
