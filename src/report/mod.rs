use serde::Serialize;

use crate::health::{HealthStatus, PodHealthScore};
use crate::issues::{ClusterIssues, NamespaceErrorReport};
use crate::scheduling::{SchedulingExplanation, SchedulingStatus};

/// One of the four reports, serialized as `{"kind": ..., "report": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "report", rename_all = "snake_case")]
pub enum Report {
    Scheduling(SchedulingExplanation),
    Health(PodHealthScore),
    Namespace(NamespaceErrorReport),
    Cluster(ClusterIssues),
}

impl Report {
    /// Whether the report found anything worth acting on.
    pub fn has_issues(&self) -> bool {
        match self {
            Report::Scheduling(s) => s.status != SchedulingStatus::Scheduled,
            Report::Health(h) => h.status > HealthStatus::Good,
            Report::Namespace(n) => n.problematic_pod_count > 0,
            Report::Cluster(c) => c.total_issues > 0,
        }
    }

    /// One-line summary for the log.
    pub fn summary(&self) -> String {
        match self {
            Report::Scheduling(s) => format!("{}/{}: {:?}. {}", s.namespace, s.pod, s.status, s.summary),
            Report::Health(h) => format!(
                "{}/{}: health {} ({:?})",
                h.namespace, h.pod, h.overall_score, h.status
            ),
            Report::Namespace(n) => format!(
                "namespace {}: {} of {} pods problematic",
                n.namespace, n.problematic_pod_count, n.pods_analyzed
            ),
            Report::Cluster(c) => format!(
                "{}: {} issues across {} pods, trend {:?}",
                c.scope, c.total_issues, c.pods_scanned, c.velocity.trend
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
