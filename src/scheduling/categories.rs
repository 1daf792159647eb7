use std::collections::BTreeMap;

use serde::Serialize;

/// Why a pod could not be placed on a node.
///
/// Declaration order is the tie-break order when ranking categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FailureCategory {
    InsufficientCPU,
    InsufficientMemory,
    InsufficientStorage,
    VolumeAttachmentError,
    VolumeMultiAttachError,
    VolumeNodeAffinityConflict,
    NodeAffinityNotMatch,
    TaintTolerationMismatch,
    PodAffinityConflict,
    NodeNotReady,
    Miscellaneous,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 11] = [
        Self::InsufficientCPU,
        Self::InsufficientMemory,
        Self::InsufficientStorage,
        Self::VolumeAttachmentError,
        Self::VolumeMultiAttachError,
        Self::VolumeNodeAffinityConflict,
        Self::NodeAffinityNotMatch,
        Self::TaintTolerationMismatch,
        Self::PodAffinityConflict,
        Self::NodeNotReady,
        Self::Miscellaneous,
    ];

    /// Lowercase fragments that identify the category in reason or event text.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::InsufficientCPU => &["insufficient cpu"],
            Self::InsufficientMemory => &["insufficient memory"],
            Self::InsufficientStorage => &["insufficient ephemeral-storage", "insufficient storage", "storage capacity"],
            Self::VolumeAttachmentError => &[
                "persistentvolumeclaim",
                "unbound",
                "failed to attach",
                "attachvolume",
                "failedattachvolume",
            ],
            Self::VolumeMultiAttachError => &["multi-attach"],
            Self::VolumeNodeAffinityConflict => &["volume node affinity conflict"],
            Self::NodeAffinityNotMatch => &[
                "nodeselector",
                "node selector",
                "node affinity term",
                "didn't match pod's node affinity",
            ],
            Self::TaintTolerationMismatch => &["taint"],
            Self::PodAffinityConflict => &["anti-affinity", "pod affinity"],
            Self::NodeNotReady => &["not ready", "not-ready", "cordoned", "were unschedulable", "pressure"],
            Self::Miscellaneous => &[],
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InsufficientCPU => "Not enough allocatable CPU on the node for the pod's requests",
            Self::InsufficientMemory => "Not enough allocatable memory on the node for the pod's requests",
            Self::InsufficientStorage => "Not enough ephemeral or persistent storage available",
            Self::VolumeAttachmentError => "A persistent volume claim is missing, unbound or failed to attach",
            Self::VolumeMultiAttachError => "A ReadWriteOnce volume is already attached to another node",
            Self::VolumeNodeAffinityConflict => "A bound persistent volume is not reachable from the node",
            Self::NodeAffinityNotMatch => "Node labels do not satisfy the pod's nodeSelector or node affinity",
            Self::TaintTolerationMismatch => "The node has taints the pod does not tolerate",
            Self::PodAffinityConflict => "Pod (anti-)affinity rules conflict with pods already on the node",
            Self::NodeNotReady => "The node is not ready, under pressure or cordoned",
            Self::Miscellaneous => "The node was rejected for a reason outside the known categories",
        }
    }
}

/// Categories whose keywords appear in `text`, in declaration order.
pub fn classify(text: &str) -> Vec<FailureCategory> {
    let lower = text.to_lowercase();
    FailureCategory::ALL
        .into_iter()
        .filter(|c| c.keywords().iter().any(|k| lower.contains(k)))
        .collect()
}

/// Categories for a set of failure reasons, never empty when reasons exist.
pub fn classify_reasons<'a>(reasons: impl IntoIterator<Item = &'a String>) -> Vec<FailureCategory> {
    let mut any = false;
    let mut found: Vec<FailureCategory> = Vec::new();
    for reason in reasons {
        any = true;
        for category in classify(reason) {
            if !found.contains(&category) {
                found.push(category);
            }
        }
    }
    if any && found.is_empty() {
        found.push(FailureCategory::Miscellaneous);
    }
    found.sort();
    found
}

/// Parse a FailedScheduling message such as
/// `0/3 nodes are available: 1 node(s) had untolerated taint {...}, 2 Insufficient cpu. preemption: ...`
/// into per-category node counts.
pub fn categories_from_event_message(message: &str) -> BTreeMap<FailureCategory, usize> {
    let mut counts = BTreeMap::new();
    let Some((_, detail)) = message.split_once(": ") else {
        return counts;
    };
    let detail = detail.split(" preemption:").next().unwrap_or(detail);

    for fragment in detail.split(", ") {
        let fragment = fragment.trim().trim_end_matches('.');
        let (count, text) = match fragment.split_once(' ') {
            Some((n, rest)) => match n.parse::<usize>() {
                Ok(n) => (n, rest),
                Err(_) => (1, fragment),
            },
            None => (1, fragment),
        };
        for category in classify(text) {
            let entry = counts.entry(category).or_insert(0);
            *entry = (*entry).max(count);
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: FailureCategory,
    pub description: &'static str,
    pub affected_nodes: usize,
}

/// Rank categories by affected node count (descending), ties in declaration order.
pub fn rank_categories(counts: &BTreeMap<FailureCategory, usize>) -> Vec<CategorySummary> {
    let mut ranked: Vec<CategorySummary> = counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(category, n)| CategorySummary {
            category: *category,
            description: category.description(),
            affected_nodes: *n,
        })
        .collect();
    ranked.sort_by(|a, b| b.affected_nodes.cmp(&a.affected_nodes).then(a.category.cmp(&b.category)));
    ranked
}
