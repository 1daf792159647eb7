use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use super::ConstraintResult;
use crate::inspect::{assigned_node, node_name, pod_key, pod_labels, pod_name, pod_namespace, pod_phase};

/// Label selector semantics: a missing selector matches nothing, an empty one matches everything.
pub fn label_selector_matches(selector: Option<&LabelSelector>, labels: &BTreeMap<String, String>) -> bool {
    let Some(selector) = selector else {
        return false;
    };
    let labels_ok = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));
    let expressions_ok = selector.match_expressions.iter().flatten().all(|req| {
        let values = req.values.as_deref().unwrap_or(&[]);
        let value = labels.get(&req.key);
        match req.operator.as_str() {
            "In" => value.is_some_and(|v| values.contains(v)),
            "NotIn" => value.map_or(true, |v| !values.contains(v)),
            "Exists" => value.is_some(),
            "DoesNotExist" => value.is_none(),
            _ => false,
        }
    });
    labels_ok && expressions_ok
}

/// Check required pod anti-affinity terms against the pods already bound to `node`.
///
/// `cluster_pods` may contain pods from any node; only those on `node` are considered.
pub fn check_pod_anti_affinity(pod: &Pod, node: &Node, cluster_pods: &[Pod]) -> ConstraintResult {
    let terms = pod
        .spec
        .as_ref()
        .and_then(|s| s.affinity.as_ref())
        .and_then(|a| a.pod_anti_affinity.as_ref())
        .and_then(|pa| pa.required_during_scheduling_ignored_during_execution.as_deref())
        .unwrap_or(&[]);
    if terms.is_empty() {
        return ConstraintResult::satisfied(Vec::new());
    }

    let target = node_name(node);
    let own_namespace = pod_namespace(pod);
    let co_located: Vec<&Pod> = cluster_pods
        .iter()
        .filter(|p| assigned_node(p) == Some(target))
        .filter(|p| !(pod_name(p) == pod_name(pod) && pod_namespace(p) == own_namespace))
        .filter(|p| !matches!(pod_phase(p), "Succeeded" | "Failed"))
        .collect();

    let mut failures = Vec::new();
    let mut info = Vec::new();

    for (i, term) in terms.iter().enumerate() {
        let namespaces: Vec<&str> = match term.namespaces.as_deref() {
            Some(list) if !list.is_empty() => list.iter().map(String::as_str).collect(),
            _ => vec![own_namespace],
        };
        let conflicts: Vec<String> = co_located
            .iter()
            .filter(|p| namespaces.contains(&pod_namespace(p)))
            .filter(|p| label_selector_matches(term.label_selector.as_ref(), pod_labels(p)))
            .map(|p| pod_key(p))
            .collect();

        if conflicts.is_empty() {
            info.push(format!(
                "pod anti-affinity term {} (topologyKey {}) has no conflicting pods on node",
                i, term.topology_key
            ));
        } else {
            for other in conflicts {
                failures.push(format!(
                    "pod anti-affinity conflict with pod {} on node (topologyKey {})",
                    other, term.topology_key
                ));
            }
        }
    }

    ConstraintResult::from_parts(failures, info)
}
