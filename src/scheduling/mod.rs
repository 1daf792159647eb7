//! Explains where a pod landed, or why it could not land anywhere.

pub mod categories;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Event, Node, Pod};
use serde::Serialize;

use crate::constraints::volumes::pod_volume_kinds;
use crate::constraints::{
    check_node_affinity, check_node_readiness, check_pod_anti_affinity, check_resource_fit, check_taints,
    check_volume_binding, ClaimBinding, ConstraintResult, ResourceExplanation, TaintExplanation, VolumeExplanation,
};
use crate::inspect::{assigned_node, node_name, pod_name, pod_namespace, pod_phase, sort_events_newest_first};
use crate::parsing::utilization_percent;
use crate::types::{event_source, EventSummary, NodeUsage, NodeUtilization};

pub use categories::{classify, classify_reasons, CategorySummary, FailureCategory};

const SCHEDULING_EVENT_REASONS: &[&str] = &["FailedScheduling", "Scheduled", "Preempted", "NotTriggerScaleUp"];
const DEFAULT_SCHEDULER: &str = "default-scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulingStatus {
    Scheduled,
    Pending,
    Failed,
}

/// Everything the explainer reads besides the pod itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulingContext<'a> {
    pub nodes: &'a [Node],
    /// Pods across the cluster, used to find pods co-located on a candidate node.
    pub pods: &'a [Pod],
    pub claims: &'a [ClaimBinding],
    pub events: &'a [Event],
    /// `None` when the metrics source is unavailable.
    pub node_usage: Option<&'a BTreeMap<String, NodeUsage>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeExplanation {
    pub node_name: String,
    pub schedulable: bool,
    /// Failure reasons across all predicates, in predicate order.
    pub reasons: Vec<String>,
    pub categories: Vec<FailureCategory>,
    pub readiness: ConstraintResult,
    pub node_affinity: ConstraintResult,
    pub taints: TaintExplanation,
    pub resources: ResourceExplanation,
    pub pod_anti_affinity: ConstraintResult,
    pub volumes: VolumeExplanation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<NodeUtilization>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingDecision {
    pub node_name: String,
    pub reasons: Vec<String>,
    pub evaluation: Option<NodeExplanation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingExplanation {
    pub pod: String,
    pub namespace: String,
    pub status: SchedulingStatus,
    pub node_name: Option<String>,
    pub priority: Option<i32>,
    pub summary: String,
    pub decision: Option<SchedulingDecision>,
    pub nodes_evaluated: usize,
    pub schedulable_nodes: Vec<String>,
    pub unschedulable_nodes: Vec<NodeExplanation>,
    pub failure_categories: Vec<CategorySummary>,
    pub events: Vec<EventSummary>,
    pub metrics_available: bool,
}

/// Run every predicate for `pod` against `node`.
pub fn evaluate_node(pod: &Pod, node: &Node, ctx: &SchedulingContext<'_>) -> NodeExplanation {
    let readiness = check_node_readiness(node);
    let node_affinity = check_node_affinity(pod, node);
    let taints = check_taints(pod, node);
    let resources = check_resource_fit(pod, node);
    let pod_anti_affinity = check_pod_anti_affinity(pod, node, ctx.pods);
    let volumes = check_volume_binding(pod, ctx.claims, node);

    let reasons: Vec<String> = [
        &readiness,
        &node_affinity,
        &taints.result,
        &resources.result,
        &pod_anti_affinity,
        &volumes.result,
    ]
    .into_iter()
    .flat_map(|r| r.failure_reasons().iter().cloned())
    .collect();

    let categories = classify_reasons(&reasons);
    let name = node_name(node).to_string();
    let usage = ctx
        .node_usage
        .and_then(|m| m.get(&name))
        .map(|u| NodeUtilization {
            cpu_millicores: u.cpu_millicores,
            memory_bytes: u.memory_bytes,
            cpu_pct: resources.allocatable.cpu_millicores.and_then(|a| utilization_percent(u.cpu_millicores, a)),
            memory_pct: resources.allocatable.memory_bytes.and_then(|a| utilization_percent(u.memory_bytes, a)),
        });

    NodeExplanation {
        node_name: name,
        schedulable: reasons.is_empty(),
        reasons,
        categories,
        readiness,
        node_affinity,
        taints,
        resources,
        pod_anti_affinity,
        volumes,
        usage,
    }
}

/// Scheduling-relevant events for the pod, newest first.
pub fn scheduling_events(pod: &Pod, events: &[Event]) -> Vec<EventSummary> {
    let name = pod_name(pod);
    let mut relevant: Vec<&Event> = events
        .iter()
        .filter(|e| e.involved_object.name.as_deref().map_or(true, |n| n == name))
        .filter(|e| {
            e.reason.as_deref().is_some_and(|r| SCHEDULING_EVENT_REASONS.contains(&r))
                || event_source(e) == Some(DEFAULT_SCHEDULER)
        })
        .collect();
    sort_events_newest_first(&mut relevant);
    relevant.into_iter().map(EventSummary::from).collect()
}

pub fn explain_scheduling(pod: &Pod, ctx: &SchedulingContext<'_>) -> SchedulingExplanation {
    let events = scheduling_events(pod, ctx.events);
    let mut explanation = SchedulingExplanation {
        pod: pod_name(pod).to_string(),
        namespace: pod_namespace(pod).to_string(),
        status: SchedulingStatus::Failed,
        node_name: assigned_node(pod).map(str::to_string),
        priority: pod.spec.as_ref().and_then(|s| s.priority),
        summary: String::new(),
        decision: None,
        nodes_evaluated: 0,
        schedulable_nodes: Vec::new(),
        unschedulable_nodes: Vec::new(),
        failure_categories: Vec::new(),
        events,
        metrics_available: ctx.node_usage.is_some(),
    };

    if let Some(node) = assigned_node(pod) {
        explain_scheduled(pod, node, ctx, &mut explanation);
    } else if pod_phase(pod) == "Pending" {
        explain_pending(pod, ctx, &mut explanation);
    } else {
        explanation.summary = format!(
            "Pod has no node assigned and is not pending (phase {})",
            pod_phase(pod)
        );
    }
    explanation
}

fn explain_scheduled(pod: &Pod, node: &str, ctx: &SchedulingContext<'_>, out: &mut SchedulingExplanation) {
    out.status = SchedulingStatus::Scheduled;
    let Some(assigned) = ctx.nodes.iter().find(|n| node_name(n) == node) else {
        out.summary = format!("Pod is scheduled on {}", node);
        out.decision = Some(SchedulingDecision {
            node_name: node.to_string(),
            reasons: vec![format!("assigned node {} is not present in the cluster snapshot", node)],
            evaluation: None,
        });
        return;
    };

    let evaluation = evaluate_node(pod, assigned, ctx);
    let mut reasons = Vec::new();
    if evaluation.node_affinity.satisfied {
        reasons.extend(evaluation.node_affinity.reasons.iter().cloned());
    }
    reasons.extend(evaluation.taints.tolerated.iter().map(|t| format!("tolerated taint {}", t)));
    if evaluation.resources.fits {
        reasons.extend(evaluation.resources.result.reasons.iter().cloned());
    }
    if evaluation.pod_anti_affinity.satisfied {
        reasons.extend(evaluation.pod_anti_affinity.reasons.iter().cloned());
    }
    let has_claims = pod_volume_kinds(pod).iter().any(|(_, k)| k.claim_name().is_some());
    if has_claims && evaluation.volumes.result.satisfied {
        reasons.extend(evaluation.volumes.result.reasons.iter().cloned());
    }
    if reasons.is_empty() {
        reasons.push("selected by scheduler algorithm (no explicit placement constraints)".to_string());
    }
    reasons.extend(evaluation.reasons.iter().map(|r| format!("assigned node currently fails: {}", r)));

    out.summary = format!("Pod is scheduled on {}", node);
    out.nodes_evaluated = 1;
    out.decision = Some(SchedulingDecision {
        node_name: node.to_string(),
        reasons,
        evaluation: Some(evaluation),
    });
}

fn explain_pending(pod: &Pod, ctx: &SchedulingContext<'_>, out: &mut SchedulingExplanation) {
    out.status = SchedulingStatus::Pending;

    let mut evaluations: Vec<NodeExplanation> = ctx.nodes.iter().map(|n| evaluate_node(pod, n, ctx)).collect();
    evaluations.sort_by(|a, b| a.node_name.cmp(&b.node_name));
    out.nodes_evaluated = evaluations.len();

    let mut counts: BTreeMap<FailureCategory, usize> = BTreeMap::new();
    for evaluation in evaluations {
        if evaluation.schedulable {
            out.schedulable_nodes.push(evaluation.node_name);
            continue;
        }
        for category in &evaluation.categories {
            *counts.entry(*category).or_insert(0) += 1;
        }
        out.unschedulable_nodes.push(evaluation);
    }

    // The newest FailedScheduling message is the scheduler's own view of the cluster.
    if let Some(message) = out
        .events
        .iter()
        .find(|e| e.reason == "FailedScheduling")
        .map(|e| e.message.as_str())
    {
        for (category, n) in categories::categories_from_event_message(message) {
            let entry = counts.entry(category).or_insert(0);
            *entry = (*entry).max(n);
        }
    }

    out.unschedulable_nodes.sort_by(|a, b| {
        b.categories
            .len()
            .cmp(&a.categories.len())
            .then_with(|| a.node_name.cmp(&b.node_name))
    });
    out.failure_categories = categories::rank_categories(&counts);

    out.summary = match (out.nodes_evaluated, out.failure_categories.first()) {
        (0, _) => "Pod is pending and the cluster has no nodes".to_string(),
        (total, Some(top)) if out.schedulable_nodes.is_empty() => format!(
            "Pod is pending: 0/{} nodes are available; most common reason {:?} ({} node(s))",
            total, top.category, top.affected_nodes
        ),
        (total, _) => format!(
            "Pod is pending: {}/{} nodes currently fit, the pod is waiting on the scheduler",
            out.schedulable_nodes.len(),
            total
        ),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::fixtures::{labels, node, pod, quantities, with_requests};
    use chrono::{Duration, Utc};
    use k8s_openapi::api::core::v1::{EventSource, ObjectReference, PodStatus, Taint};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn pending(mut p: Pod) -> Pod {
        p.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        p
    }

    fn failed_scheduling(message: &str, minutes_ago: i64) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some(format!("web.{}", minutes_ago)),
                ..Default::default()
            },
            involved_object: ObjectReference {
                name: Some("web".to_string()),
                kind: Some("Pod".to_string()),
                ..Default::default()
            },
            reason: Some("FailedScheduling".to_string()),
            message: Some(message.to_string()),
            type_: Some("Warning".to_string()),
            last_timestamp: Some(Time(Utc::now() - Duration::minutes(minutes_ago))),
            source: Some(EventSource {
                component: Some("default-scheduler".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_selector_mismatch_is_pending_with_single_category() {
        let mut p = pending(pod("web"));
        p.spec.as_mut().unwrap().node_selector = Some(labels(&[("zone", "a")]));
        let nodes = vec![node("node-1", &[("zone", "b")])];
        let ctx = SchedulingContext { nodes: &nodes, ..Default::default() };

        let explanation = explain_scheduling(&p, &ctx);
        assert_eq!(explanation.status, SchedulingStatus::Pending);
        assert_eq!(explanation.unschedulable_nodes.len(), 1);
        let categories: Vec<_> = explanation.failure_categories.iter().map(|c| c.category).collect();
        assert_eq!(categories, vec![FailureCategory::NodeAffinityNotMatch]);
        assert!(!explanation.metrics_available);
    }

    #[test]
    fn test_categories_ranked_by_affected_nodes() {
        let p = pending(with_requests(pod("web"), &[("cpu", "3")]));
        let mut small_a = node("node-a", &[]);
        small_a.status.as_mut().unwrap().allocatable = Some(quantities(&[("cpu", "2")]));
        let mut small_b = small_a.clone();
        small_b.metadata.name = Some("node-b".to_string());
        let mut tainted = node("node-c", &[]);
        tainted.spec.as_mut().unwrap().taints = Some(vec![Taint {
            key: "dedicated".to_string(),
            effect: "NoSchedule".to_string(),
            ..Default::default()
        }]);
        let fits = node("node-d", &[]);

        let nodes = vec![tainted, fits, small_b, small_a];
        let ctx = SchedulingContext { nodes: &nodes, ..Default::default() };
        let explanation = explain_scheduling(&p, &ctx);

        assert_eq!(explanation.schedulable_nodes, vec!["node-d".to_string()]);
        let ranked: Vec<_> = explanation
            .failure_categories
            .iter()
            .map(|c| (c.category, c.affected_nodes))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (FailureCategory::InsufficientCPU, 2),
                (FailureCategory::TaintTolerationMismatch, 1),
            ]
        );
        let order: Vec<_> = explanation.unschedulable_nodes.iter().map(|n| n.node_name.as_str()).collect();
        assert_eq!(order, vec!["node-a", "node-b", "node-c"]);
    }

    #[test]
    fn test_event_counts_raise_category_tallies() {
        let p = pending(pod("web"));
        let nodes = vec![node("node-1", &[])];
        let events = vec![
            failed_scheduling("0/3 nodes are available: 3 Insufficient memory.", 1),
            failed_scheduling("0/3 nodes are available: 3 node(s) had untolerated taint {a: b}.", 30),
        ];
        let ctx = SchedulingContext { nodes: &nodes, events: &events, ..Default::default() };

        let explanation = explain_scheduling(&p, &ctx);
        assert_eq!(explanation.events.len(), 2);
        assert_eq!(explanation.events[0].message, "0/3 nodes are available: 3 Insufficient memory.");
        assert_eq!(explanation.failure_categories.len(), 1);
        assert_eq!(explanation.failure_categories[0].category, FailureCategory::InsufficientMemory);
        assert_eq!(explanation.failure_categories[0].affected_nodes, 3);
    }

    #[test]
    fn test_scheduled_without_constraints_uses_generic_reason() {
        let mut p = pod("web");
        p.spec.as_mut().unwrap().node_name = Some("node-1".to_string());
        let nodes = vec![node("node-1", &[])];
        let ctx = SchedulingContext { nodes: &nodes, ..Default::default() };

        let explanation = explain_scheduling(&p, &ctx);
        assert_eq!(explanation.status, SchedulingStatus::Scheduled);
        let decision = explanation.decision.unwrap();
        assert_eq!(
            decision.reasons,
            vec!["selected by scheduler algorithm (no explicit placement constraints)".to_string()]
        );
    }

    #[test]
    fn test_scheduled_trace_lists_matches() {
        let mut p = with_requests(pod("web"), &[("cpu", "1")]);
        p.spec.as_mut().unwrap().node_selector = Some(labels(&[("zone", "a")]));
        p.spec.as_mut().unwrap().node_name = Some("node-1".to_string());
        let nodes = vec![node("node-1", &[("zone", "a")])];
        let ctx = SchedulingContext { nodes: &nodes, ..Default::default() };

        let decision = explain_scheduling(&p, &ctx).decision.unwrap();
        assert_eq!(
            decision.reasons,
            vec![
                "nodeSelector zone=a matched".to_string(),
                "cpu request 1000m fits allocatable 4000m".to_string(),
            ]
        );
    }

    #[test]
    fn test_scheduled_trace_excludes_failing_node_selector() {
        let mut p = pod("web");
        p.spec.as_mut().unwrap().node_selector = Some(labels(&[("zone", "a")]));
        p.spec.as_mut().unwrap().node_name = Some("node-1".to_string());
        let nodes = vec![node("node-1", &[("zone", "b")])];
        let ctx = SchedulingContext { nodes: &nodes, ..Default::default() };

        let decision = explain_scheduling(&p, &ctx).decision.unwrap();
        assert_eq!(decision.reasons.len(), 2);
        assert_eq!(
            decision.reasons[0],
            "selected by scheduler algorithm (no explicit placement constraints)"
        );
        assert!(decision.reasons[1].starts_with("assigned node currently fails: "));
        assert!(decision.reasons[1].contains("zone"));
    }

    #[test]
    fn test_missing_assigned_node() {
        let mut p = pod("web");
        p.spec.as_mut().unwrap().node_name = Some("gone".to_string());
        let explanation = explain_scheduling(&p, &SchedulingContext::default());
        assert_eq!(explanation.status, SchedulingStatus::Scheduled);
        assert!(explanation.decision.unwrap().evaluation.is_none());
    }

    #[test]
    fn test_not_pending_without_node_is_failed() {
        let mut p = pod("web");
        p.status = Some(PodStatus {
            phase: Some("Failed".to_string()),
            ..Default::default()
        });
        let explanation = explain_scheduling(&p, &SchedulingContext::default());
        assert_eq!(explanation.status, SchedulingStatus::Failed);
    }

    #[test]
    fn test_node_usage_attached_when_metrics_available() {
        let mut p = pod("web");
        p.spec.as_mut().unwrap().node_name = Some("node-1".to_string());
        let nodes = vec![node("node-1", &[])];
        let mut usage = BTreeMap::new();
        usage.insert(
            "node-1".to_string(),
            NodeUsage {
                cpu_millicores: 1000,
                memory_bytes: 4 * 1024 * 1024 * 1024,
            },
        );
        let ctx = SchedulingContext { nodes: &nodes, node_usage: Some(&usage), ..Default::default() };

        let explanation = explain_scheduling(&p, &ctx);
        assert!(explanation.metrics_available);
        let utilization = explanation.decision.unwrap().evaluation.unwrap().usage.unwrap();
        assert_eq!(utilization.cpu_pct, Some(25.0));
        assert_eq!(utilization.memory_pct, Some(50.0));
    }
}
