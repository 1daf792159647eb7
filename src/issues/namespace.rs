use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::{Event, Pod};
use serde::Serialize;

use crate::inspect::{
    container_statuses, event_time, init_container_statuses, is_warning, owner_kinds, pod_age_seconds, pod_condition,
    pod_name, pod_namespace, pod_phase, sort_events_newest_first, total_restarts, waiting_reason,
};
use crate::types::{EventSummary, Severity};

const MAX_POD_EVENTS: usize = 5;
const MANAGED_OWNER_KINDS: [&str; 2] = ["ReplicaSet", "StatefulSet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueThresholds {
    pub restart_threshold: i32,
    pub pending_grace: Duration,
}

impl Default for IssueThresholds {
    fn default() -> Self {
        Self {
            restart_threshold: 5,
            pending_grace: Duration::minutes(5),
        }
    }
}

/// Declaration order breaks ties in the summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PodIssueType {
    HighRestarts,
    Pending,
    ResourceConstraints,
    Unschedulable,
    CrashLoopBackOff,
    ImagePullBackOff,
    ContainerTerminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodIssue {
    pub issue_type: PodIssueType,
    pub severity: Severity,
    pub message: String,
    pub container: Option<String>,
}

impl PodIssue {
    fn new(issue_type: PodIssueType, severity: Severity, message: String, container: Option<&str>) -> Self {
        Self {
            issue_type,
            severity,
            message,
            container: container.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblematicPod {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub restart_count: i32,
    pub has_critical_issue: bool,
    pub issues: Vec<PodIssue>,
    pub recent_events: Vec<EventSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueTypeCount {
    pub issue_type: PodIssueType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceErrorReport {
    pub namespace: String,
    pub pods_analyzed: usize,
    pub problematic_pod_count: usize,
    pub issue_counts: Vec<IssueTypeCount>,
    pub problematic_pods: Vec<ProblematicPod>,
    pub generated_at: DateTime<Utc>,
}

/// Pods managed by a ReplicaSet or StatefulSet.
pub fn is_managed_workload(pod: &Pod) -> bool {
    owner_kinds(pod).any(|kind| MANAGED_OWNER_KINDS.contains(&kind))
}

fn pending_issue(pod: &Pod, thresholds: &IssueThresholds, now: DateTime<Utc>) -> Option<PodIssue> {
    if pod_phase(pod) != "Pending" {
        return None;
    }
    let age = pod_age_seconds(pod, now);
    if age <= thresholds.pending_grace.num_seconds() {
        return None;
    }

    let scheduled = pod_condition(pod, "PodScheduled").filter(|c| c.status == "False");
    let detail = scheduled.and_then(|c| c.message.as_deref()).unwrap_or("");
    let lower = detail.to_lowercase();
    let issue_type = if lower.contains("insufficient") {
        PodIssueType::ResourceConstraints
    } else if lower.contains("unschedulable") {
        PodIssueType::Unschedulable
    } else {
        PodIssueType::Pending
    };

    let mut message = format!("pod pending for {} minute(s)", age / 60);
    if !detail.is_empty() {
        message.push_str(": ");
        message.push_str(detail);
    }
    Some(PodIssue::new(issue_type, Severity::Critical, message, None))
}

/// Issues for one pod, in detection order.
pub fn detect_pod_issues(pod: &Pod, thresholds: &IssueThresholds, now: DateTime<Utc>) -> Vec<PodIssue> {
    let mut issues = Vec::new();

    let restarts = total_restarts(pod);
    if restarts > thresholds.restart_threshold {
        issues.push(PodIssue::new(
            PodIssueType::HighRestarts,
            Severity::Critical,
            format!("{} restarts exceed threshold {}", restarts, thresholds.restart_threshold),
            None,
        ));
    }

    issues.extend(pending_issue(pod, thresholds, now));

    for cs in init_container_statuses(pod).iter().chain(container_statuses(pod)) {
        match waiting_reason(cs) {
            Some("CrashLoopBackOff") => issues.push(PodIssue::new(
                PodIssueType::CrashLoopBackOff,
                Severity::Critical,
                format!("container {} is in CrashLoopBackOff", cs.name),
                Some(cs.name.as_str()),
            )),
            Some(reason @ ("ImagePullBackOff" | "ErrImagePull")) => issues.push(PodIssue::new(
                PodIssueType::ImagePullBackOff,
                Severity::Critical,
                format!("container {} cannot pull its image ({})", cs.name, reason),
                Some(cs.name.as_str()),
            )),
            _ => {}
        }

        let terminated = cs
            .state
            .as_ref()
            .and_then(|s| s.terminated.as_ref())
            .filter(|t| t.exit_code != 0);
        if let Some(term) = terminated {
            issues.push(PodIssue::new(
                PodIssueType::ContainerTerminated,
                Severity::Warning,
                format!(
                    "container {} terminated with exit code {}{}",
                    cs.name,
                    term.exit_code,
                    term.reason.as_ref().map(|r| format!(" ({})", r)).unwrap_or_default()
                ),
                Some(cs.name.as_str()),
            ));
        }
    }
    issues
}

fn involves_pod(event: &Event, pod: &Pod) -> bool {
    let obj = &event.involved_object;
    obj.kind.as_deref().map_or(true, |k| k == "Pod")
        && obj.name.as_deref() == Some(pod_name(pod))
        && obj.namespace.as_deref().map_or(true, |ns| ns == pod_namespace(pod))
}

/// Up to five Warning events for the pod from the last hour, newest first.
pub fn recent_pod_warnings(pod: &Pod, events: &[Event], now: DateTime<Utc>) -> Vec<EventSummary> {
    let since = now - Duration::hours(1);
    let mut matching: Vec<&Event> = events
        .iter()
        .filter(|e| is_warning(e) && involves_pod(e, pod))
        .filter(|e| event_time(e).is_some_and(|t| t >= since))
        .collect();
    sort_events_newest_first(&mut matching);
    matching.into_iter().take(MAX_POD_EVENTS).map(EventSummary::from).collect()
}

pub fn analyze_namespace(
    namespace: &str,
    pods: &[Pod],
    events: &[Event],
    thresholds: &IssueThresholds,
    now: DateTime<Utc>,
) -> NamespaceErrorReport {
    let managed: Vec<&Pod> = pods.iter().filter(|p| is_managed_workload(p)).collect();
    let mut counts: BTreeMap<PodIssueType, usize> = BTreeMap::new();
    let mut problematic = Vec::new();

    for pod in &managed {
        let issues = detect_pod_issues(pod, thresholds, now);
        if issues.is_empty() {
            continue;
        }
        for issue in &issues {
            *counts.entry(issue.issue_type).or_insert(0) += 1;
        }
        problematic.push(ProblematicPod {
            name: pod_name(pod).to_string(),
            namespace: pod_namespace(pod).to_string(),
            phase: pod_phase(pod).to_string(),
            restart_count: total_restarts(pod),
            has_critical_issue: issues.iter().any(|i| i.severity == Severity::Critical),
            issues,
            recent_events: recent_pod_warnings(pod, events, now),
        });
    }

    problematic.sort_by(|a, b| {
        b.has_critical_issue
            .cmp(&a.has_critical_issue)
            .then(b.restart_count.cmp(&a.restart_count))
            .then_with(|| a.name.cmp(&b.name))
    });

    // BTreeMap iteration is declaration order, so a stable sort keeps ties in that order.
    let mut issue_counts: Vec<IssueTypeCount> = counts
        .into_iter()
        .map(|(issue_type, count)| IssueTypeCount { issue_type, count })
        .collect();
    issue_counts.sort_by(|a, b| b.count.cmp(&a.count));

    NamespaceErrorReport {
        namespace: namespace.to_string(),
        pods_analyzed: managed.len(),
        problematic_pod_count: problematic.len(),
        issue_counts,
        problematic_pods: problematic,
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus, ObjectReference,
        PodCondition, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};

    fn managed_pod(name: &str, owner: &str, now: DateTime<Utc>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("shop".to_string()),
                owner_references: Some(vec![OwnerReference {
                    kind: owner.to_string(),
                    name: format!("{}-owner", name),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                start_time: Some(Time(now - Duration::hours(3))),
                ..Default::default()
            }),
        }
    }

    fn waiting(name: &str, reason: &str, restarts: i32) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            restart_count: restarts,
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod_warning(pod: &str, reason: &str, at: DateTime<Utc>) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some(format!("{}.{}", pod, reason)),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some("Pod".to_string()),
                name: Some(pod.to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            reason: Some(reason.to_string()),
            type_: Some("Warning".to_string()),
            last_timestamp: Some(Time(at)),
            ..Default::default()
        }
    }

    #[test]
    fn test_crashloop_with_high_restarts() {
        let now = Utc::now();
        let mut pod = managed_pod("api-0", "StatefulSet", now);
        pod.status.as_mut().unwrap().container_statuses = Some(vec![waiting("api", "CrashLoopBackOff", 12)]);

        let issues = detect_pod_issues(&pod, &IssueThresholds::default(), now);
        let kinds: Vec<_> = issues.iter().map(|i| i.issue_type).collect();
        assert_eq!(kinds, vec![PodIssueType::HighRestarts, PodIssueType::CrashLoopBackOff]);
        assert!(issues.iter().all(|i| i.severity == Severity::Critical));
    }

    #[test]
    fn test_restart_threshold_is_exclusive_and_counts_init_containers() {
        let now = Utc::now();
        let mut pod = managed_pod("web-1", "ReplicaSet", now);
        let status = pod.status.as_mut().unwrap();
        status.container_statuses = Some(vec![ContainerStatus {
            name: "app".to_string(),
            restart_count: 3,
            ..Default::default()
        }]);
        status.init_container_statuses = Some(vec![ContainerStatus {
            name: "init".to_string(),
            restart_count: 2,
            ..Default::default()
        }]);
        assert!(detect_pod_issues(&pod, &IssueThresholds::default(), now).is_empty());

        pod.status.as_mut().unwrap().init_container_statuses.as_mut().unwrap()[0].restart_count = 3;
        let issues = detect_pod_issues(&pod, &IssueThresholds::default(), now);
        assert_eq!(issues[0].issue_type, PodIssueType::HighRestarts);
    }

    #[test]
    fn test_pending_subclassification() {
        let now = Utc::now();
        let mut pod = managed_pod("web-2", "ReplicaSet", now);
        let status = pod.status.as_mut().unwrap();
        status.phase = Some("Pending".to_string());
        status.start_time = Some(Time(now - Duration::minutes(10)));
        status.conditions = Some(vec![PodCondition {
            type_: "PodScheduled".to_string(),
            status: "False".to_string(),
            message: Some("0/3 nodes are available: 3 Insufficient memory.".to_string()),
            ..Default::default()
        }]);
        let issues = detect_pod_issues(&pod, &IssueThresholds::default(), now);
        assert_eq!(issues[0].issue_type, PodIssueType::ResourceConstraints);

        pod.status.as_mut().unwrap().conditions.as_mut().unwrap()[0].message =
            Some("0/3 nodes are available: 3 node(s) were unschedulable.".to_string());
        let issues = detect_pod_issues(&pod, &IssueThresholds::default(), now);
        assert_eq!(issues[0].issue_type, PodIssueType::Unschedulable);

        // inside the grace period nothing is flagged
        pod.status.as_mut().unwrap().start_time = Some(Time(now - Duration::minutes(2)));
        assert!(detect_pod_issues(&pod, &IssueThresholds::default(), now).is_empty());
    }

    #[test]
    fn test_terminated_nonzero_is_warning() {
        let now = Utc::now();
        let mut pod = managed_pod("job-like", "ReplicaSet", now);
        pod.status.as_mut().unwrap().container_statuses = Some(vec![ContainerStatus {
            name: "app".to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 2,
                    reason: Some("Error".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);
        let issues = detect_pod_issues(&pod, &IssueThresholds::default(), now);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].message, "container app terminated with exit code 2 (Error)");
    }

    #[test]
    fn test_namespace_report_filters_sorts_and_attaches_events() {
        let now = Utc::now();

        let mut crashing = managed_pod("api-0", "StatefulSet", now);
        crashing.status.as_mut().unwrap().container_statuses = Some(vec![waiting("api", "CrashLoopBackOff", 2)]);

        let mut pulling = managed_pod("web-1", "ReplicaSet", now);
        pulling.status.as_mut().unwrap().container_statuses = Some(vec![waiting("web", "ErrImagePull", 7)]);

        let mut flaky = managed_pod("worker-1", "ReplicaSet", now);
        flaky.status.as_mut().unwrap().container_statuses = Some(vec![ContainerStatus {
            name: "worker".to_string(),
            restart_count: 1,
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 1,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        // DaemonSet pods are out of scope even when broken
        let mut daemon = managed_pod("agent-x", "DaemonSet", now);
        daemon.status.as_mut().unwrap().container_statuses = Some(vec![waiting("agent", "CrashLoopBackOff", 40)]);

        let events: Vec<Event> = (0..7)
            .map(|i| pod_warning("web-1", &format!("Failed{}", i), now - Duration::minutes(i)))
            .chain(std::iter::once(pod_warning("web-1", "Stale", now - Duration::hours(2))))
            .collect();

        let report = analyze_namespace(
            "shop",
            &[flaky, crashing, pulling, daemon],
            &events,
            &IssueThresholds::default(),
            now,
        );

        assert_eq!(report.pods_analyzed, 3);
        let order: Vec<_> = report.problematic_pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(order, vec!["web-1", "api-0", "worker-1"]);

        let web = &report.problematic_pods[0];
        assert_eq!(web.recent_events.len(), 5);
        assert_eq!(web.recent_events[0].reason, "Failed0");
        assert!(web.recent_events.iter().all(|e| e.reason != "Stale"));

        // HighRestarts, CrashLoopBackOff, ImagePullBackOff, ContainerTerminated each once
        assert_eq!(report.issue_counts.len(), 4);
        assert_eq!(report.issue_counts[0].issue_type, PodIssueType::HighRestarts);
        assert_eq!(report.issue_counts[3].issue_type, PodIssueType::ContainerTerminated);
    }
}
