//! Absent-safe accessors over the k8s-openapi snapshot types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Event, Node, Pod, PodCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

static EMPTY_LABELS: BTreeMap<String, String> = BTreeMap::new();

pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or("")
}

pub fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("default")
}

/// `namespace/name` identifier used throughout the reports.
pub fn pod_key(pod: &Pod) -> String {
    format!("{}/{}", pod_namespace(pod), pod_name(pod))
}

pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

pub fn pod_labels(pod: &Pod) -> &BTreeMap<String, String> {
    pod.metadata.labels.as_ref().unwrap_or(&EMPTY_LABELS)
}

pub fn assigned_node(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .filter(|n| !n.is_empty())
}

pub fn pod_status_time(pod: &Pod) -> Option<DateTime<Utc>> {
    // Prefer status.startTime, fallback to metadata.creationTimestamp
    if let Some(st) = pod.status.as_ref().and_then(|s| s.start_time.as_ref()) {
        return Some(st.0);
    }
    pod.metadata.creation_timestamp.as_ref().map(|t| t.0)
}

pub fn pod_age_seconds(pod: &Pod, now: DateTime<Utc>) -> i64 {
    pod_status_time(pod)
        .map(|since| (now - since).num_seconds().max(0))
        .unwrap_or(0)
}

pub fn container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or(&[])
}

pub fn init_container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|s| s.init_container_statuses.as_deref())
        .unwrap_or(&[])
}

pub fn pod_conditions(pod: &Pod) -> &[PodCondition] {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or(&[])
}

pub fn pod_condition<'a>(pod: &'a Pod, type_: &str) -> Option<&'a PodCondition> {
    pod_conditions(pod).iter().find(|c| c.type_ == type_)
}

/// Restarts across regular containers only.
pub fn container_restarts(pod: &Pod) -> i32 {
    container_statuses(pod)
        .iter()
        .map(|cs| cs.restart_count)
        .fold(0i32, i32::saturating_add)
}

/// Restarts across regular and init containers.
pub fn total_restarts(pod: &Pod) -> i32 {
    init_container_statuses(pod)
        .iter()
        .map(|cs| cs.restart_count)
        .fold(container_restarts(pod), i32::saturating_add)
}

pub fn waiting_reason(cs: &ContainerStatus) -> Option<&str> {
    cs.state
        .as_ref()
        .and_then(|s| s.waiting.as_ref())
        .and_then(|w| w.reason.as_deref())
}

pub fn owner_kinds(pod: &Pod) -> impl Iterator<Item = &str> {
    pod.metadata
        .owner_references
        .iter()
        .flatten()
        .map(|o| o.kind.as_str())
}

/// Last restart of any container, taken from `lastState.terminated`.
pub fn last_restart(pod: &Pod) -> Option<(DateTime<Utc>, Option<String>)> {
    container_statuses(pod)
        .iter()
        .filter_map(|cs| cs.last_state.as_ref().and_then(|s| s.terminated.as_ref()))
        .filter_map(|term| term.finished_at.as_ref().map(|t: &Time| (t.0, term.reason.clone())))
        .max_by_key(|(ts, _)| *ts)
}

pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("")
}

pub fn node_labels(node: &Node) -> &BTreeMap<String, String> {
    node.metadata.labels.as_ref().unwrap_or(&EMPTY_LABELS)
}

/// Best timestamp for an event: lastTimestamp, eventTime, firstTimestamp, creation.
pub fn event_time(event: &Event) -> Option<DateTime<Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.as_ref().map(|t| t.0))
}

pub fn is_warning(event: &Event) -> bool {
    event.type_.as_deref() == Some("Warning")
}

/// Sort events newest first; ties keep a stable order by event name.
pub fn sort_events_newest_first(events: &mut [&Event]) {
    events.sort_by(|a, b| {
        event_time(b)
            .cmp(&event_time(a))
            .then_with(|| a.metadata.name.cmp(&b.metadata.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use k8s_openapi::api::core::v1::{ContainerState, ContainerStateTerminated, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    #[test]
    fn test_pod_status_time_prefers_start_time() {
        let created = Utc::now() - Duration::hours(2);
        let started = Utc::now() - Duration::hours(1);
        let mut pod = Pod {
            metadata: ObjectMeta {
                creation_timestamp: Some(Time(created)),
                ..Default::default()
            },
            status: Some(PodStatus {
                start_time: Some(Time(started)),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(pod_status_time(&pod), Some(started));

        pod.status = None;
        assert_eq!(pod_status_time(&pod), Some(created));
    }

    #[test]
    fn test_restart_totals_and_last_restart() {
        let finished = Utc::now() - Duration::minutes(3);
        let pod = Pod {
            status: Some(PodStatus {
                container_statuses: Some(vec![
                    ContainerStatus {
                        name: "app".to_string(),
                        restart_count: 3,
                        last_state: Some(ContainerState {
                            terminated: Some(ContainerStateTerminated {
                                exit_code: 137,
                                reason: Some("OOMKilled".to_string()),
                                finished_at: Some(Time(finished)),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ContainerStatus {
                        name: "sidecar".to_string(),
                        restart_count: 1,
                        ..Default::default()
                    },
                ]),
                init_container_statuses: Some(vec![ContainerStatus {
                    name: "init".to_string(),
                    restart_count: 2,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(container_restarts(&pod), 4);
        assert_eq!(total_restarts(&pod), 6);
        assert_eq!(last_restart(&pod), Some((finished, Some("OOMKilled".to_string()))));
    }

    #[test]
    fn test_restart_totals_saturate() {
        let status = |name: &str| ContainerStatus {
            name: name.to_string(),
            restart_count: i32::MAX - 1,
            ..Default::default()
        };
        let pod = Pod {
            status: Some(PodStatus {
                container_statuses: Some(vec![status("app"), status("sidecar")]),
                init_container_statuses: Some(vec![status("init")]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(container_restarts(&pod), i32::MAX);
        assert_eq!(total_restarts(&pod), i32::MAX);
    }

    #[test]
    fn test_owner_kinds() {
        let pod = Pod {
            metadata: ObjectMeta {
                owner_references: Some(vec![OwnerReference {
                    kind: "ReplicaSet".to_string(),
                    name: "web-5d8f".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(owner_kinds(&pod).collect::<Vec<_>>(), vec!["ReplicaSet"]);
        assert_eq!(owner_kinds(&Pod::default()).count(), 0);
    }
}
