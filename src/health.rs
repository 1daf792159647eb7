//! Weighted 0-100 health score for a single pod.

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::{Event, Pod};
use serde::Serialize;

use crate::inspect::{
    container_restarts, container_statuses, event_time, is_warning, last_restart, pod_age_seconds, pod_conditions,
    pod_name, pod_namespace, pod_phase,
};

const RESTARTS_WEIGHT: f64 = 0.30;
const CONTAINER_STATES_WEIGHT: f64 = 0.25;
const RECENT_EVENTS_WEIGHT: f64 = 0.20;
const POD_CONDITIONS_WEIGHT: f64 = 0.15;
const UPTIME_WEIGHT: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    Healthy,
    Good,
    Warning,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Self::Healthy,
            70..=89 => Self::Good,
            50..=69 => Self::Warning,
            30..=49 => Self::Degraded,
            _ => Self::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthComponentKind {
    Restarts,
    ContainerStates,
    RecentEvents,
    PodConditions,
    Uptime,
}

impl HealthComponentKind {
    pub fn weight(self) -> f64 {
        match self {
            Self::Restarts => RESTARTS_WEIGHT,
            Self::ContainerStates => CONTAINER_STATES_WEIGHT,
            Self::RecentEvents => RECENT_EVENTS_WEIGHT,
            Self::PodConditions => POD_CONDITIONS_WEIGHT,
            Self::Uptime => UPTIME_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthComponent {
    pub name: HealthComponentKind,
    pub score: u32,
    pub weight: f64,
    pub status: HealthStatus,
    pub details: Vec<String>,
}

impl HealthComponent {
    fn new(name: HealthComponentKind, score: u32, details: Vec<String>) -> Self {
        Self {
            name,
            score,
            weight: name.weight(),
            status: HealthStatus::from_score(score),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastRestart {
    pub time: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodHealthScore {
    pub pod: String,
    pub namespace: String,
    pub phase: String,
    pub overall_score: u32,
    pub status: HealthStatus,
    pub components: Vec<HealthComponent>,
    pub restart_count: i32,
    pub last_restart: Option<LastRestart>,
    pub qos_class: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// Base score from the restart ladder.
pub fn restart_ladder(restarts: i32) -> u32 {
    match restarts {
        i32::MIN..=0 => 100,
        1..=2 => 85,
        3..=5 => 70,
        6..=10 => 50,
        11..=20 => 30,
        _ => 10,
    }
}

fn score_restarts(pod: &Pod, now: DateTime<Utc>) -> HealthComponent {
    let restarts = container_restarts(pod);
    let mut score = restart_ladder(restarts);
    let mut details = vec![format!("{} container restart(s)", restarts)];

    let age_hours = pod_age_seconds(pod, now) as f64 / 3600.0;
    if restarts > 0 && age_hours > 0.0 {
        let rate = restarts as f64 / age_hours;
        if rate > 1.0 {
            score = (score / 2).max(10);
            details.push(format!("restart rate {:.1}/hour exceeds 1/hour", rate));
        }
    }
    HealthComponent::new(HealthComponentKind::Restarts, score, details)
}

fn score_container_states(pod: &Pod) -> HealthComponent {
    let statuses = container_statuses(pod);
    let mut score = 100;
    let mut unhealthy = false;
    let mut details = Vec::new();

    for cs in statuses {
        let Some(state) = cs.state.as_ref() else { continue };
        if let Some(waiting) = state.waiting.as_ref() {
            let reason = waiting.reason.as_deref().unwrap_or("Waiting");
            let cap = match reason {
                "CrashLoopBackOff" | "Error" => 20,
                "ImagePullBackOff" | "ErrImagePull" => 30,
                _ => 50,
            };
            score = score.min(cap);
            unhealthy = true;
            details.push(format!("container {} waiting: {}", cs.name, reason));
        } else if let Some(term) = state.terminated.as_ref().filter(|t| t.exit_code != 0) {
            score = score.min(40);
            unhealthy = true;
            details.push(format!("container {} terminated with exit code {}", cs.name, term.exit_code));
        }
    }

    if !unhealthy {
        let declared = pod.spec.as_ref().map(|s| s.containers.len()).unwrap_or(0);
        let expected = statuses.len().max(declared);
        let ready = statuses.iter().filter(|cs| cs.ready).count();
        score = if expected == 0 {
            100
        } else {
            (ready as f64 / expected as f64 * 100.0).round() as u32
        };
        details.push(format!("{}/{} containers ready", ready, expected));
    }
    HealthComponent::new(HealthComponentKind::ContainerStates, score, details)
}

fn score_recent_events(events: &[Event], now: DateTime<Utc>) -> HealthComponent {
    let since = now - Duration::hours(24);
    let mut score = 100;
    let mut details = Vec::new();

    for event in events.iter().filter(|e| is_warning(e)) {
        if event_time(event).map_or(true, |t| t < since) {
            continue;
        }
        let reason = event.reason.as_deref().unwrap_or("");
        let cap = match reason {
            "Failed" | "FailedScheduling" | "FailedMount" => 30,
            "BackOff" | "CrashLoopBackOff" => 40,
            "Unhealthy" => 50,
            _ => 70,
        };
        score = score.min(cap);
        details.push(format!("warning event {} (x{})", reason, event.count.unwrap_or(1)));
    }
    if details.is_empty() {
        details.push("no warning events in the last 24h".to_string());
    }
    HealthComponent::new(HealthComponentKind::RecentEvents, score, details)
}

fn score_pod_conditions(pod: &Pod) -> HealthComponent {
    let mut score = 100;
    let mut details = Vec::new();

    for condition in pod_conditions(pod).iter().filter(|c| c.status != "True") {
        let cap = match condition.type_.as_str() {
            "PodScheduled" => 30,
            "Ready" | "PodReady" => 50,
            "ContainersReady" => 60,
            "Initialized" | "PodInitialized" => 70,
            _ => continue,
        };
        score = score.min(cap);
        details.push(format!(
            "condition {} is {}{}",
            condition.type_,
            condition.status,
            condition.reason.as_ref().map(|r| format!(" ({})", r)).unwrap_or_default()
        ));
    }
    HealthComponent::new(HealthComponentKind::PodConditions, score, details)
}

fn score_uptime(pod: &Pod, now: DateTime<Utc>) -> HealthComponent {
    let age = pod_age_seconds(pod, now);
    let shortest_running = container_statuses(pod)
        .iter()
        .filter_map(|cs| cs.state.as_ref().and_then(|s| s.running.as_ref()))
        .filter_map(|running| running.started_at.as_ref())
        .map(|started| (now - started.0).num_seconds().max(0))
        .min();

    let ratio = match (shortest_running, age) {
        (_, 0) => 1.0,
        (Some(running), age) => (running as f64 / age as f64).min(1.0),
        (None, _) => 0.0,
    };
    let score = if ratio < 0.5 {
        50
    } else if ratio < 0.8 {
        70
    } else if ratio < 0.95 {
        85
    } else {
        100
    };

    let mut details = vec![format!("running for {:.0}% of pod lifetime", ratio * 100.0)];
    if let Some((time, reason)) = last_restart(pod) {
        details.push(format!(
            "last restart at {}{}",
            time.to_rfc3339(),
            reason.map(|r| format!(" ({})", r)).unwrap_or_default()
        ));
    }
    HealthComponent::new(HealthComponentKind::Uptime, score, details)
}

/// Weighted mean of the component scores, rounded to the nearest integer.
pub fn weighted_overall(components: &[HealthComponent]) -> u32 {
    let total_weight: f64 = components.iter().map(|c| c.weight).sum();
    if total_weight <= 0.0 {
        return 0;
    }
    let weighted: f64 = components.iter().map(|c| c.score as f64 * c.weight).sum();
    (weighted / total_weight).round() as u32
}

/// Score a pod from its own status and the events that involve it.
pub fn score_pod_health(pod: &Pod, events: &[Event], now: DateTime<Utc>) -> PodHealthScore {
    let components = vec![
        score_restarts(pod, now),
        score_container_states(pod),
        score_recent_events(events, now),
        score_pod_conditions(pod),
        score_uptime(pod, now),
    ];
    let overall_score = weighted_overall(&components);

    PodHealthScore {
        pod: pod_name(pod).to_string(),
        namespace: pod_namespace(pod).to_string(),
        phase: pod_phase(pod).to_string(),
        overall_score,
        status: HealthStatus::from_score(overall_score),
        components,
        restart_count: container_restarts(pod),
        last_restart: last_restart(pod).map(|(time, reason)| LastRestart { time, reason }),
        qos_class: pod.status.as_ref().and_then(|s| s.qos_class.clone()),
        evaluated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting, ContainerStatus,
        PodCondition, PodSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn running_pod(now: DateTime<Utc>, age: Duration, running_for: Duration, restarts: i32) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec::default()),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                start_time: Some(Time(now - age)),
                container_statuses: Some(vec![ContainerStatus {
                    name: "app".to_string(),
                    ready: true,
                    restart_count: restarts,
                    state: Some(ContainerState {
                        running: Some(ContainerStateRunning {
                            started_at: Some(Time(now - running_for)),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    fn warning(reason: &str, at: DateTime<Utc>) -> Event {
        Event {
            reason: Some(reason.to_string()),
            type_: Some("Warning".to_string()),
            last_timestamp: Some(Time(at)),
            ..Default::default()
        }
    }

    fn component(score: &PodHealthScore, kind: HealthComponentKind) -> &HealthComponent {
        score.components.iter().find(|c| c.name == kind).unwrap()
    }

    #[test]
    fn test_restart_ladder_boundaries_and_monotonicity() {
        assert_eq!(restart_ladder(0), 100);
        assert_eq!(restart_ladder(2), 85);
        assert_eq!(restart_ladder(5), 70);
        assert_eq!(restart_ladder(10), 50);
        assert_eq!(restart_ladder(20), 30);
        assert_eq!(restart_ladder(21), 10);
        for n in 0..100 {
            assert!(restart_ladder(n + 1) <= restart_ladder(n));
        }
    }

    #[test]
    fn test_weights_sum_to_one_and_overall_is_weighted_mean() {
        let now = Utc::now();
        let pod = running_pod(now, Duration::hours(2), Duration::hours(1), 3);
        let events = vec![warning("Unhealthy", now - Duration::minutes(5))];
        let score = score_pod_health(&pod, &events, now);

        let total: f64 = score.components.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);

        let expected = score
            .components
            .iter()
            .map(|c| c.score as f64 * c.weight)
            .sum::<f64>()
            / total;
        assert_eq!(score.overall_score, expected.round() as u32);
    }

    #[test]
    fn test_healthy_pod() {
        let now = Utc::now();
        let score = score_pod_health(&running_pod(now, Duration::hours(5), Duration::hours(5), 0), &[], now);
        assert_eq!(score.overall_score, 100);
        assert_eq!(score.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_restart_rate_halves_score() {
        let now = Utc::now();
        // 4 restarts in 2 hours: ladder 70, rate 2/hour -> 35
        let score = score_pod_health(&running_pod(now, Duration::hours(2), Duration::hours(2), 4), &[], now);
        assert_eq!(component(&score, HealthComponentKind::Restarts).score, 35);

        // 30 restarts in 1 hour: ladder 10, halved but floored at 10
        let score = score_pod_health(&running_pod(now, Duration::hours(1), Duration::hours(1), 30), &[], now);
        assert_eq!(component(&score, HealthComponentKind::Restarts).score, 10);
    }

    #[test]
    fn test_container_state_caps() {
        let now = Utc::now();
        let mut pod = running_pod(now, Duration::hours(1), Duration::hours(1), 0);
        let statuses = pod.status.as_mut().unwrap().container_statuses.as_mut().unwrap();
        statuses[0].ready = false;
        statuses[0].state = Some(ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some("ImagePullBackOff".to_string()),
                message: None,
            }),
            ..Default::default()
        });
        statuses.push(ContainerStatus {
            name: "sidecar".to_string(),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: 1,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let score = score_pod_health(&pod, &[], now);
        assert_eq!(component(&score, HealthComponentKind::ContainerStates).score, 30);

        let statuses = pod.status.as_mut().unwrap().container_statuses.as_mut().unwrap();
        statuses[0].state.as_mut().unwrap().waiting.as_mut().unwrap().reason = Some("CrashLoopBackOff".to_string());
        let score = score_pod_health(&pod, &[], now);
        assert_eq!(component(&score, HealthComponentKind::ContainerStates).score, 20);
    }

    #[test]
    fn test_ready_fraction_when_nothing_unhealthy() {
        let now = Utc::now();
        let mut pod = running_pod(now, Duration::hours(1), Duration::hours(1), 0);
        let statuses = pod.status.as_mut().unwrap().container_statuses.as_mut().unwrap();
        let mut second = statuses[0].clone();
        second.name = "sidecar".to_string();
        second.ready = false;
        statuses.push(second);

        let score = score_pod_health(&pod, &[], now);
        assert_eq!(component(&score, HealthComponentKind::ContainerStates).score, 50);
    }

    #[test]
    fn test_only_recent_warning_events_count() {
        let now = Utc::now();
        let pod = running_pod(now, Duration::days(3), Duration::days(3), 0);
        let events = vec![
            warning("FailedMount", now - Duration::hours(30)),
            warning("BackOff", now - Duration::hours(2)),
            warning("SomethingOdd", now - Duration::hours(1)),
        ];
        let score = score_pod_health(&pod, &events, now);
        let recent = component(&score, HealthComponentKind::RecentEvents);
        assert_eq!(recent.score, 40);
        assert_eq!(recent.details.len(), 2);
    }

    #[test]
    fn test_condition_caps() {
        let now = Utc::now();
        let mut pod = running_pod(now, Duration::hours(1), Duration::hours(1), 0);
        pod.status.as_mut().unwrap().conditions = Some(vec![
            PodCondition {
                type_: "ContainersReady".to_string(),
                status: "False".to_string(),
                ..Default::default()
            },
            PodCondition {
                type_: "Initialized".to_string(),
                status: "False".to_string(),
                ..Default::default()
            },
        ]);
        let score = score_pod_health(&pod, &[], now);
        assert_eq!(component(&score, HealthComponentKind::PodConditions).score, 60);
    }

    #[test]
    fn test_uptime_ratio_thresholds() {
        let now = Utc::now();
        let cases = [(40, 50), (70, 70), (90, 85), (100, 100)];
        for (running_pct, expected) in cases {
            let pod = running_pod(now, Duration::minutes(100), Duration::minutes(running_pct), 0);
            let score = score_pod_health(&pod, &[], now);
            assert_eq!(component(&score, HealthComponentKind::Uptime).score, expected, "running {}%", running_pct);
        }
    }

    #[test]
    fn test_status_buckets() {
        assert_eq!(HealthStatus::from_score(90), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(89), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(50), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_score(30), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(29), HealthStatus::Critical);
    }
}
