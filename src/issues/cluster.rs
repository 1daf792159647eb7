//! Cluster-wide issue aggregation: categories, namespace rollups, recurring
//! patterns, ranked top issues and a velocity estimate.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use serde::Serialize;
use tracing::debug;

use crate::inspect::{
    container_statuses, init_container_statuses, pod_age_seconds, pod_condition, pod_key, pod_labels, pod_name,
    pod_namespace, pod_phase, pod_status_time, waiting_reason,
};
use crate::types::Severity;

const PENDING_MIN_AGE_SECONDS: i64 = 30;
const MAX_PATTERNS: usize = 5;
const MAX_TOP_ISSUES: usize = 10;
const MAX_LISTED_PODS: usize = 5;
const MAX_CRITICAL_ISSUES: usize = 20;

/// Declaration order breaks ties in category counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IssueCategory {
    CrashLoopBackOff,
    ImagePullError,
    PendingScheduling,
    #[serde(rename = "OOMKilled")]
    OomKilled,
    Evicted,
    Failed,
    Unhealthy,
    InitContainerError,
    ConfigurationError,
    // Reserved: no detector produces these yet.
    VolumeMountError,
    NetworkError,
    ResourceQuotaExceeded,
}

impl IssueCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::CrashLoopBackOff => "CrashLoopBackOff",
            Self::ImagePullError => "ImagePullError",
            Self::PendingScheduling => "PendingScheduling",
            Self::OomKilled => "OOMKilled",
            Self::Evicted => "Evicted",
            Self::Failed => "Failed",
            Self::Unhealthy => "Unhealthy",
            Self::InitContainerError => "InitContainerError",
            Self::ConfigurationError => "ConfigurationError",
            Self::VolumeMountError => "VolumeMountError",
            Self::NetworkError => "NetworkError",
            Self::ResourceQuotaExceeded => "ResourceQuotaExceeded",
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            Self::CrashLoopBackOff
            | Self::ImagePullError
            | Self::OomKilled
            | Self::Failed
            | Self::InitContainerError
            | Self::ConfigurationError
            | Self::VolumeMountError => Severity::Critical,
            Self::PendingScheduling
            | Self::Evicted
            | Self::Unhealthy
            | Self::NetworkError
            | Self::ResourceQuotaExceeded => Severity::Warning,
        }
    }

    /// Category for a container waiting reason, if it is a problem at all.
    fn from_waiting_reason(reason: &str) -> Option<Self> {
        match reason {
            "CrashLoopBackOff" => Some(Self::CrashLoopBackOff),
            "ImagePullBackOff" | "ErrImagePull" | "InvalidImageName" | "ErrImageNeverPull" => Some(Self::ImagePullError),
            "CreateContainerConfigError" | "CreateContainerError" | "RunContainerError" => {
                Some(Self::ConfigurationError)
            }
            _ => None,
        }
    }
}

/// One detected problem on one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
    pub pod: String,
    pub namespace: String,
    pub container: Option<String>,
    pub first_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: IssueCategory,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceRollup {
    pub namespace: String,
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
}

/// A `category:reason` pair seen across several pods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuePattern {
    pub key: String,
    pub category: IssueCategory,
    pub reason: String,
    pub count: usize,
    pub namespaces: Vec<String>,
    pub common_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopIssue {
    pub category: IssueCategory,
    pub reason: String,
    pub severity: Severity,
    pub count: usize,
    pub affected_pods: Vec<String>,
    pub more_pods: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueVelocity {
    pub new_last_hour: usize,
    pub new_last_24h: usize,
    pub resolved_last_hour: usize,
    pub resolved_last_24h: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterIssues {
    pub scope: String,
    pub pods_scanned: usize,
    pub total_issues: usize,
    pub categories: Vec<CategoryCount>,
    pub namespaces: Vec<NamespaceRollup>,
    pub patterns: Vec<IssuePattern>,
    pub top_issues: Vec<TopIssue>,
    pub critical_issues: Vec<ClusterIssue>,
    pub velocity: IssueVelocity,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterScanOptions {
    /// `None` scans every namespace.
    pub namespace: Option<String>,
    pub pattern_min_occurrences: usize,
}

impl Default for ClusterScanOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            pattern_min_occurrences: 3,
        }
    }
}

struct IssueBuilder<'a> {
    pod: &'a Pod,
    fallback_time: DateTime<Utc>,
}

impl IssueBuilder<'_> {
    fn build(
        &self,
        category: IssueCategory,
        reason: &str,
        message: String,
        container: Option<&str>,
        seen: Option<DateTime<Utc>>,
    ) -> ClusterIssue {
        ClusterIssue {
            category,
            severity: category.default_severity(),
            reason: reason.to_string(),
            message,
            pod: pod_name(self.pod).to_string(),
            namespace: pod_namespace(self.pod).to_string(),
            container: container.map(str::to_string),
            first_seen: seen.unwrap_or(self.fallback_time),
        }
    }
}

fn container_issue(builder: &IssueBuilder<'_>, cs: &ContainerStatus, init: bool) -> Option<ClusterIssue> {
    let kind = if init { "init container" } else { "container" };

    if let Some(reason) = waiting_reason(cs) {
        if let Some(category) = IssueCategory::from_waiting_reason(reason) {
            let category = if init && category == IssueCategory::CrashLoopBackOff {
                IssueCategory::InitContainerError
            } else {
                category
            };
            let message = cs
                .state
                .as_ref()
                .and_then(|s| s.waiting.as_ref())
                .and_then(|w| w.message.clone())
                .unwrap_or_else(|| format!("{} {} is waiting: {}", kind, cs.name, reason));
            return Some(builder.build(category, reason, message, Some(cs.name.as_str()), None));
        }
    }

    let terminated = cs.state.as_ref().and_then(|s| s.terminated.as_ref());
    let last_terminated = cs.last_state.as_ref().and_then(|s| s.terminated.as_ref());
    for term in terminated.into_iter().chain(last_terminated) {
        if term.reason.as_deref() == Some("OOMKilled") {
            return Some(builder.build(
                IssueCategory::OomKilled,
                "OOMKilled",
                format!("{} {} was killed for exceeding its memory limit", kind, cs.name),
                Some(cs.name.as_str()),
                term.finished_at.as_ref().map(|t| t.0),
            ));
        }
    }

    if init {
        if let Some(term) = terminated.filter(|t| t.exit_code != 0) {
            return Some(builder.build(
                IssueCategory::InitContainerError,
                term.reason.as_deref().unwrap_or("Error"),
                format!("init container {} exited with code {}", cs.name, term.exit_code),
                Some(cs.name.as_str()),
                term.finished_at.as_ref().map(|t| t.0),
            ));
        }
    }
    None
}

/// Issues detected on a single pod. Pending pods younger than 30 seconds are
/// never flagged.
pub fn classify_pod(pod: &Pod, now: DateTime<Utc>) -> Vec<ClusterIssue> {
    let phase = pod_phase(pod);
    if phase == "Succeeded" {
        return Vec::new();
    }
    if phase == "Pending" && pod_age_seconds(pod, now) < PENDING_MIN_AGE_SECONDS {
        return Vec::new();
    }

    let builder = IssueBuilder {
        pod,
        fallback_time: pod_status_time(pod).unwrap_or(now),
    };
    let status_reason = pod.status.as_ref().and_then(|s| s.reason.as_deref());
    let status_message = pod.status.as_ref().and_then(|s| s.message.clone());

    if phase == "Failed" {
        let issue = if status_reason == Some("Evicted") {
            builder.build(
                IssueCategory::Evicted,
                "Evicted",
                status_message.unwrap_or_else(|| "pod was evicted".to_string()),
                None,
                None,
            )
        } else {
            let reason = status_reason.unwrap_or("Failed");
            builder.build(
                IssueCategory::Failed,
                reason,
                status_message.unwrap_or_else(|| format!("pod failed ({})", reason)),
                None,
                None,
            )
        };
        return vec![issue];
    }

    let mut issues: Vec<ClusterIssue> = init_container_statuses(pod)
        .iter()
        .filter_map(|cs| container_issue(&builder, cs, true))
        .chain(container_statuses(pod).iter().filter_map(|cs| container_issue(&builder, cs, false)))
        .collect();
    if !issues.is_empty() {
        return issues;
    }

    if phase == "Pending" {
        if let Some(cond) = pod_condition(pod, "PodScheduled").filter(|c| c.status == "False") {
            issues.push(builder.build(
                IssueCategory::PendingScheduling,
                cond.reason.as_deref().unwrap_or("Unschedulable"),
                cond.message.clone().unwrap_or_else(|| "pod cannot be scheduled".to_string()),
                None,
                cond.last_transition_time.as_ref().map(|t| t.0),
            ));
        }
    } else if phase == "Running" {
        for cs in container_statuses(pod).iter().filter(|cs| !cs.ready) {
            let running = cs.state.as_ref().and_then(|s| s.running.as_ref());
            if let Some(running) = running {
                issues.push(builder.build(
                    IssueCategory::Unhealthy,
                    "NotReady",
                    format!("container {} is running but not ready", cs.name),
                    Some(cs.name.as_str()),
                    running.started_at.as_ref().map(|t| t.0),
                ));
            }
        }
    }
    issues
}

#[derive(Default)]
struct PatternAccumulator {
    count: usize,
    namespaces: BTreeSet<String>,
    common_labels: Option<BTreeMap<String, String>>,
}

impl PatternAccumulator {
    fn observe(&mut self, namespace: &str, labels: &BTreeMap<String, String>) {
        self.count += 1;
        self.namespaces.insert(namespace.to_string());
        match self.common_labels.as_mut() {
            None => self.common_labels = Some(labels.clone()),
            Some(common) => common.retain(|k, v| labels.get(k) == Some(v)),
        }
    }
}

struct TopIssueAccumulator {
    severity: Severity,
    pods: Vec<String>,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

fn velocity(issues: &[ClusterIssue], now: DateTime<Utc>) -> IssueVelocity {
    let hour_ago = now - Duration::hours(1);
    let day_ago = now - Duration::hours(24);
    let new_last_hour = issues.iter().filter(|i| i.first_seen >= hour_ago).count();
    let new_last_24h = issues.iter().filter(|i| i.first_seen >= day_ago).count();
    // Nothing tracks resolution between scans, so these stay zero.
    let resolved_last_hour = 0;
    let resolved_last_24h = 0;

    let trend = match new_last_hour.cmp(&resolved_last_hour) {
        std::cmp::Ordering::Greater => Trend::Degrading,
        std::cmp::Ordering::Less => Trend::Improving,
        std::cmp::Ordering::Equal => Trend::Stable,
    };
    IssueVelocity {
        new_last_hour,
        new_last_24h,
        resolved_last_hour,
        resolved_last_24h,
        trend,
    }
}

pub fn aggregate_cluster_issues(pods: &[Pod], options: &ClusterScanOptions, now: DateTime<Utc>) -> ClusterIssues {
    let in_scope: Vec<&Pod> = pods
        .iter()
        .filter(|p| options.namespace.as_deref().map_or(true, |ns| pod_namespace(p) == ns))
        .collect();

    let mut issues = Vec::new();
    let mut category_counts: BTreeMap<IssueCategory, usize> = BTreeMap::new();
    let mut rollups: BTreeMap<String, NamespaceRollup> = BTreeMap::new();
    let mut patterns: BTreeMap<(IssueCategory, String), PatternAccumulator> = BTreeMap::new();
    let mut grouped: BTreeMap<(IssueCategory, String), TopIssueAccumulator> = BTreeMap::new();

    for pod in &in_scope {
        let detected = classify_pod(pod, now);
        if !detected.is_empty() {
            debug!(pod = %pod_key(pod), issues = detected.len(), "pod has issues");
        }
        for issue in detected {
            *category_counts.entry(issue.category).or_insert(0) += 1;

            let rollup = rollups
                .entry(issue.namespace.clone())
                .or_insert_with(|| NamespaceRollup {
                    namespace: issue.namespace.clone(),
                    total: 0,
                    critical: 0,
                    warning: 0,
                });
            rollup.total += 1;
            match issue.severity {
                Severity::Critical => rollup.critical += 1,
                Severity::Warning => rollup.warning += 1,
                Severity::Info => {}
            }

            let key = (issue.category, issue.reason.clone());
            patterns
                .entry(key.clone())
                .or_default()
                .observe(&issue.namespace, pod_labels(pod));

            let pod_id = format!("{}/{}", issue.namespace, issue.pod);
            let group = grouped.entry(key).or_insert_with(|| TopIssueAccumulator {
                severity: issue.severity,
                pods: Vec::new(),
                first_seen: issue.first_seen,
                last_seen: issue.first_seen,
            });
            group.severity = group.severity.min(issue.severity);
            if !group.pods.contains(&pod_id) {
                group.pods.push(pod_id);
            }
            group.first_seen = group.first_seen.min(issue.first_seen);
            group.last_seen = group.last_seen.max(issue.first_seen);

            issues.push(issue);
        }
    }

    // count desc, then category declaration order
    let mut categories: Vec<CategoryCount> = category_counts
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();
    categories.sort_by(|a, b| b.count.cmp(&a.count));

    // total desc, then namespace name
    let mut namespaces: Vec<NamespaceRollup> = rollups.into_values().collect();
    namespaces.sort_by(|a, b| b.total.cmp(&a.total));

    // count desc, then (category, reason)
    let mut kept_patterns: Vec<IssuePattern> = patterns
        .into_iter()
        .filter(|(_, acc)| acc.count >= options.pattern_min_occurrences)
        .map(|((category, reason), acc)| IssuePattern {
            key: format!("{}:{}", category.label(), reason),
            category,
            reason,
            count: acc.count,
            namespaces: acc.namespaces.into_iter().collect(),
            common_labels: acc.common_labels.unwrap_or_default(),
        })
        .collect();
    kept_patterns.sort_by(|a, b| b.count.cmp(&a.count));
    kept_patterns.truncate(MAX_PATTERNS);

    // severity weight desc, count desc, then (category, reason)
    let mut top_issues: Vec<TopIssue> = grouped
        .into_iter()
        .map(|((category, reason), mut acc)| {
            let count = acc.pods.len();
            let more_pods = (count > MAX_LISTED_PODS).then(|| format!("...and {} more", count - MAX_LISTED_PODS));
            acc.pods.sort();
            acc.pods.truncate(MAX_LISTED_PODS);
            TopIssue {
                category,
                reason,
                severity: acc.severity,
                count,
                affected_pods: acc.pods,
                more_pods,
                first_seen: acc.first_seen,
                last_seen: acc.last_seen,
            }
        })
        .collect();
    top_issues.sort_by(|a, b| {
        b.severity
            .weight()
            .cmp(&a.severity.weight())
            .then(b.count.cmp(&a.count))
    });
    top_issues.truncate(MAX_TOP_ISSUES);

    // newest first, then pod identity
    let mut critical_issues: Vec<ClusterIssue> = issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .cloned()
        .collect();
    critical_issues.sort_by(|a, b| {
        b.first_seen
            .cmp(&a.first_seen)
            .then_with(|| (&a.namespace, &a.pod, &a.container).cmp(&(&b.namespace, &b.pod, &b.container)))
    });
    critical_issues.truncate(MAX_CRITICAL_ISSUES);

    ClusterIssues {
        scope: options.namespace.clone().unwrap_or_else(|| "cluster".to_string()),
        pods_scanned: in_scope.len(),
        total_issues: issues.len(),
        categories,
        namespaces,
        patterns: kept_patterns,
        top_issues,
        critical_issues,
        velocity: velocity(&issues, now),
        generated_at: now,
    }
}
