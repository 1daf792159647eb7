pub mod cluster;
pub mod namespace;

pub use cluster::{aggregate_cluster_issues, classify_pod, ClusterIssues, ClusterScanOptions, IssueCategory};
pub use namespace::{analyze_namespace, detect_pod_issues, IssueThresholds, NamespaceErrorReport, PodIssueType};
