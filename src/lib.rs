// Public modules
pub mod config;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod health;
pub mod inspect;
pub mod issues;
pub mod parsing;
pub mod provider;
pub mod report;
pub mod scheduling;
pub mod types;

// Re-export commonly used items
pub use config::{load_config, load_config_with_env, Config, EnvironmentProvider, MockEnvironment, ReportKind, SystemEnvironment};
pub use engine::{DiagnosticEngine, EngineConfig};
pub use error::{DiagnosticError, Result};
pub use health::{score_pod_health, HealthStatus, PodHealthScore};
pub use issues::{aggregate_cluster_issues, analyze_namespace, detect_pod_issues, ClusterIssues, NamespaceErrorReport};
pub use provider::{ClusterSnapshot, ClusterStateProvider, EventSelector, KubeClusterState};
pub use report::Report;
pub use scheduling::{explain_scheduling, FailureCategory, SchedulingContext, SchedulingExplanation, SchedulingStatus};
pub use types::{NodeUsage, Severity};
