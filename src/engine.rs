//! Request orchestration: read what a report needs from the provider, then
//! hand the snapshot to the pure analyzers under a per-request deadline.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Node, Pod};
use tracing::{debug, error, info, warn};

use crate::constraints::volumes::{pod_volume_kinds, ClaimBinding};
use crate::error::{DiagnosticError, Result};
use crate::health::{score_pod_health, PodHealthScore};
use crate::inspect::{node_name, pod_namespace};
use crate::issues::{
    aggregate_cluster_issues, analyze_namespace, ClusterIssues, ClusterScanOptions, IssueThresholds, NamespaceErrorReport,
};
use crate::provider::{ClusterStateProvider, EventSelector};
use crate::scheduling::{explain_scheduling, SchedulingContext, SchedulingExplanation};
use crate::types::NodeUsage;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub timeout: Duration,
    pub thresholds: IssueThresholds,
    pub pattern_min_occurrences: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            thresholds: IssueThresholds::default(),
            pattern_min_occurrences: 3,
        }
    }
}

/// Produces the four reports from a cluster state provider.
pub struct DiagnosticEngine<P> {
    provider: P,
    config: EngineConfig,
}

impl<P: ClusterStateProvider> DiagnosticEngine<P> {
    pub fn new(provider: P, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn with_deadline<T, F>(&self, report: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DiagnosticError::DeadlineExceeded(self.config.timeout)),
        };
        match &result {
            Ok(_) => debug!(report, "report complete"),
            Err(DiagnosticError::Internal(msg)) => error!(report, error = %msg, "report failed"),
            Err(e) => warn!(report, error = %e, "report not produced"),
        }
        result
    }

    /// Look up every claim-backed volume of `pod`. Lookup failures other than
    /// absence are recorded on the binding and skipped by the volume check.
    async fn claim_bindings(&self, pod: &Pod) -> Vec<ClaimBinding> {
        let namespace = pod_namespace(pod);
        let mut bindings = Vec::new();

        for (volume_name, kind) in pod_volume_kinds(pod) {
            let Some(claim_name) = kind.claim_name() else { continue };
            let mut binding = ClaimBinding {
                volume_name,
                claim_name: claim_name.to_string(),
                ..Default::default()
            };

            match self.provider.get_pvc(namespace, claim_name).await {
                Ok(claim) => binding.claim = Some(claim),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(claim = claim_name, error = %e, "claim lookup failed, skipping");
                    binding.lookup_error = Some(e.to_string());
                }
            }

            if let Some(pv_name) = binding.bound_volume_name().map(str::to_string) {
                match self.provider.get_pv(&pv_name).await {
                    Ok(pv) => binding.volume = Some(pv),
                    Err(e) => {
                        warn!(volume = %pv_name, error = %e, "persistent volume lookup failed, skipping");
                        binding.volume_lookup_error = Some(e.to_string());
                    }
                }
            }
            bindings.push(binding);
        }
        bindings
    }

    /// Usage of `nodes` from a single metrics listing, or `None` when the
    /// metrics source is unavailable.
    async fn node_usage(&self, nodes: &[Node]) -> Option<BTreeMap<String, NodeUsage>> {
        match self.provider.list_node_metrics().await {
            Ok(mut usage) => {
                usage.retain(|name, _| nodes.iter().any(|n| node_name(n) == name.as_str()));
                Some(usage)
            }
            Err(DiagnosticError::Unavailable(reason)) => {
                debug!(%reason, "node metrics unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "node metrics lookup failed, reporting without usage");
                None
            }
        }
    }

    pub async fn explain_scheduling(&self, namespace: &str, pod_name: &str) -> Result<SchedulingExplanation> {
        self.with_deadline("scheduling", async {
            let pod = self.provider.get_pod(namespace, pod_name).await?;
            let nodes = self.provider.list_nodes().await?;
            let pods = self.provider.list_pods(None).await?;
            let events = self
                .provider
                .list_events(&EventSelector::for_pod(namespace, pod_name))
                .await?;
            let claims = self.claim_bindings(&pod).await;
            let usage = self.node_usage(&nodes).await;

            info!(pod = pod_name, namespace, nodes = nodes.len(), "explaining scheduling");
            let ctx = SchedulingContext {
                nodes: &nodes,
                pods: &pods,
                claims: &claims,
                events: &events,
                node_usage: usage.as_ref(),
            };
            Ok(explain_scheduling(&pod, &ctx))
        })
        .await
    }

    pub async fn pod_health(&self, namespace: &str, pod_name: &str) -> Result<PodHealthScore> {
        self.with_deadline("health", async {
            let pod = self.provider.get_pod(namespace, pod_name).await?;
            let events = self
                .provider
                .list_events(&EventSelector::for_pod(namespace, pod_name))
                .await?;
            info!(pod = pod_name, namespace, events = events.len(), "scoring pod health");
            Ok(score_pod_health(&pod, &events, Utc::now()))
        })
        .await
    }

    pub async fn namespace_errors(&self, namespace: &str) -> Result<NamespaceErrorReport> {
        self.with_deadline("namespace", async {
            let pods = self.provider.list_pods(Some(namespace)).await?;
            let events = self.provider.list_events(&EventSelector::namespace(namespace)).await?;
            info!(namespace, pods = pods.len(), "analyzing namespace");
            Ok(analyze_namespace(namespace, &pods, &events, &self.config.thresholds, Utc::now()))
        })
        .await
    }

    /// Cluster-wide scan, or a single namespace when `namespace` is set.
    pub async fn cluster_issues(&self, namespace: Option<&str>) -> Result<ClusterIssues> {
        self.with_deadline("cluster", async {
            let pods = self.provider.list_pods(namespace).await?;
            info!(scope = namespace.unwrap_or("cluster"), pods = pods.len(), "aggregating cluster issues");
            let options = ClusterScanOptions {
                namespace: namespace.map(str::to_string),
                pattern_min_occurrences: self.config.pattern_min_occurrences,
            };
            Ok(aggregate_cluster_issues(&pods, &options, Utc::now()))
        })
        .await
    }
}
