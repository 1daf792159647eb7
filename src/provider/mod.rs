//! Read-only access to cluster state.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node, PersistentVolume, PersistentVolumeClaim, Pod};

use crate::error::Result;
use crate::types::NodeUsage;

pub mod kubernetes;
pub mod memory;

pub use kubernetes::KubeClusterState;
pub use memory::ClusterSnapshot;

/// Which events to list. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSelector {
    pub namespace: Option<String>,
    pub involved_kind: Option<String>,
    pub involved_name: Option<String>,
}

impl EventSelector {
    pub fn namespace(ns: impl Into<String>) -> Self {
        Self {
            namespace: Some(ns.into()),
            ..Default::default()
        }
    }

    pub fn for_pod(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(ns.into()),
            involved_kind: Some("Pod".to_string()),
            involved_name: Some(name.into()),
        }
    }

    /// Field selector understood by the API server, if any field is set.
    pub fn field_selector(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.involved_kind.as_ref().map(|k| format!("involvedObject.kind={}", k)),
            self.involved_name.as_ref().map(|n| format!("involvedObject.name={}", n)),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!parts.is_empty()).then(|| parts.join(","))
    }

    pub fn matches(&self, event: &Event) -> bool {
        let obj = &event.involved_object;
        let ns_ok = self
            .namespace
            .as_deref()
            .map_or(true, |ns| event.metadata.namespace.as_deref().or(obj.namespace.as_deref()) == Some(ns));
        let kind_ok = self.involved_kind.as_deref().map_or(true, |k| obj.kind.as_deref() == Some(k));
        let name_ok = self.involved_name.as_deref().map_or(true, |n| obj.name.as_deref() == Some(n));
        ns_ok && kind_ok && name_ok
    }
}

/// Source of cluster snapshots for the analyzers.
///
/// Getters return `DiagnosticError::NotFound` for missing objects.
/// The metrics calls return `DiagnosticError::Unavailable` when no metrics
/// source is present; callers treat that as a capability flag.
#[async_trait]
pub trait ClusterStateProvider: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// Pods in `namespace`, or in every namespace when `None`.
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>>;

    async fn get_node(&self, name: &str) -> Result<Node>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    async fn list_events(&self, selector: &EventSelector) -> Result<Vec<Event>>;

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim>;

    async fn get_pv(&self, name: &str) -> Result<PersistentVolume>;

    async fn get_node_metrics(&self, name: &str) -> Result<NodeUsage>;

    /// Usage of every node the metrics source knows about, in one call.
    async fn list_node_metrics(&self) -> Result<BTreeMap<String, NodeUsage>>;
}
