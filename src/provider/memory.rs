use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node, PersistentVolume, PersistentVolumeClaim, Pod};

use super::{ClusterStateProvider, EventSelector};
use crate::error::{DiagnosticError, Result};
use crate::inspect::{node_name, pod_name, pod_namespace};
use crate::types::NodeUsage;

/// Fixed, in-memory cluster state. Used by tests and for offline analysis of
/// dumped objects.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pods: Vec<Pod>,
    nodes: Vec<Node>,
    events: Vec<Event>,
    claims: Vec<PersistentVolumeClaim>,
    volumes: Vec<PersistentVolume>,
    node_metrics: Option<BTreeMap<String, NodeUsage>>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_pvc(mut self, claim: PersistentVolumeClaim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn with_pv(mut self, volume: PersistentVolume) -> Self {
        self.volumes.push(volume);
        self
    }

    /// Registering any usage turns the metrics capability on.
    pub fn with_node_usage(mut self, node: impl Into<String>, usage: NodeUsage) -> Self {
        self.node_metrics.get_or_insert_with(BTreeMap::new).insert(node.into(), usage);
        self
    }
}

#[async_trait]
impl ClusterStateProvider for ClusterSnapshot {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods
            .iter()
            .find(|p| pod_namespace(p) == namespace && pod_name(p) == name)
            .cloned()
            .ok_or_else(|| DiagnosticError::not_found("pod", format!("{}/{}", namespace, name)))
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        Ok(self
            .pods
            .iter()
            .filter(|p| namespace.map_or(true, |ns| pod_namespace(p) == ns))
            .cloned()
            .collect())
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes
            .iter()
            .find(|n| node_name(n) == name)
            .cloned()
            .ok_or_else(|| DiagnosticError::not_found("node", name))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.nodes.clone())
    }

    async fn list_events(&self, selector: &EventSelector) -> Result<Vec<Event>> {
        Ok(self.events.iter().filter(|e| selector.matches(e)).cloned().collect())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        self.claims
            .iter()
            .find(|c| {
                c.metadata.namespace.as_deref().unwrap_or("default") == namespace
                    && c.metadata.name.as_deref() == Some(name)
            })
            .cloned()
            .ok_or_else(|| DiagnosticError::not_found("persistentvolumeclaim", format!("{}/{}", namespace, name)))
    }

    async fn get_pv(&self, name: &str) -> Result<PersistentVolume> {
        self.volumes
            .iter()
            .find(|v| v.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| DiagnosticError::not_found("persistentvolume", name))
    }

    async fn get_node_metrics(&self, name: &str) -> Result<NodeUsage> {
        let metrics = self
            .node_metrics
            .as_ref()
            .ok_or_else(|| DiagnosticError::Unavailable("no metrics source in snapshot".to_string()))?;
        metrics
            .get(name)
            .copied()
            .ok_or_else(|| DiagnosticError::not_found("node metrics", name))
    }

    async fn list_node_metrics(&self) -> Result<BTreeMap<String, NodeUsage>> {
        self.node_metrics
            .clone()
            .ok_or_else(|| DiagnosticError::Unavailable("no metrics source in snapshot".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::fixtures;

    #[tokio::test]
    async fn test_lookups_and_not_found() {
        let snapshot = ClusterSnapshot::new()
            .with_pod(fixtures::pod("web"))
            .with_node(fixtures::node("node-1", &[]));

        assert_eq!(pod_name(&snapshot.get_pod("default", "web").await.unwrap()), "web");
        assert!(snapshot.get_pod("other", "web").await.unwrap_err().is_not_found());
        assert!(snapshot.get_node("node-2").await.unwrap_err().is_not_found());
        assert!(snapshot.get_pvc("default", "data").await.unwrap_err().is_not_found());
        assert_eq!(snapshot.list_pods(Some("other")).await.unwrap().len(), 0);
        assert_eq!(snapshot.list_pods(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_capability() {
        let snapshot = ClusterSnapshot::new();
        assert!(matches!(
            snapshot.get_node_metrics("node-1").await,
            Err(DiagnosticError::Unavailable(_))
        ));

        let usage = NodeUsage {
            cpu_millicores: 500,
            memory_bytes: 1024,
        };
        let snapshot = snapshot.with_node_usage("node-1", usage);
        assert_eq!(snapshot.get_node_metrics("node-1").await.unwrap(), usage);
        assert_eq!(
            snapshot.list_node_metrics().await.unwrap(),
            BTreeMap::from([("node-1".to_string(), usage)])
        );
    }

    #[test]
    fn test_events_filtered_by_selector() {
        use k8s_openapi::api::core::v1::ObjectReference;
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

        let event = |ns: &str, kind: &str, name: &str| Event {
            metadata: ObjectMeta {
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: Some(kind.to_string()),
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let snapshot = ClusterSnapshot::new()
            .with_event(event("shop", "Pod", "web"))
            .with_event(event("shop", "Pod", "db"))
            .with_event(event("shop", "Node", "web"))
            .with_event(event("infra", "Pod", "web"));

        let for_pod = tokio_test::block_on(snapshot.list_events(&EventSelector::for_pod("shop", "web"))).unwrap();
        assert_eq!(for_pod.len(), 1);

        let namespace = tokio_test::block_on(snapshot.list_events(&EventSelector::namespace("shop"))).unwrap();
        assert_eq!(namespace.len(), 3);
    }
}
