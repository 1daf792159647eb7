use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node, PersistentVolume, PersistentVolumeClaim, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ClusterStateProvider, EventSelector};
use crate::error::{DiagnosticError, Result};
use crate::parsing::{parse_cpu_to_millicores, parse_memory_to_bytes};
use crate::types::NodeUsage;

#[derive(Debug, Deserialize)]
struct NodeMetricsItem {
    #[serde(default)]
    metadata: ItemMeta,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    #[serde(default)]
    items: Vec<NodeMetricsItem>,
}

impl NodeMetricsItem {
    fn to_usage(&self) -> NodeUsage {
        NodeUsage {
            cpu_millicores: self.usage.get("cpu").and_then(|q| parse_cpu_to_millicores(q)).unwrap_or(0),
            memory_bytes: self.usage.get("memory").and_then(|q| parse_memory_to_bytes(q)).unwrap_or(0),
        }
    }
}

/// Provider backed by a live API server.
#[derive(Clone)]
pub struct KubeClusterState {
    client: Client,
    metrics_enabled: bool,
}

impl KubeClusterState {
    pub fn new(client: Client, metrics_enabled: bool) -> Self {
        Self { client, metrics_enabled }
    }

    /// GET a metrics.k8s.io path. 404 and 503 mean the API is not served.
    async fn metrics_request<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        use http::Request as HttpRequest;
        if !self.metrics_enabled {
            return Err(DiagnosticError::Unavailable("node metrics disabled".to_string()));
        }
        let req = HttpRequest::builder()
            .method("GET")
            .uri(path)
            .body(Vec::new())
            .map_err(|e| DiagnosticError::Internal(format!("build metrics request: {}", e)))?;
        match self.client.request::<T>(req).await {
            Ok(body) => Ok(body),
            Err(kube::Error::Api(resp)) if resp.code == 404 || resp.code == 503 => Err(DiagnosticError::Unavailable(
                format!("metrics API returned {} for {}", resp.code, path),
            )),
            Err(e) => Err(DiagnosticError::Internal(format!("{}: {}", path, e))),
        }
    }
}

#[async_trait]
impl ClusterStateProvider for KubeClusterState {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| DiagnosticError::from_kube(e, "pod", &format!("{}/{}", namespace, name)))?
            .ok_or_else(|| DiagnosticError::not_found("pod", format!("{}/{}", namespace, name)))
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let pods = api.list(&ListParams::default()).await?.items;
        debug!(namespace = namespace.unwrap_or("*"), count = pods.len(), "listed pods");
        Ok(pods)
    }

    async fn get_node(&self, name: &str) -> Result<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| DiagnosticError::from_kube(e, "node", name))?
            .ok_or_else(|| DiagnosticError::not_found("node", name))
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_events(&self, selector: &EventSelector) -> Result<Vec<Event>> {
        let api: Api<Event> = match selector.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut params = ListParams::default();
        if let Some(fields) = selector.field_selector() {
            params = params.fields(&fields);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> Result<PersistentVolumeClaim> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| DiagnosticError::from_kube(e, "persistentvolumeclaim", &format!("{}/{}", namespace, name)))?
            .ok_or_else(|| DiagnosticError::not_found("persistentvolumeclaim", format!("{}/{}", namespace, name)))
    }

    async fn get_pv(&self, name: &str) -> Result<PersistentVolume> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| DiagnosticError::from_kube(e, "persistentvolume", name))?
            .ok_or_else(|| DiagnosticError::not_found("persistentvolume", name))
    }

    async fn get_node_metrics(&self, name: &str) -> Result<NodeUsage> {
        let item: NodeMetricsItem = self
            .metrics_request(&format!("/apis/metrics.k8s.io/v1beta1/nodes/{}", name))
            .await?;
        Ok(item.to_usage())
    }

    async fn list_node_metrics(&self) -> Result<BTreeMap<String, NodeUsage>> {
        let list: NodeMetricsList = self.metrics_request("/apis/metrics.k8s.io/v1beta1/nodes").await?;
        let usage: BTreeMap<String, NodeUsage> = list
            .items
            .iter()
            .filter(|item| !item.metadata.name.is_empty())
            .map(|item| (item.metadata.name.clone(), item.to_usage()))
            .collect();
        debug!(nodes = usage.len(), "listed node metrics");
        Ok(usage)
    }
}
