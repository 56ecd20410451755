//! Cluster inventory: node capacity and the containers of running pods

use crate::error::{Error, Result};
use crate::models::{ActiveContainer, NodeCapacity};
use crate::quantity::{CpuQuantity, MemoryQuantity};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, instrument, warn};

/// Pods in these phases hold no resources
const TERMINATED_PHASES: &str = "status.phase!=Succeeded,status.phase!=Failed";

/// Read-only view of the cluster's nodes and active containers
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeCapacity>>;

    /// Containers of non-terminated pods, optionally narrowed to one
    /// namespace and one node
    async fn list_active_containers(
        &self,
        namespace: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<ActiveContainer>>;
}

/// Inventory backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeInventory {
    client: Client,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig, or the usual inference
    /// (`KUBECONFIG`, `~/.kube/config`, in-cluster) when `kubeconfig` is None
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    Error::Config(format!("cannot read kubeconfig {}: {}", path.display(), e))
                })?;
                let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::Config(format!("invalid kubeconfig {}: {}", path.display(), e)))?;
                Client::try_from(config).map_err(|source| Error::Kube {
                    context: "create Kubernetes client".into(),
                    source,
                })?
            }
            None => Client::try_default().await.map_err(|source| Error::Kube {
                context: "create Kubernetes client".into(),
                source,
            })?,
        };

        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterInventory for KubeInventory {
    #[instrument(skip(self))]
    async fn list_nodes(&self) -> Result<Vec<NodeCapacity>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|source| Error::Kube {
                context: "list nodes".into(),
                source,
            })?;

        let capacities = list
            .items
            .iter()
            .map(node_capacity)
            .collect::<Result<Vec<_>>>()?;

        debug!(nodes = capacities.len(), "Listed nodes");
        Ok(capacities)
    }

    #[instrument(skip(self))]
    async fn list_active_containers(
        &self,
        namespace: Option<&str>,
        node: Option<&str>,
    ) -> Result<Vec<ActiveContainer>> {
        let pods: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let params = ListParams::default().fields(&pod_field_selector(node));

        let list = match pods.list(&params).await {
            Ok(list) => list,
            Err(kube::Error::Api(response)) if response.code == 403 => {
                warn!(
                    namespace = namespace.unwrap_or("<all>"),
                    reason = %response.message,
                    "Pod listing forbidden, treating as no visible pods"
                );
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(Error::Kube {
                    context: "list pods".into(),
                    source,
                })
            }
        };

        let mut containers = Vec::new();
        for pod in &list.items {
            containers.extend(pod_containers(pod)?);
        }

        debug!(
            pods = list.items.len(),
            containers = containers.len(),
            "Listed active containers"
        );
        Ok(containers)
    }
}

/// Field selector excluding terminated pods, optionally pinned to a node
pub fn pod_field_selector(node: Option<&str>) -> String {
    match node {
        Some(name) => format!("{},spec.nodeName={}", TERMINATED_PHASES, name),
        None => TERMINATED_PHASES.to_string(),
    }
}

/// Schedulable resources of a node: allocatable when reported, else capacity
pub fn node_capacity(node: &Node) -> Result<NodeCapacity> {
    let name = node.metadata.name.clone().unwrap_or_default();
    let status = node.status.as_ref();

    let resources = status
        .and_then(|s| s.allocatable.as_ref())
        .filter(|a| !a.is_empty())
        .or_else(|| status.and_then(|s| s.capacity.as_ref()));

    Ok(NodeCapacity {
        cpu: cpu_of(resources)?,
        memory: memory_of(resources)?,
        name,
    })
}

/// One entry per container of `pod`; absent requests and limits are zero
pub fn pod_containers(pod: &Pod) -> Result<Vec<ActiveContainer>> {
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let pod_uid = pod.metadata.uid.clone().unwrap_or_default();

    let Some(spec) = pod.spec.as_ref() else {
        return Ok(Vec::new());
    };
    let node_name = spec.node_name.clone().unwrap_or_default();

    spec.containers
        .iter()
        .map(|container| {
            let resources = container.resources.as_ref();
            let requests = resources.and_then(|r| r.requests.as_ref());
            let limits = resources.and_then(|r| r.limits.as_ref());

            Ok(ActiveContainer {
                namespace: namespace.clone(),
                pod_name: pod_name.clone(),
                pod_uid: pod_uid.clone(),
                node_name: node_name.clone(),
                container_name: container.name.clone(),
                cpu_request: cpu_of(requests)?,
                cpu_limit: cpu_of(limits)?,
                memory_request: memory_of(requests)?,
                memory_limit: memory_of(limits)?,
            })
        })
        .collect()
}

fn cpu_of(resources: Option<&BTreeMap<String, Quantity>>) -> Result<CpuQuantity> {
    match resources.and_then(|r| r.get("cpu")) {
        Some(q) => q.0.parse(),
        None => Ok(CpuQuantity::ZERO),
    }
}

fn memory_of(resources: Option<&BTreeMap<String, Quantity>>) -> Result<MemoryQuantity> {
    match resources.and_then(|r| r.get("memory")) {
        Some(q) => q.0.parse(),
        None => Ok(MemoryQuantity::ZERO),
    }
}
